//! Conversational session layer for Terminus.
//!
//! Turns a persona, a resolved tool set and four capability providers into a
//! running voice or text session bound to one room.

pub mod agent;
pub mod backchannel;
pub mod error;
pub mod normalizer;
pub mod persona;
pub mod room;
pub mod session;
pub mod state;

pub use agent::{ConversationalAgent, EnhanceHook, NormalizeHook, TurnHooks};
pub use backchannel::{BackchannelSelector, BACKCHANNEL_PHRASES, DEFAULT_BACKCHANNEL_PROBABILITY};
pub use error::SessionError;
pub use normalizer::{SpeechNormalizer, DEFAULT_FILLERS};
pub use persona::{greeting_instruction, PersonaInstructionBuilder, PersonaKind, APOLOGY};
pub use room::{JobContext, MemoryRoom, Room, RoomDriver, RoomInput, RoomInputOptions, RoomOutput};
pub use session::{SessionHandle, SessionOrchestrator, SessionSummary};
pub use state::{SessionState, SessionStateMachine};
