pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod types;

pub use config::TerminusConfig;
pub use credentials::{Credential, Credentials};
pub use error::{Result, TerminusError};
pub use events::SessionEvent;
pub use types::*;
