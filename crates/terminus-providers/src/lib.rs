//! Terminus capability providers.
//!
//! Trait-based contracts for the four engines a conversation session is built
//! from (speech-to-text, language model, speech synthesis, voice activity
//! detection), HTTP adapters for OpenAI-compatible chat completions, Deepgram
//! transcription and Cartesia synthesis, an energy-based VAD, and mock
//! implementations for tests.

use std::sync::Arc;

pub mod cartesia;
pub mod deepgram;
pub mod error;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod speech;
pub mod vad;

pub use cartesia::CartesiaSynthesizer;
pub use deepgram::DeepgramSpeechToText;
pub use error::ProviderError;
pub use llm::{
    ChatMessage, GenerationRequest, GenerationResponse, LanguageModel, Role, ToolCallRequest,
    ToolSpec,
};
pub use mock::{MockSpeechToText, MockSynthesizer, ScriptedLanguageModel};
pub use openai::OpenAiChatModel;
pub use speech::{SpeechSynthesizer, SpeechToText};
pub use vad::{EnergyVad, VadResult, VoiceActivityDetector};

/// The four independently swappable engines one session runs on.
///
/// Built per job and moved into that job's session; never shared across jobs.
#[derive(Clone)]
pub struct CapabilityProviders {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub vad: Arc<dyn VoiceActivityDetector>,
}

impl CapabilityProviders {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn SpeechSynthesizer>,
        vad: Arc<dyn VoiceActivityDetector>,
    ) -> Self {
        Self { stt, llm, tts, vad }
    }
}

impl std::fmt::Debug for CapabilityProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProviders")
            .field("llm", &self.llm.model())
            .finish_non_exhaustive()
    }
}
