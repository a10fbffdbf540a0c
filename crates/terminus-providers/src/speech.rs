//! Speech-to-text and speech synthesis contracts.

use async_trait::async_trait;
use terminus_core::AudioFrame;

use crate::error::ProviderError;

/// Turns a finished utterance into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one utterance. An empty string means nothing intelligible was said.
    async fn transcribe(&self, utterance: &AudioFrame) -> Result<String, ProviderError>;
}

/// Turns reply text into audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame, ProviderError>;
}
