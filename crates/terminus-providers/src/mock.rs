//! Mock providers for tests and for running without real speech engines.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use terminus_core::AudioFrame;

use crate::error::ProviderError;
use crate::llm::{GenerationRequest, GenerationResponse, LanguageModel};
use crate::speech::{SpeechSynthesizer, SpeechToText};

/// Speech-to-text that replays queued transcripts.
///
/// When the queue is empty it returns `fallback`.
#[derive(Debug, Default)]
pub struct MockSpeechToText {
    transcripts: Mutex<VecDeque<String>>,
    fallback: String,
}

impl MockSpeechToText {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            transcripts: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
        }
    }

    pub fn with_transcripts<I, S>(transcripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transcripts: Mutex::new(transcripts.into_iter().map(Into::into).collect()),
            fallback: String::new(),
        }
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(&self, utterance: &AudioFrame) -> Result<String, ProviderError> {
        if utterance.is_empty() {
            return Err(ProviderError::Transcription(
                "Cannot transcribe empty audio".to_string(),
            ));
        }
        let next = self
            .transcripts
            .lock()
            .map_err(|e| ProviderError::Transcription(format!("mock poisoned: {}", e)))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Language model that replays scripted responses and records every request.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    responses: Mutex<VecDeque<Result<GenerationResponse, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response.
    pub fn push(&self, response: GenerationResponse) -> &Self {
        self.lock_responses().push_back(Ok(response));
        self
    }

    /// Queue a plain text reply.
    pub fn push_text(&self, text: &str) -> &Self {
        self.push(GenerationResponse::text(text))
    }

    /// Queue a generation failure.
    pub fn push_error(&self, reason: &str) -> &Self {
        self.lock_responses().push_back(Err(reason.to_string()));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<GenerationResponse, String>>> {
        self.responses.lock().expect("scripted responses poisoned")
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.lock_responses().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(ProviderError::Generation(reason)),
            None => Err(ProviderError::Generation(
                "no scripted response left".to_string(),
            )),
        }
    }
}

/// Synthesizer that produces silence sized to the text, or fails on demand.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    sample_rate: u32,
    fail: bool,
}

impl MockSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sample_rate: 16000,
            fail: true,
        }
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new(16000)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame, ProviderError> {
        if self.fail {
            return Err(ProviderError::Synthesis("mock synthesizer failure".to_string()));
        }
        // Roughly 10 ms of audio per character.
        let samples = vec![0.0; text.chars().count() * (self.sample_rate as usize / 100)];
        Ok(AudioFrame::new(samples, self.sample_rate))
    }
}
