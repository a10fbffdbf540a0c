//! Deepgram prerecorded speech-to-text.
//!
//! Each finalized utterance is posted as raw 16-bit little-endian PCM to the
//! `/v1/listen` endpoint.

use async_trait::async_trait;
use serde::Deserialize;

use terminus_core::AudioFrame;

use crate::error::ProviderError;
use crate::speech::SpeechToText;

const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

pub struct DeepgramSpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl DeepgramSpeechToText {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            language: language.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Listen URL with every query value percent-encoded.
    fn endpoint(&self, sample_rate: u32) -> Result<reqwest::Url, ProviderError> {
        let sample_rate = sample_rate.to_string();
        reqwest::Url::parse_with_params(
            &format!("{}/v1/listen", self.base_url),
            [
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("encoding", "linear16"),
                ("sample_rate", sample_rate.as_str()),
                ("smart_format", "true"),
            ],
        )
        .map_err(|e| ProviderError::Transcription(format!("invalid listen URL: {}", e)))
    }
}

#[async_trait]
impl SpeechToText for DeepgramSpeechToText {
    async fn transcribe(&self, utterance: &AudioFrame) -> Result<String, ProviderError> {
        if utterance.is_empty() {
            return Err(ProviderError::Transcription(
                "Cannot transcribe empty audio".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.endpoint(utterance.sample_rate)?)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(to_linear16(&utterance.samples))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transcription(format!(
                "HTTP {}: {}",
                status, detail
            )));
        }

        let body: ListenResponse = response.json().await?;
        Ok(body.transcript())
    }
}

/// Convert f32 samples in [-1, 1] to 16-bit little-endian PCM.
fn to_linear16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect()
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

impl ListenResponse {
    /// Best alternative of the first channel; empty when nothing was heard.
    fn transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default()
    }
}
