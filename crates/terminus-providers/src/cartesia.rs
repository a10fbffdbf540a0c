//! Cartesia speech synthesis over the `/tts/bytes` endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};

use terminus_core::AudioFrame;

use crate::error::ProviderError;
use crate::speech::SpeechSynthesizer;

const DEFAULT_BASE_URL: &str = "https://api.cartesia.ai";
const API_VERSION: &str = "2024-06-10";

pub struct CartesiaSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl CartesiaSynthesizer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            sample_rate,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn body(&self, text: &str) -> Value {
        json!({
            "model_id": self.model,
            "transcript": text,
            "voice": { "mode": "id", "id": self.voice },
            "output_format": {
                "container": "raw",
                "encoding": "pcm_f32le",
                "sample_rate": self.sample_rate,
            },
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for CartesiaSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame, ProviderError> {
        if text.trim().is_empty() {
            return Ok(AudioFrame::new(Vec::new(), self.sample_rate));
        }

        let response = self
            .client
            .post(format!("{}/tts/bytes", self.base_url))
            .header("X-API-Key", &self.api_key)
            .header("Cartesia-Version", API_VERSION)
            .json(&self.body(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Synthesis(format!("HTTP {}: {}", status, detail)));
        }

        let bytes = response.bytes().await?;
        let samples = from_f32le(&bytes)?;
        Ok(AudioFrame::new(samples, self.sample_rate))
    }
}

/// Decode raw little-endian f32 PCM.
fn from_f32le(bytes: &[u8]) -> Result<Vec<f32>, ProviderError> {
    if bytes.len() % 4 != 0 {
        return Err(ProviderError::InvalidResponse(format!(
            "{} bytes is not whole f32 samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
