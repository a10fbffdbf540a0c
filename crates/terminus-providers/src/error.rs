//! Error types for capability providers.

/// Errors raised by speech, language-model and synthesis providers.
///
/// All of these are per-turn failures: the session absorbs them into the
/// conversation instead of terminating.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Transcription failed: {0}")]
    Transcription(String),
    #[error("Generation failed: {0}")]
    Generation(String),
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Transcription("empty audio".to_string());
        assert_eq!(err.to_string(), "Transcription failed: empty audio");

        let err = ProviderError::Generation("rate limited".to_string());
        assert_eq!(err.to_string(), "Generation failed: rate limited");

        let err = ProviderError::Synthesis("voice not found".to_string());
        assert_eq!(err.to_string(), "Synthesis failed: voice not found");

        let err = ProviderError::InvalidResponse("no choices".to_string());
        assert_eq!(err.to_string(), "Invalid provider response: no choices");
    }
}
