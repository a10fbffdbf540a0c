use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TerminusError};

/// Top-level configuration for Terminus.
///
/// Loaded from `~/.terminus/config.toml` by default. Every section has
/// defaults, so an empty or partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminusConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
}

impl TerminusConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TerminusConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.general.timezone()?;
        let p = self.session.backchannel_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(TerminusError::Config(format!(
                "session.backchannel_probability must be within 0.0..=1.0, got {}",
                p
            )));
        }
        if self.session.tool_timeout_secs == 0 {
            return Err(TerminusError::Config(
                "session.tool_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.providers.sample_rate == 0 {
            return Err(TerminusError::Config(
                "providers.sample_rate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Name the assistant introduces itself with.
    pub assistant_name: String,
    /// IANA time zone the persona clock is fixed to.
    pub timezone: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            assistant_name: "Lucy".to_string(),
            timezone: "Asia/Kolkata".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Parse the configured time zone.
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            TerminusError::Config(format!("unknown time zone: {}", self.timezone))
        })
    }
}

/// Capability provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Speech-to-text model identifier.
    pub stt_model: String,
    /// Speech-to-text language tag.
    pub stt_language: String,
    /// Language model identifier.
    pub llm_model: String,
    /// Base URL of the OpenAI-compatible chat completions API.
    pub llm_base_url: String,
    /// Speech synthesis model identifier.
    pub tts_model: String,
    /// Speech synthesis voice identifier.
    pub tts_voice: String,
    /// RMS energy above which a frame counts as speech.
    pub vad_energy_threshold: f32,
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            stt_model: "nova-3".to_string(),
            stt_language: "en-US".to_string(),
            llm_model: "gpt-4o".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            tts_model: "sonic-2".to_string(),
            tts_voice: "a0e99841-438c-4a64-b679-ae501e7d6091".to_string(),
            vad_energy_threshold: 0.01,
            sample_rate: 16000,
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chance that a non-greeting reply gets a backchannel prefix.
    pub backchannel_probability: f64,
    /// Request input-side noise cancellation from the room.
    pub noise_cancellation: bool,
    /// Upper bound on one tool call.
    pub tool_timeout_secs: u64,
    /// Model/tool round trips allowed within one turn.
    pub max_tool_rounds: u32,
    /// Turns of history kept in memory for the model.
    pub history_turns: usize,
    /// Speak a generic apology when a turn fails.
    pub apologize_on_failure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backchannel_probability: 0.7,
            noise_cancellation: true,
            tool_timeout_secs: 30,
            max_tool_rounds: 4,
            history_turns: 20,
            apologize_on_failure: true,
        }
    }
}

/// External tool-action provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Base URL of the action provider API.
    pub base_url: String,
    /// Action names removed from every catalog.
    pub disabled: Vec<String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://backend.composio.dev/api/v2".to_string(),
            disabled: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TerminusConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.assistant_name, "Lucy");
        assert_eq!(config.general.timezone, "Asia/Kolkata");
        assert_eq!(config.providers.stt_model, "nova-3");
        assert_eq!(config.providers.llm_model, "gpt-4o");
        assert_eq!(config.session.backchannel_probability, 0.7);
        assert!(config.session.noise_cancellation);
        assert!(config.actions.disabled.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
assistant_name = "Max"
timezone = "Europe/Berlin"

[session]
backchannel_probability = 0.5
tool_timeout_secs = 10

[actions]
disabled = ["GOOGLECALENDAR_DELETE_EVENT"]
"#;
        let file = create_temp_config(content);
        let config = TerminusConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.assistant_name, "Max");
        assert_eq!(config.general.timezone().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.session.backchannel_probability, 0.5);
        assert_eq!(config.session.tool_timeout_secs, 10);
        assert_eq!(config.actions.disabled, vec!["GOOGLECALENDAR_DELETE_EVENT"]);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = TerminusConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.timezone, "Asia/Kolkata");
        assert_eq!(config.session.max_tool_rounds, 4);
    }

    #[test]
    fn test_load_rejects_unknown_timezone() {
        let file = create_temp_config("[general]\ntimezone = \"Mars/Olympus\"\n");
        let err = TerminusConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_load_rejects_out_of_range_probability() {
        let file = create_temp_config("[session]\nbackchannel_probability = 1.5\n");
        let err = TerminusConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, TerminusError::Config(_)));
    }

    #[test]
    fn test_load_rejects_zero_tool_timeout() {
        let file = create_temp_config("[session]\ntool_timeout_secs = 0\n");
        assert!(TerminusConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not [valid toml");
        assert!(TerminusConfig::load(file.path()).is_err());
    }
}
