//! API credentials for capability providers and the tool-action provider.
//!
//! Credentials are read once at process start. A missing credential fails
//! with a `MissingCredential` error naming exactly which variable is absent,
//! before any worker or room work begins.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TerminusError};

/// One named credential, identified by its environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Credential {
    /// Language model (OpenAI-compatible chat completions).
    OpenAi,
    /// Speech-to-text provider.
    Deepgram,
    /// Speech synthesis provider.
    Cartesia,
    /// External tool-action provider.
    Composio,
    /// Room server URL.
    LiveKitUrl,
    /// Room server API key.
    LiveKitKey,
    /// Room server API secret.
    LiveKitSecret,
}

impl Credential {
    pub const ALL: [Credential; 7] = [
        Credential::OpenAi,
        Credential::Deepgram,
        Credential::Cartesia,
        Credential::Composio,
        Credential::LiveKitUrl,
        Credential::LiveKitKey,
        Credential::LiveKitSecret,
    ];

    /// The environment variable this credential is read from.
    pub fn env_var(&self) -> &'static str {
        match self {
            Credential::OpenAi => "OPENAI_API_KEY",
            Credential::Deepgram => "DEEPGRAM_API_KEY",
            Credential::Cartesia => "CARTESIA_API_KEY",
            Credential::Composio => "COMPOSIO_API_KEY",
            Credential::LiveKitUrl => "LIVEKIT_URL",
            Credential::LiveKitKey => "LIVEKIT_API_KEY",
            Credential::LiveKitSecret => "LIVEKIT_API_SECRET",
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_var())
    }
}

/// Snapshot of all credentials present at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<Credential, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values are secrets; only list which ones are present.
        let mut present: Vec<&str> = self.values.keys().map(|c| c.env_var()).collect();
        present.sort_unstable();
        f.debug_struct("Credentials").field("present", &present).finish()
    }
}

impl Credentials {
    /// Read every known credential from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary lookup function.
    ///
    /// Blank values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = Credential::ALL
            .iter()
            .filter_map(|c| {
                lookup(c.env_var())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (*c, v))
            })
            .collect();
        Self { values }
    }

    /// Get a credential value if present.
    pub fn get(&self, credential: Credential) -> Option<&str> {
        self.values.get(&credential).map(String::as_str)
    }

    /// Get a credential value or fail with its named error.
    pub fn expect_present(&self, credential: Credential) -> Result<&str> {
        self.get(credential)
            .ok_or(TerminusError::MissingCredential(credential))
    }

    /// Check that every credential in `required` is present.
    ///
    /// Reports the first missing one in the order given.
    pub fn require(&self, required: &[Credential]) -> Result<()> {
        for credential in required {
            self.expect_present(*credential)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_present_values() {
        let creds = Credentials::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("COMPOSIO_API_KEY", "cmp-test"),
        ]));
        assert_eq!(creds.get(Credential::OpenAi), Some("sk-test"));
        assert_eq!(creds.get(Credential::Composio), Some("cmp-test"));
        assert_eq!(creds.get(Credential::Deepgram), None);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let creds = Credentials::from_lookup(lookup_from(&[("OPENAI_API_KEY", "   ")]));
        assert_eq!(creds.get(Credential::OpenAi), None);
    }

    #[test]
    fn test_require_names_first_missing_credential() {
        let creds = Credentials::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]));
        let err = creds
            .require(&[Credential::OpenAi, Credential::Deepgram, Credential::Cartesia])
            .unwrap_err();
        assert!(matches!(
            err,
            TerminusError::MissingCredential(Credential::Deepgram)
        ));
    }

    #[test]
    fn test_require_all_present() {
        let creds = Credentials::from_lookup(|name| Some(format!("value-for-{}", name)));
        assert!(creds.require(&Credential::ALL).is_ok());
    }

    #[test]
    fn test_each_credential_has_distinct_env_var() {
        let mut names: Vec<&str> = Credential::ALL.iter().map(|c| c.env_var()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Credential::ALL.len());
    }

    #[test]
    fn test_debug_does_not_leak_values() {
        let creds = Credentials::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-secret")]));
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("OPENAI_API_KEY"));
        assert!(!dbg.contains("sk-secret"));
    }
}
