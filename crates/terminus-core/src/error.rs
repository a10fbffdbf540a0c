use thiserror::Error;

use crate::credentials::Credential;

/// Top-level error type for Terminus.
///
/// Every variant here is a startup-time configuration failure: it is raised
/// before any room connection is attempted and is never retried. Subsystem
/// crates define their own error types and wrap this one with `#[from]` so the
/// `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TerminusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(Credential),

    #[error("Invalid persona context: {0}")]
    PersonaContext(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for TerminusError {
    fn from(err: toml::de::Error) -> Self {
        TerminusError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TerminusError {
    fn from(err: serde_json::Error) -> Self {
        TerminusError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Terminus operations.
pub type Result<T> = std::result::Result<T, TerminusError>;
