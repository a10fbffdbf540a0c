//! CLI argument definitions for the Terminus binary.
//!
//! Mode flags are parsed here but interpreted by [`crate::dispatch`]. Anything
//! after the recognized flags is kept verbatim for the worker runtime.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Terminus, a voice assistant for your calendar and email.
#[derive(Parser, Debug, Default)]
#[command(name = "terminus", version, about, disable_help_flag = true)]
pub struct CliArgs {
    /// Print usage and exit.
    #[arg(short = 'h', long = "help", action = ArgAction::SetTrue)]
    pub help: bool,

    /// Chat with the assistant by typing instead of speaking.
    #[arg(short = 'c', long = "chat")]
    pub chat: bool,

    /// Run the action-first assistant.
    #[arg(short = 'x', long = "action")]
    pub action: bool,

    /// Path to the configuration file.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Arguments forwarded to the worker runtime.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TERMINUS_CONFIG env var > platform default (~/.terminus/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TERMINUS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".terminus").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".terminus").join("config.toml");
    }
    PathBuf::from("config.toml")
}
