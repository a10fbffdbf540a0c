//! Startup mode selection.
//!
//! Precedence over the flag space: help beats everything, action beats chat,
//! chat beats the default voice mode. Mode flags are consumed here and never
//! forwarded to the worker runtime.

use std::fmt;

use terminus_action::ToolCatalog;
use terminus_agent::PersonaKind;
use terminus_core::Credential;

use crate::cli::CliArgs;

pub const USAGE: &str = "\
Usage:
  terminus        Start a voice conversation (default)
  terminus -c     Chat by typing instead of speaking
  terminus -x     Start the action-first assistant
  terminus -h     Show this help

Options:
  --config <PATH>      Configuration file (default ~/.terminus/config.toml)
  --log-level <LEVEL>  trace, debug, info, warn or error
";

/// The worker subcommand run when none is given.
pub const DEFAULT_SUBCOMMAND: &str = "console";
/// Asks the console runtime for typed input instead of audio.
pub const TEXT_FLAG: &str = "--text";

const HELP_FLAGS: [&str; 2] = ["-h", "--help"];
const CHAT_FLAGS: [&str; 2] = ["-c", "--chat"];
const ACTION_FLAGS: [&str; 2] = ["-x", "--action"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Voice,
    Chat,
    Action,
}

impl Mode {
    pub fn persona(&self) -> PersonaKind {
        match self {
            Mode::Voice | Mode::Chat => PersonaKind::CalendarAssistant,
            Mode::Action => PersonaKind::ActionAssistant,
        }
    }

    pub fn catalog(&self) -> ToolCatalog {
        match self {
            Mode::Voice | Mode::Chat => ToolCatalog::calendar_assistant(),
            Mode::Action => ToolCatalog::action_assistant(),
        }
    }

    /// Credentials that must be present before any room work.
    pub fn required_credentials(&self) -> &'static [Credential] {
        match self {
            Mode::Voice | Mode::Action => &[
                Credential::OpenAi,
                Credential::Deepgram,
                Credential::Cartesia,
                Credential::Composio,
            ],
            Mode::Chat => &[Credential::OpenAi, Credential::Composio],
        }
    }

    /// Whether the session speaks and listens, as opposed to text only.
    pub fn uses_audio(&self) -> bool {
        !matches!(self, Mode::Chat)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Voice => "voice",
            Mode::Chat => "chat",
            Mode::Action => "action",
        };
        f.write_str(name)
    }
}

/// What a run should do once the mode is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub mode: Mode,
    /// Arguments for the worker runtime, mode flags removed.
    pub forwarded_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Help,
    Run(RunPlan),
}

pub struct ModeDispatcher;

impl ModeDispatcher {
    /// Pick exactly one outcome for any combination of flags.
    ///
    /// Mode flags that clap left in the runtime arguments count too.
    pub fn dispatch(args: &CliArgs) -> Dispatch {
        let has = |flags: &[&str]| args.runtime_args.iter().any(|a| flags.contains(&a.as_str()));

        if args.help || has(&HELP_FLAGS) {
            return Dispatch::Help;
        }

        let mode = if args.action || has(&ACTION_FLAGS) {
            Mode::Action
        } else if args.chat || has(&CHAT_FLAGS) {
            Mode::Chat
        } else {
            Mode::Voice
        };

        let mut rest: Vec<String> = args
            .runtime_args
            .iter()
            .filter(|a| !CHAT_FLAGS.contains(&a.as_str()) && !ACTION_FLAGS.contains(&a.as_str()))
            .cloned()
            .collect();

        if rest.first().map_or(true, |a| a.starts_with('-')) {
            rest.insert(0, DEFAULT_SUBCOMMAND.to_string());
        }
        if mode == Mode::Chat && !rest.iter().any(|a| a == TEXT_FLAG) {
            rest.insert(1, TEXT_FLAG.to_string());
        }

        Dispatch::Run(RunPlan {
            mode,
            forwarded_args: rest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn dispatch(args: &[&str]) -> Dispatch {
        let cli =
            CliArgs::try_parse_from(std::iter::once("terminus").chain(args.iter().copied()))
                .unwrap();
        ModeDispatcher::dispatch(&cli)
    }

    fn plan(args: &[&str]) -> RunPlan {
        match dispatch(args) {
            Dispatch::Run(plan) => plan,
            Dispatch::Help => panic!("expected a run plan for {:?}", args),
        }
    }

    #[test]
    fn test_default_is_voice_console() {
        let plan = plan(&[]);
        assert_eq!(plan.mode, Mode::Voice);
        assert_eq!(plan.forwarded_args, vec!["console"]);
    }

    #[test]
    fn test_chat_requests_text_console() {
        for flag in ["-c", "--chat"] {
            let plan = plan(&[flag]);
            assert_eq!(plan.mode, Mode::Chat);
            assert_eq!(plan.forwarded_args, vec!["console", "--text"]);
        }
    }

    #[test]
    fn test_action_flag_is_stripped() {
        for flag in ["-x", "--action"] {
            let plan = plan(&[flag]);
            assert_eq!(plan.mode, Mode::Action);
            assert_eq!(plan.forwarded_args, vec!["console"]);
        }
    }

    #[test]
    fn test_action_overrides_chat() {
        let plan = plan(&["-x", "--chat"]);
        assert_eq!(plan.mode, Mode::Action);
        assert_eq!(plan.forwarded_args, vec!["console"]);
    }

    #[test]
    fn test_help_takes_absolute_precedence() {
        for args in [
            vec!["-h"],
            vec!["--help"],
            vec!["-h", "-x"],
            vec!["-c", "--help"],
            vec!["-x", "-c", "-h"],
        ] {
            assert_eq!(dispatch(&args), Dispatch::Help, "{:?}", args);
        }
    }

    #[test]
    fn test_dispatch_is_total_over_flag_space() {
        // Every subset of {help, chat, action} yields exactly one outcome.
        for bits in 0u8..8 {
            let mut args = Vec::new();
            if bits & 1 != 0 {
                args.push("-h");
            }
            if bits & 2 != 0 {
                args.push("-c");
            }
            if bits & 4 != 0 {
                args.push("-x");
            }
            let expected = if bits & 1 != 0 {
                Dispatch::Help
            } else {
                let mode = if bits & 4 != 0 {
                    Mode::Action
                } else if bits & 2 != 0 {
                    Mode::Chat
                } else {
                    Mode::Voice
                };
                plan_for(mode)
            };
            assert_eq!(dispatch(&args), expected, "{:?}", args);
            assert_eq!(dispatch(&args), dispatch(&args));
        }
    }

    fn plan_for(mode: Mode) -> Dispatch {
        let forwarded_args = match mode {
            Mode::Chat => vec!["console".to_string(), "--text".to_string()],
            _ => vec!["console".to_string()],
        };
        Dispatch::Run(RunPlan {
            mode,
            forwarded_args,
        })
    }

    #[test]
    fn test_mode_flags_after_subcommand_are_consumed() {
        let plan = plan(&["console", "-x"]);
        assert_eq!(plan.mode, Mode::Action);
        assert_eq!(plan.forwarded_args, vec!["console"]);
    }

    #[test]
    fn test_explicit_subcommand_is_forwarded() {
        let plan = plan(&["console", "--text"]);
        assert_eq!(plan.mode, Mode::Voice);
        assert_eq!(plan.forwarded_args, vec!["console", "--text"]);
    }

    #[test]
    fn test_required_credentials_per_mode() {
        assert!(Mode::Voice.required_credentials().contains(&Credential::Deepgram));
        assert!(Mode::Action.required_credentials().contains(&Credential::Cartesia));
        assert_eq!(
            Mode::Chat.required_credentials(),
            &[Credential::OpenAi, Credential::Composio]
        );
    }

    #[test]
    fn test_personas() {
        assert_eq!(Mode::Voice.persona(), PersonaKind::CalendarAssistant);
        assert_eq!(Mode::Chat.persona(), PersonaKind::CalendarAssistant);
        assert_eq!(Mode::Action.persona(), PersonaKind::ActionAssistant);
        assert!(!Mode::Chat.uses_audio());
    }

    #[test]
    fn test_usage_lists_every_mode() {
        for line in ["terminus -c", "terminus -x", "terminus -h"] {
            assert!(USAGE.contains(line));
        }
    }
}
