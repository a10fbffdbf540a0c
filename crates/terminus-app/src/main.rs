//! Terminus application binary - composition root.
//!
//! 1. Parse the command line and pick a mode (voice, chat or action)
//! 2. Load configuration and check credentials before any room work
//! 3. Build the action provider once, shared by every job
//! 4. Register the per-job entrypoint with the worker runtime and hand over control
//!
//! Each job resolves its tools, builds fresh capability providers and runs one
//! session until the room disconnects.

mod audio;
mod cli;
mod console;
mod dispatch;
mod worker;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use terminus_action::{ActionProvider, HttpActionProvider};
use terminus_agent::{
    BackchannelSelector, ConversationalAgent, JobContext, SessionError, SessionOrchestrator,
    SpeechNormalizer, TurnHooks,
};
use terminus_core::config::GeneralConfig;
use terminus_core::{Credential, Credentials, PersonaContext, SessionEvent, TerminusConfig};
use terminus_providers::{
    CapabilityProviders, CartesiaSynthesizer, DeepgramSpeechToText, EnergyVad, MockSpeechToText,
    MockSynthesizer, OpenAiChatModel, SpeechSynthesizer, SpeechToText,
};

use cli::CliArgs;
use console::ConsoleRuntime;
use dispatch::{Dispatch, Mode, ModeDispatcher, USAGE};
use worker::{entrypoint, WorkerLifecycleManager};

/// Process-wide state shared by every job.
struct App {
    mode: Mode,
    config: TerminusConfig,
    credentials: Credentials,
    actions: Arc<dyn ActionProvider>,
    backchannel: Arc<BackchannelSelector>,
}

impl App {
    /// Fresh providers for one job. Never shared across jobs.
    fn providers(&self) -> terminus_core::Result<CapabilityProviders> {
        let p = &self.config.providers;
        let llm = Arc::new(OpenAiChatModel::new(
            &p.llm_base_url,
            self.credentials.expect_present(Credential::OpenAi)?,
            &p.llm_model,
        ));
        let vad = Arc::new(EnergyVad::new(p.vad_energy_threshold));

        let (stt, tts): (Arc<dyn SpeechToText>, Arc<dyn SpeechSynthesizer>) =
            if self.mode.uses_audio() {
                (
                    Arc::new(DeepgramSpeechToText::new(
                        self.credentials.expect_present(Credential::Deepgram)?,
                        &p.stt_model,
                        &p.stt_language,
                    )),
                    Arc::new(CartesiaSynthesizer::new(
                        self.credentials.expect_present(Credential::Cartesia)?,
                        &p.tts_model,
                        &p.tts_voice,
                        p.sample_rate,
                    )),
                )
            } else {
                // Chat mode: input is typed and replies are printed.
                (
                    Arc::new(MockSpeechToText::new("")),
                    Arc::new(MockSynthesizer::new(p.sample_rate)),
                )
            };

        Ok(CapabilityProviders::new(stt, llm, tts, vad))
    }
}

/// One job: assemble the agent, run its session, return once it has ended.
async fn run_job(app: Arc<App>, ctx: JobContext) -> Result<(), SessionError> {
    let persona = PersonaContext::now(app.config.general.timezone()?);
    let catalog = app.mode.catalog().without(&app.config.actions.disabled);
    let hooks = TurnHooks::conversational(SpeechNormalizer::new(), Arc::clone(&app.backchannel));

    let agent = ConversationalAgent::resolve(
        app.mode.persona(),
        &app.config.general.assistant_name,
        &persona,
        &catalog,
        app.actions.as_ref(),
        hooks,
    )
    .await?;
    tracing::info!(
        job_id = %ctx.job_id,
        persona = ?agent.kind,
        tools = agent.tools.len(),
        requested = catalog.len(),
        "Agent assembled"
    );

    let providers = app.providers()?;
    let orchestrator = SessionOrchestrator::new(app.config.session.clone());
    tokio::spawn(log_events(orchestrator.subscribe()));

    let handle = orchestrator.start(ctx, agent, providers).await?;
    tracing::debug!(job_id = %handle.job_id(), "Session running");
    let summary = handle.wait().await?;
    tracing::info!(job_id = %summary.job_id, turns = summary.turns, "Session ended");
    Ok(())
}

/// Session events as debug lines, until the session ends.
async fn log_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!(turn = ?event.turn(), event = ?event, "Session event");
                if matches!(event, SessionEvent::SessionEnded { .. }) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Session event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let plan = match ModeDispatcher::dispatch(&args) {
        Dispatch::Help => {
            print!("{}", USAGE);
            return Ok(());
        }
        Dispatch::Run(plan) => plan,
    };

    // Config is read before tracing so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = TerminusConfig::load(&config_file);
    let config_level = match &loaded {
        Ok(config) => config.general.log_level.clone(),
        Err(_) => GeneralConfig::default().log_level,
    };
    let level = args.resolve_log_level(&config_level);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Terminus v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Using default configuration");
            TerminusConfig::default()
        }
    };

    // Credentials, once, before any room work.
    let credentials = Credentials::from_env();
    if let Err(e) = credentials.require(plan.mode.required_credentials()) {
        tracing::error!(mode = %plan.mode, error = %e, "Cannot start");
        return Err(e.into());
    }
    tracing::info!(mode = %plan.mode, credentials = ?credentials, "Credentials present");

    // Action provider, constructed once and shared by reference.
    let actions: Arc<dyn ActionProvider> = Arc::new(HttpActionProvider::new(
        &config.actions.base_url,
        credentials.expect_present(Credential::Composio)?,
    ));

    let app = Arc::new(App {
        mode: plan.mode,
        backchannel: Arc::new(BackchannelSelector::new(config.session.backchannel_probability)),
        config,
        credentials,
        actions,
    });

    let runtime = ConsoleRuntime::new(app.config.general.assistant_name.clone());
    let job_app = Arc::clone(&app);
    WorkerLifecycleManager::new(Box::new(runtime))
        .register(entrypoint(move |ctx| run_job(Arc::clone(&job_app), ctx)))
        .run(&plan.forwarded_args)
        .await?;

    Ok(())
}
