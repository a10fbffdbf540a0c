//! Worker lifecycle: register one entrypoint with a runtime and hand over control.
//!
//! The runtime owns job creation and any retry policy across jobs. An
//! entrypoint receives one [`JobContext`] and returns only once its session
//! has fully ended.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use terminus_agent::{JobContext, SessionError};

/// Per-job function the runtime calls.
pub type Entrypoint =
    Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<(), SessionError>> + Send + Sync>;

/// Wrap an async function as an [`Entrypoint`].
pub fn entrypoint<F, Fut>(f: F) -> Entrypoint
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("No worker subcommand given")]
    MissingSubcommand,

    #[error("Unknown worker subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("Unknown argument for {subcommand}: {argument}")]
    UnknownArgument { subcommand: String, argument: String },

    #[error("No entrypoint registered")]
    NoEntrypoint,

    #[error("Job failed: {0}")]
    Job(#[from] SessionError),
}

/// A hosting runtime that creates jobs and runs an entrypoint for each.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Interpret `args` and run jobs until the runtime decides to stop.
    async fn run(&self, entrypoint: Entrypoint, args: &[String]) -> Result<(), WorkerError>;
}

/// Registers the chosen entrypoint and hands control to the runtime.
pub struct WorkerLifecycleManager {
    runtime: Box<dyn WorkerRuntime>,
    entrypoint: Option<Entrypoint>,
}

impl WorkerLifecycleManager {
    pub fn new(runtime: Box<dyn WorkerRuntime>) -> Self {
        Self {
            runtime,
            entrypoint: None,
        }
    }

    pub fn register(mut self, entrypoint: Entrypoint) -> Self {
        self.entrypoint = Some(entrypoint);
        self
    }

    pub async fn run(self, args: &[String]) -> Result<(), WorkerError> {
        let entrypoint = self.entrypoint.ok_or(WorkerError::NoEntrypoint)?;
        tracing::info!(runtime = self.runtime.name(), args = ?args, "Handing control to worker runtime");
        self.runtime.run(entrypoint, args).await
    }
}
