//! Tool actions for Terminus.
//!
//! Defines the catalog of calendar and email actions a persona can enable,
//! resolves them against an action provider into a per-session tool set, and
//! executes the tool calls the language model issues.

pub mod error;
pub mod executor;
pub mod http;
pub mod provider;
pub mod static_provider;
pub mod tool;
pub mod types;

pub use error::{ExecutionError, ResolutionError};
pub use executor::{execute_call, execute_calls};
pub use http::HttpActionProvider;
pub use provider::{resolve_catalog, ActionProvider};
pub use static_provider::StaticActionProvider;
pub use tool::{FnTool, InvocableTool, ToolSet};
pub use types::{ActionDescriptor, ActionRequest, ActionResponse, ToolAction, ToolCatalog};
