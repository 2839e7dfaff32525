/// Pipeline engine for the content-remix workflow.
///
/// Couples the generic poller, entity resolution, and the conversational
/// revision loop under one stage-gated orchestrator. All remote access goes
/// through the `RemixBackend` trait from `remote-api`; nothing here talks to
/// the network directly.
pub mod orchestrator;
pub mod poller;
pub mod resolve;
pub mod revision;

pub use orchestrator::{Orchestrator, OrchestratorConfig, PipelineError};
pub use poller::{poll, CancelToken, PollConfig, PollError, PollOutcome};
pub use resolve::{names_overlap, resolve, resolve_with, NameMatcher};
pub use revision::{ConfirmPolicy, RevisionError, RevisionLoop};
