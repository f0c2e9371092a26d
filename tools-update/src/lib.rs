//! # tools-update
//!
//! Self-update subsystem: sync the install directory with its git remote,
//! rebuild, and swap the new binary over the running one.
//!
//! Call [`UpdateOrchestrator::from_config`] and then
//! [`UpdateOrchestrator::execute`] with the CLI's [`tools_core::UpdateOptions`];
//! [`UpdateOrchestrator::self_update`] rebuilds in place without git.

pub mod build;
pub mod command;
pub mod error;
pub mod git;
pub mod helper_script;
pub mod orchestrator;
pub mod pending;
pub mod replace;
pub mod sync;

pub use build::{BuildPipeline, CandidateBinary, CommandToolchain, Toolchain};
pub use error::UpdateError;
pub use git::{GitCli, SourceControl};
pub use orchestrator::{
    Availability, CheckReport, NoopObserver, Outcome, Report, Stage, UpdateObserver,
    UpdateOrchestrator, UpdateSession,
};
pub use pending::{PendingState, PendingUpdate};
pub use replace::{DetachedLauncher, HelperLauncher, ReplacementCoordinator, SwapOutcome};
pub use sync::{IntegrateOutcome, RemoteStatus, RemoteSyncEngine, RepoState, SyncStatus};
