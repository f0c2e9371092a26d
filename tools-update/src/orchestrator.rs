//! Update orchestrator: sequences version probe, sync, build and swap into
//! one session.
//!
//! ```text
//! Idle → CheckingVersion → Syncing ─┬→ Skipped
//!                                   └→ Building ─┬→ RolledBack
//!                                                └→ Swapping ─┬→ Completed
//!                                                             └→ RolledBack
//! ```
//!
//! Failures before anything is stashed (pending update, fetch) are returned
//! as `Err`. Once a stash may exist every path ends in an [`UpdateSession`],
//! and the stash is restored exactly once on the way out.

use std::fmt;

use chrono::Local;
use serde::Serialize;

use tools_core::{
    read_version, InstallLayout, ReplacementPlan, UpdateConfig, UpdateOptions, Version,
};

use crate::build::{BuildPipeline, CommandToolchain, Toolchain};
use crate::error::UpdateError;
use crate::git::{GitCli, SourceControl};
use crate::pending::{self, PendingState};
use crate::replace::{DetachedLauncher, HelperLauncher, ReplacementCoordinator, SwapOutcome};
use crate::sync::{
    IntegrateOutcome, RemoteStatus, RemoteSyncEngine, RepoState, Stash, StashRestore, SyncStatus,
};

/// Commit summaries shown after an update or in check mode.
const CHANGELOG_LINES: usize = 10;

// ---------------------------------------------------------------------------
// Session types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckingVersion,
    Syncing,
    Building,
    Swapping,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CheckingVersion => "checking version",
            Stage::Syncing => "syncing",
            Stage::Building => "building",
            Stage::Swapping => "swapping",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Skipped,
    RolledBack,
}

/// One run of the orchestrator.
#[derive(Debug)]
pub struct UpdateSession {
    pub previous_version: Version,
    pub new_version: Version,
    pub force: bool,
    /// A stash was created before integration.
    pub stashed: bool,
    /// Integration hit a conflict and was resolved by a hard reset.
    pub conflict: bool,
    pub outcome: Outcome,
    /// Set once the swap stage was reached.
    pub plan: Option<ReplacementPlan>,
    /// The swap was handed to the deferred helper.
    pub staged: bool,
    /// The stage that failed, for `RolledBack` sessions.
    pub failed_stage: Option<Stage>,
    pub failure: Option<UpdateError>,
    pub warnings: Vec<String>,
}

impl UpdateSession {
    fn start(previous_version: Version, force: bool) -> Self {
        Self {
            new_version: previous_version.clone(),
            previous_version,
            force,
            stashed: false,
            conflict: false,
            outcome: Outcome::Skipped,
            plan: None,
            staged: false,
            failed_stage: None,
            failure: None,
            warnings: Vec::new(),
        }
    }
}

/// Read-only answer to "is there an update?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub current_version: Version,
    pub availability: Availability,
    /// Incoming commits, newest first.
    pub incoming: Vec<String>,
    /// Description of a leftover deferred update, if any.
    pub pending: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Availability {
    /// The install directory is not a git work tree.
    NotTracked,
    UpToDate,
    UpdateAvailable { commits: usize },
    /// Local commits the remote does not have; nothing to pull.
    Ahead { commits: usize },
    Diverged { behind: usize, ahead: usize },
}

impl From<RemoteStatus> for Availability {
    fn from(s: RemoteStatus) -> Self {
        match s.classify() {
            SyncStatus::UpToDate => Availability::UpToDate,
            SyncStatus::Behind => Availability::UpdateAvailable { commits: s.behind },
            SyncStatus::Ahead => Availability::Ahead { commits: s.ahead },
            SyncStatus::Diverged => Availability::Diverged {
                behind: s.behind,
                ahead: s.ahead,
            },
        }
    }
}

/// What [`UpdateOrchestrator::execute`] produced.
#[derive(Debug)]
pub enum Report {
    Check(CheckReport),
    Update(UpdateSession),
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Progress callbacks for user-facing output. All methods default to no-ops.
pub trait UpdateObserver {
    fn progress(&self, _stage: Stage, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn changes(&self, _heading: &str, _lines: &[String]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct UpdateOrchestrator<S, T, L> {
    layout: InstallLayout,
    config: UpdateConfig,
    sync: RemoteSyncEngine<S>,
    build: BuildPipeline<T>,
    replace: ReplacementCoordinator<L>,
}

impl UpdateOrchestrator<GitCli, CommandToolchain, DetachedLauncher> {
    /// Orchestrator wired to `git`, the configured toolchain and a detached launcher.
    pub fn from_config(layout: InstallLayout, config: UpdateConfig) -> Self {
        let scm = GitCli::new(&layout.install_dir);
        let toolchain = CommandToolchain::new(config.build.clone());
        Self::new(layout, config, scm, toolchain, DetachedLauncher)
    }
}

impl<S, T, L> UpdateOrchestrator<S, T, L>
where
    S: SourceControl,
    T: Toolchain,
    L: HelperLauncher,
{
    pub fn new(layout: InstallLayout, config: UpdateConfig, scm: S, toolchain: T, launcher: L) -> Self {
        let sync = RemoteSyncEngine::new(scm, config.remote.clone());
        let build = BuildPipeline::new(toolchain);
        let replace = ReplacementCoordinator::new(layout.clone(), config.replacement.clone(), launcher);
        Self {
            layout,
            config,
            sync,
            build,
            replace,
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Dispatch on [`UpdateOptions::check_only`].
    pub fn execute(
        &self,
        options: UpdateOptions,
        observer: &dyn UpdateObserver,
    ) -> Result<Report, UpdateError> {
        if options.check_only {
            self.check(observer).map(Report::Check)
        } else {
            self.update(options.force, observer).map(Report::Update)
        }
    }

    fn current_version(&self) -> Version {
        read_version(&self.layout.install_dir.join(&self.config.version_marker))
    }

    // -- check ----------------------------------------------------------------

    /// Fetch and compare against the remote branch. Never touches the work tree.
    pub fn check(&self, observer: &dyn UpdateObserver) -> Result<CheckReport, UpdateError> {
        observer.progress(Stage::CheckingVersion, "Checking for updates...");
        let current_version = self.current_version();
        let pending = describe_pending(&pending::inspect_at(&self.layout, &self.config.replacement)?);

        if !self.sync.scm().is_work_tree() {
            return Ok(CheckReport {
                current_version,
                availability: Availability::NotTracked,
                incoming: Vec::new(),
                pending,
            });
        }

        self.sync.fetch()?;
        let status = self.sync.compare()?;
        let incoming = if status.is_current() {
            Vec::new()
        } else {
            self.sync.incoming_changes(CHANGELOG_LINES)
        };

        Ok(CheckReport {
            current_version,
            availability: status.into(),
            incoming,
            pending,
        })
    }

    // -- update ---------------------------------------------------------------

    /// Sync with the remote and, if the version changed (or `force`), rebuild
    /// and replace the live executable.
    pub fn update(
        &self,
        force: bool,
        observer: &dyn UpdateObserver,
    ) -> Result<UpdateSession, UpdateError> {
        let leftovers = self.reconcile_pending(observer)?;

        observer.progress(Stage::CheckingVersion, "Starting update process...");
        let mut session = UpdateSession::start(self.current_version(), force);
        session.warnings.extend(leftovers);

        let repo = match self.sync.ensure_repository() {
            Ok(repo) => repo,
            Err(UpdateError::NotUpgradable { reason }) => {
                let msg = format!("cannot track the remote ({reason}); rebuilding in place");
                observer.warning(&msg);
                session.warnings.push(msg);
                return Ok(self.rebuild_in_place(session, observer));
            }
            Err(err) => return Err(err),
        };
        if repo == RepoState::Initialized {
            observer.progress(Stage::Syncing, "Initialized git repository");
        }

        observer.progress(Stage::Syncing, "Fetching updates...");
        self.sync.fetch()?;
        let status = self.sync.compare()?;
        if status.is_current() && !force {
            observer.progress(Stage::Syncing, "Already up to date");
            return Ok(session);
        }

        observer.progress(Stage::Syncing, "Saving local changes...");
        let mut stash = self.sync.stash(Local::now())?;
        session.stashed = stash.created();

        let session = self.sync_build_swap(session, observer);
        Ok(self.finish(session, &mut stash, observer))
    }

    /// Build and swap from the current tree without touching git.
    pub fn self_update(&self, observer: &dyn UpdateObserver) -> Result<UpdateSession, UpdateError> {
        let leftovers = self.reconcile_pending(observer)?;
        observer.progress(Stage::CheckingVersion, "Performing self-update...");
        let mut session = UpdateSession::start(self.current_version(), true);
        session.warnings.extend(leftovers);
        Ok(self.rebuild_in_place(session, observer))
    }

    fn rebuild_in_place(&self, session: UpdateSession, observer: &dyn UpdateObserver) -> UpdateSession {
        let session = self.build_and_swap(session, observer);
        self.finish(session, &mut Stash::none(), observer)
    }

    fn sync_build_swap(
        &self,
        mut session: UpdateSession,
        observer: &dyn UpdateObserver,
    ) -> UpdateSession {
        observer.progress(Stage::Syncing, "Downloading updates...");
        match self.sync.integrate() {
            Ok(IntegrateOutcome::ResetAfterConflict) => {
                session.conflict = true;
                observer.warning("Merge conflicts detected; reset to the latest remote version");
            }
            Ok(IntegrateOutcome::Merged | IntegrateOutcome::Adopted) => {}
            Err(err) => return rolled_back(session, Stage::Syncing, err),
        }

        session.new_version = self.current_version();
        if session.new_version == session.previous_version && !session.force {
            if session.new_version.is_unknown() {
                let msg = "version marker not found; use --force to rebuild anyway".to_string();
                observer.warning(&msg);
                session.warnings.push(msg);
            }
            observer.progress(Stage::Syncing, "Already up to date");
            session.outcome = Outcome::Skipped;
            return session;
        }

        self.build_and_swap(session, observer)
    }

    fn build_and_swap(&self, mut session: UpdateSession, observer: &dyn UpdateObserver) -> UpdateSession {
        observer.progress(Stage::Building, "Building new version...");
        let candidate = match self
            .build
            .build(&self.layout.install_dir, &self.layout.candidate())
        {
            Ok(candidate) => candidate,
            Err(err) => return rolled_back(session, Stage::Building, err),
        };
        session.new_version = self.current_version();

        let plan = self.replace.plan();
        session.plan = Some(plan);
        observer.progress(Stage::Swapping, &format!("Replacing executable ({plan})..."));
        match self
            .replace
            .swap(&candidate, &session.previous_version, &session.new_version)
        {
            Ok(SwapOutcome::Replaced) => {
                session.outcome = Outcome::Completed;
            }
            Ok(SwapOutcome::Staged { .. }) => {
                session.outcome = Outcome::Completed;
                session.staged = true;
            }
            Err(err) => return rolled_back(session, Stage::Swapping, err),
        }
        session
    }

    /// Terminal bookkeeping shared by every path that may hold a stash.
    fn finish(
        &self,
        mut session: UpdateSession,
        stash: &mut Stash,
        observer: &dyn UpdateObserver,
    ) -> UpdateSession {
        if stash.is_pending() {
            observer.progress(Stage::Syncing, "Restoring local changes...");
        }
        match self.sync.restore_stash(stash) {
            StashRestore::NotNeeded | StashRestore::Restored => {}
            StashRestore::Failed { label, .. } => {
                let msg = format!(
                    "could not restore local changes; they are saved in git stash as \"{label}\""
                );
                observer.warning(&msg);
                session.warnings.push(msg);
            }
        }

        if session.outcome == Outcome::Completed && self.sync.scm().is_work_tree() {
            let recent = self.sync.recent_changes(CHANGELOG_LINES);
            if !recent.is_empty() {
                observer.changes("Recent changes:", &recent);
            }
        }
        session
    }

    /// Deal with markers left by an earlier deferred swap. Returns warnings.
    fn reconcile_pending(&self, observer: &dyn UpdateObserver) -> Result<Vec<String>, UpdateError> {
        let state = pending::inspect_at(&self.layout, &self.config.replacement)?;
        let message = match &state {
            PendingState::None => return Ok(Vec::new()),
            PendingState::Waiting(update) => {
                return Err(UpdateError::UpdatePending {
                    staged_at: update.staged_at.to_rfc3339(),
                });
            }
            PendingState::Applied(update) => {
                observer.progress(
                    Stage::CheckingVersion,
                    &format!("Previous update to {} was applied", update.new_version),
                );
                pending::clear_at(&self.layout)?;
                return Ok(Vec::new());
            }
            PendingState::Stalled { reason, .. } => {
                format!("previous deferred update did not complete: {reason}")
            }
            PendingState::Interrupted(update) => format!(
                "previous deferred update to {} (staged at {}) was interrupted before the swap",
                update.new_version,
                update.staged_at.to_rfc3339()
            ),
        };

        observer.warning(&message);
        self.discard_stage();
        pending::clear_at(&self.layout)?;
        Ok(vec![message])
    }

    /// Remove the leftovers of an abandoned deferred swap. The backup is only
    /// dropped while the live executable still exists.
    fn discard_stage(&self) {
        let _ = std::fs::remove_file(self.layout.candidate());
        let _ = std::fs::remove_file(self.layout.helper_script());
        if self.layout.live.is_file() {
            let _ = std::fs::remove_file(self.layout.backup());
            let _ = std::fs::remove_file(self.layout.displaced());
        }
    }
}

fn rolled_back(mut session: UpdateSession, stage: Stage, err: UpdateError) -> UpdateSession {
    tracing::warn!(%stage, error = %err, "update rolled back");
    session.outcome = Outcome::RolledBack;
    session.failed_stage = Some(stage);
    session.failure = Some(err);
    session
}

fn describe_pending(state: &PendingState) -> Option<String> {
    match state {
        PendingState::None => None,
        PendingState::Waiting(u) => Some(format!(
            "update to {} staged at {} is waiting for the tool to exit",
            u.new_version,
            u.staged_at.to_rfc3339()
        )),
        PendingState::Applied(u) => Some(format!("update to {} was applied", u.new_version)),
        PendingState::Stalled { reason, .. } => {
            Some(format!("deferred update stalled: {reason}"))
        }
        PendingState::Interrupted(u) => Some(format!(
            "deferred update to {} was interrupted",
            u.new_version
        )),
    }
}
