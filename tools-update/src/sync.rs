//! Remote sync engine: bring the install directory's work tree up to date
//! with `<remote>/<branch>` without losing uncommitted edits.
//!
//! Policy:
//! 1. `ensure_repository`: init + register the remote on first run.
//! 2. `fetch`: failure is fatal ([`UpdateError::RemoteUnavailable`]).
//! 3. `stash`: tracked modifications only, under a timestamped label.
//! 4. `integrate`: pull; on conflict abort the merge and hard-reset to the
//!    remote tip (remote always wins).
//! 5. `restore_stash`: at most once per [`Stash`], failures are warnings.

use chrono::{DateTime, Local};

use tools_core::RemoteConfig;

use crate::command::CommandOutput;
use crate::error::UpdateError;
use crate::git::SourceControl;

/// Whether the work tree existed or was created by this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Existing,
    /// Freshly initialised: no local commits, integration is a hard reset.
    Initialized,
}

/// Read-only comparison of `HEAD` against the remote tracking ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStatus {
    /// Commits on the remote branch missing locally.
    pub behind: usize,
    /// Local commits missing on the remote branch.
    pub ahead: usize,
    /// `HEAD` does not exist yet (unborn branch).
    pub unborn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Behind,
    Ahead,
    Diverged,
}

impl RemoteStatus {
    pub fn classify(&self) -> SyncStatus {
        if self.unborn {
            return SyncStatus::Behind;
        }
        match (self.behind, self.ahead) {
            (0, 0) => SyncStatus::UpToDate,
            (_, 0) => SyncStatus::Behind,
            (0, _) => SyncStatus::Ahead,
            _ => SyncStatus::Diverged,
        }
    }

    /// Nothing to pull from the remote.
    pub fn is_current(&self) -> bool {
        !self.unborn && self.behind == 0
    }
}

/// How the remote branch was integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrateOutcome {
    /// Fast-forward or clean merge.
    Merged,
    /// The merge conflicted; the tree was hard-reset to the remote tip.
    ResetAfterConflict,
    /// No local history existed; the tree was reset onto the remote tip.
    Adopted,
}

/// A stash taken before integration. Restoration happens at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stash {
    pub label: String,
    created: bool,
    consumed: bool,
}

impl Stash {
    pub fn none() -> Self {
        Self {
            label: String::new(),
            created: false,
            consumed: false,
        }
    }

    pub fn created(&self) -> bool {
        self.created
    }

    /// A stash exists and has not been restored yet.
    pub fn is_pending(&self) -> bool {
        self.created && !self.consumed
    }
}

/// Result of a restoration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashRestore {
    /// Nothing was stashed, or restoration already ran.
    NotNeeded,
    Restored,
    /// `git stash pop` failed; the changes remain in the stash.
    Failed { label: String, output: String },
}

pub struct RemoteSyncEngine<S> {
    scm: S,
    remote: RemoteConfig,
}

impl<S: SourceControl> RemoteSyncEngine<S> {
    pub fn new(scm: S, remote: RemoteConfig) -> Self {
        Self { scm, remote }
    }

    pub fn scm(&self) -> &S {
        &self.scm
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    pub fn ensure_repository(&self) -> Result<RepoState, UpdateError> {
        if self.scm.is_work_tree() {
            return Ok(RepoState::Existing);
        }
        tracing::info!(url = %self.remote.url, "initializing git repository");
        self.scm
            .init(&self.remote.name, &self.remote.url)
            .map_err(|err| UpdateError::NotUpgradable {
                reason: err.to_string(),
            })?;
        Ok(RepoState::Initialized)
    }

    pub fn fetch(&self) -> Result<(), UpdateError> {
        tracing::debug!(remote = %self.remote.name, "fetching");
        self.scm.fetch(&self.remote.name)
    }

    pub fn compare(&self) -> Result<RemoteStatus, UpdateError> {
        let tracking = self.remote.tracking_ref();
        if self.scm.head().is_none() {
            return Ok(RemoteStatus {
                behind: self.scm.rev_count(&tracking).unwrap_or(0),
                ahead: 0,
                unborn: true,
            });
        }
        Ok(RemoteStatus {
            behind: self.scm.rev_count(&format!("HEAD..{tracking}"))?,
            ahead: self.scm.rev_count(&format!("{tracking}..HEAD"))?,
            unborn: false,
        })
    }

    /// Stash tracked modifications. Returns [`Stash::none`] when the tree is clean.
    pub fn stash(&self, now: DateTime<Local>) -> Result<Stash, UpdateError> {
        if self.scm.head().is_none() || !self.scm.has_local_changes()? {
            return Ok(Stash::none());
        }
        let label = stash_label(now);
        self.scm.stash_push(&label)?;
        tracing::info!(%label, "stashed local changes");
        Ok(Stash {
            label,
            created: true,
            consumed: false,
        })
    }

    pub fn integrate(&self) -> Result<IntegrateOutcome, UpdateError> {
        let tracking = self.remote.tracking_ref();

        if self.scm.head().is_none() {
            self.scm.reset_hard(&tracking)?;
            return Ok(IntegrateOutcome::Adopted);
        }

        let out = self.scm.pull(&self.remote.name, &self.remote.branch.0)?;
        if out.success {
            return Ok(IntegrateOutcome::Merged);
        }

        if is_conflict(&out) {
            tracing::warn!(target_ref = %tracking, "merge conflict, resetting to remote");
            self.scm.merge_abort();
            self.scm.reset_hard(&tracking)?;
            return Ok(IntegrateOutcome::ResetAfterConflict);
        }

        Err(UpdateError::SyncFailed {
            command: format!("pull {} {}", self.remote.name, self.remote.branch),
            output: out.text,
        })
    }

    /// Reapply `stash` if it exists and was not restored before.
    pub fn restore_stash(&self, stash: &mut Stash) -> StashRestore {
        if !stash.is_pending() {
            return StashRestore::NotNeeded;
        }
        stash.consumed = true;
        match self.scm.stash_pop() {
            Ok(_) => StashRestore::Restored,
            Err(err) => {
                tracing::warn!(label = %stash.label, error = %err, "stash pop failed");
                StashRestore::Failed {
                    label: stash.label.clone(),
                    output: err.to_string(),
                }
            }
        }
    }

    /// Commits on the remote branch not yet in `HEAD`.
    pub fn incoming_changes(&self, max: usize) -> Vec<String> {
        let tracking = self.remote.tracking_ref();
        let range = if self.scm.head().is_some() {
            format!("HEAD..{tracking}")
        } else {
            tracking
        };
        self.scm.log_oneline(&range, max).unwrap_or_default()
    }

    /// The latest commits on `HEAD`.
    pub fn recent_changes(&self, max: usize) -> Vec<String> {
        self.scm.log_oneline("HEAD", max).unwrap_or_default()
    }
}

pub fn stash_label(now: DateTime<Local>) -> String {
    format!(
        "tools auto-stash before update at {}",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Pull failures that mean "local and remote cannot be combined cleanly".
fn is_conflict(out: &CommandOutput) -> bool {
    out.mentions("conflict")
        || out.mentions("not possible to fast-forward")
        || out.mentions("divergent branches")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classify_status() {
        let s = |behind, ahead| RemoteStatus {
            behind,
            ahead,
            unborn: false,
        };
        assert_eq!(s(0, 0).classify(), SyncStatus::UpToDate);
        assert_eq!(s(3, 0).classify(), SyncStatus::Behind);
        assert_eq!(s(0, 2).classify(), SyncStatus::Ahead);
        assert_eq!(s(1, 1).classify(), SyncStatus::Diverged);
        assert!(s(0, 2).is_current());
        assert!(!s(1, 0).is_current());
    }

    #[test]
    fn unborn_head_is_always_behind() {
        let status = RemoteStatus {
            behind: 0,
            ahead: 0,
            unborn: true,
        };
        assert_eq!(status.classify(), SyncStatus::Behind);
        assert!(!status.is_current());
    }

    #[test]
    fn stash_label_carries_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            stash_label(now),
            "tools auto-stash before update at 2026-03-14 09:26:53"
        );
    }

    #[test]
    fn conflict_detection() {
        let failed = |text: &str| CommandOutput {
            success: false,
            code: Some(1),
            text: text.to_string(),
        };
        assert!(is_conflict(&failed(
            "CONFLICT (content): Merge conflict in version.go\nAutomatic merge failed"
        )));
        assert!(is_conflict(&failed(
            "fatal: Not possible to fast-forward, aborting."
        )));
        assert!(!is_conflict(&failed("fatal: couldn't find remote ref main")));
    }

    #[test]
    fn empty_stash_is_never_pending() {
        let stash = Stash::none();
        assert!(!stash.created());
        assert!(!stash.is_pending());
    }
}
