//! Replacement coordinator: promote a candidate to the live path.
//!
//! ## Protocol
//!
//! 1. Copy the live executable to `<live>.backup`. Failure aborts before
//!    anything destructive happens.
//! 2. `Immediate`: rename the candidate over the live path (atomic on the
//!    same filesystem). On failure, rename the backup over the live path and
//!    drop the candidate; on success drop the backup.
//! 3. `Deferred`: write the pending marker, write the helper script, launch
//!    it detached, and return. The helper finishes the swap after the tool
//!    exits; see [`crate::helper_script`].
//!
//! At every point at least one of {live, backup} holds a complete executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;

use tools_core::{InstallLayout, ReplacementConfig, ReplacementPlan, Version};

use crate::build::{set_executable, CandidateBinary};
use crate::error::{io_err, UpdateError};
use crate::helper_script::{self, HelperParams};
use crate::pending::{self, PendingUpdate};

/// Starts the deferred helper without waiting for it.
pub trait HelperLauncher {
    fn launch(&self, script: &Path) -> std::io::Result<()>;
}

/// Launches the helper as an independent process: its own process group on
/// unix, a detached console-less process on windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLauncher;

impl HelperLauncher for DetachedLauncher {
    #[cfg(unix)]
    fn launch(&self, script: &Path) -> std::io::Result<()> {
        use std::os::unix::process::CommandExt;

        Command::new("sh")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map(drop)
    }

    #[cfg(windows)]
    fn launch(&self, script: &Path) -> std::io::Result<()> {
        use std::os::windows::process::CommandExt;

        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

        Command::new("cmd")
            .arg("/C")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
            .spawn()
            .map(drop)
    }

    #[cfg(not(any(unix, windows)))]
    fn launch(&self, _script: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "detached helpers are not supported on this platform",
        ))
    }
}

/// Result of a successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The live path now holds the candidate.
    Replaced,
    /// The helper was launched; the swap happens after the tool exits.
    Staged { script: PathBuf },
}

pub struct ReplacementCoordinator<L> {
    layout: InstallLayout,
    replacement: ReplacementConfig,
    launcher: L,
}

impl<L: HelperLauncher> ReplacementCoordinator<L> {
    pub fn new(layout: InstallLayout, replacement: ReplacementConfig, launcher: L) -> Self {
        Self {
            layout,
            replacement,
            launcher,
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn plan(&self) -> ReplacementPlan {
        self.replacement.strategy.plan()
    }

    /// Back up the live executable, then replace it per [`Self::plan`].
    pub fn swap(
        &self,
        candidate: &CandidateBinary,
        previous: &Version,
        new: &Version,
    ) -> Result<SwapOutcome, UpdateError> {
        self.backup()?;
        match self.plan() {
            ReplacementPlan::Immediate => self.replace_now(candidate),
            ReplacementPlan::Deferred => self.stage(candidate, previous, new),
        }
    }

    /// Copy the live executable to the backup path.
    pub fn backup(&self) -> Result<(), UpdateError> {
        let live = &self.layout.live;
        let backup = self.layout.backup();
        std::fs::copy(live, &backup).map_err(|source| UpdateError::BackupFailed {
            live: live.clone(),
            backup: backup.clone(),
            source,
        })?;
        tracing::debug!(backup = %backup.display(), "live executable backed up");
        Ok(())
    }

    fn replace_now(&self, candidate: &CandidateBinary) -> Result<SwapOutcome, UpdateError> {
        let live = &self.layout.live;
        if let Err(source) = std::fs::rename(&candidate.path, live) {
            tracing::warn!(live = %live.display(), error = %source, "swap failed, restoring backup");
            self.restore_from_backup();
            let _ = std::fs::remove_file(&candidate.path);
            return Err(UpdateError::SwapFailed {
                live: live.clone(),
                source,
            });
        }

        let backup = self.layout.backup();
        if let Err(err) = std::fs::remove_file(&backup) {
            tracing::warn!(backup = %backup.display(), error = %err, "could not remove backup");
        }
        tracing::info!(live = %live.display(), "live executable replaced");
        Ok(SwapOutcome::Replaced)
    }

    /// Put the backup back on the live path. If even that fails the backup
    /// stays where it is, so a copy always survives.
    fn restore_from_backup(&self) {
        let backup = self.layout.backup();
        if let Err(err) = std::fs::rename(&backup, &self.layout.live) {
            tracing::error!(
                backup = %backup.display(),
                error = %err,
                "could not restore backup; it was left in place",
            );
        }
    }

    fn stage(
        &self,
        candidate: &CandidateBinary,
        previous: &Version,
        new: &Version,
    ) -> Result<SwapOutcome, UpdateError> {
        let marker = PendingUpdate {
            staged_at: Utc::now(),
            live: self.layout.live.clone(),
            candidate: candidate.path.clone(),
            backup: self.layout.backup(),
            displaced: self.layout.displaced(),
            candidate_sha256: candidate.sha256.clone(),
            previous_version: previous.clone(),
            new_version: new.clone(),
        };
        if let Err(err) = pending::save_at(&self.layout, &marker) {
            self.abandon_stage(candidate);
            return Err(err);
        }

        let script = self.layout.helper_script();
        let body = helper_script::render(&HelperParams::new(&self.layout, &self.replacement));
        let launched = std::fs::write(&script, body)
            .map_err(|e| io_err(&script, e))
            .and_then(|()| set_executable(&script))
            .and_then(|()| {
                self.launcher
                    .launch(&script)
                    .map_err(|source| UpdateError::HelperLaunchFailed {
                        script: script.clone(),
                        source,
                    })
            });

        if let Err(err) = launched {
            let _ = std::fs::remove_file(&script);
            let _ = pending::clear_at(&self.layout);
            self.abandon_stage(candidate);
            return Err(err);
        }

        tracing::info!(script = %script.display(), "deferred swap staged");
        Ok(SwapOutcome::Staged { script })
    }

    /// Drop the candidate and backup of a deferred swap that never started.
    /// The live executable is untouched at this point.
    fn abandon_stage(&self, candidate: &CandidateBinary) {
        let _ = std::fs::remove_file(&candidate.path);
        let _ = std::fs::remove_file(self.layout.backup());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;
    use tools_core::ReplacementStrategy;

    use crate::pending::{file_sha256, inspect_at, PendingState};

    #[derive(Default)]
    struct RecordingLauncher {
        fail: bool,
        launched: RefCell<Vec<PathBuf>>,
    }

    impl HelperLauncher for &RecordingLauncher {
        fn launch(&self, script: &Path) -> std::io::Result<()> {
            self.launched.borrow_mut().push(script.to_path_buf());
            if self.fail {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "spawn refused",
                ));
            }
            Ok(())
        }
    }

    fn install(tmp: &TempDir) -> (InstallLayout, CandidateBinary) {
        let layout = InstallLayout::at(tmp.path().join("tools")).unwrap();
        std::fs::write(&layout.live, b"old binary").unwrap();
        std::fs::write(layout.candidate(), b"new binary").unwrap();
        let candidate = CandidateBinary {
            path: layout.candidate(),
            sha256: file_sha256(&layout.candidate()).unwrap(),
        };
        (layout, candidate)
    }

    fn coordinator<'a>(
        layout: &InstallLayout,
        strategy: ReplacementStrategy,
        launcher: &'a RecordingLauncher,
    ) -> ReplacementCoordinator<&'a RecordingLauncher> {
        ReplacementCoordinator::new(
            layout.clone(),
            ReplacementConfig {
                strategy,
                ..ReplacementConfig::default()
            },
            launcher,
        )
    }

    fn versions() -> (Version, Version) {
        (Version::from("1.0.0"), Version::from("1.1.0"))
    }

    #[test]
    fn immediate_swap_replaces_and_drops_backup() {
        let tmp = TempDir::new().unwrap();
        let (layout, candidate) = install(&tmp);
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        let outcome = coordinator(&layout, ReplacementStrategy::Immediate, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap();

        assert_eq!(outcome, SwapOutcome::Replaced);
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"new binary");
        assert!(!layout.backup().exists());
        assert!(!layout.candidate().exists());
        assert!(launcher.launched.borrow().is_empty());
    }

    #[test]
    fn immediate_swap_failure_restores_live_from_backup() {
        let tmp = TempDir::new().unwrap();
        let (layout, mut candidate) = install(&tmp);
        candidate.path = tmp.path().join("vanished.new");
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        let err = coordinator(&layout, ReplacementStrategy::Immediate, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap_err();

        assert!(matches!(err, UpdateError::SwapFailed { .. }));
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"old binary");
    }

    #[test]
    fn backup_failure_aborts_before_touching_live() {
        let tmp = TempDir::new().unwrap();
        let (layout, candidate) = install(&tmp);
        std::fs::remove_file(&layout.live).unwrap();
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        let err = coordinator(&layout, ReplacementStrategy::Immediate, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap_err();

        assert!(matches!(err, UpdateError::BackupFailed { .. }));
        assert!(layout.candidate().exists(), "candidate must not be consumed");
        assert!(!layout.live.exists());
    }

    #[test]
    fn deferred_swap_stages_marker_and_script() {
        let tmp = TempDir::new().unwrap();
        let (layout, candidate) = install(&tmp);
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        let outcome = coordinator(&layout, ReplacementStrategy::Deferred, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap();

        let script = layout.helper_script();
        assert_eq!(
            outcome,
            SwapOutcome::Staged {
                script: script.clone()
            }
        );
        assert_eq!(*launcher.launched.borrow(), vec![script.clone()]);
        assert!(script.exists());
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"old binary");
        assert_eq!(std::fs::read(layout.backup()).unwrap(), b"old binary");

        match inspect_at(&layout, &ReplacementConfig::default()).unwrap() {
            PendingState::Waiting(update) => {
                assert_eq!(update.candidate_sha256, candidate.sha256);
                assert_eq!(update.new_version, new);
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn deferred_launch_failure_cleans_up_stage() {
        let tmp = TempDir::new().unwrap();
        let (layout, candidate) = install(&tmp);
        let launcher = RecordingLauncher {
            fail: true,
            ..RecordingLauncher::default()
        };
        let (old, new) = versions();

        let err = coordinator(&layout, ReplacementStrategy::Deferred, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap_err();

        assert!(matches!(err, UpdateError::HelperLaunchFailed { .. }));
        assert!(!layout.helper_script().exists());
        assert!(!layout.pending_marker().exists());
        assert!(!layout.backup().exists());
        assert!(!layout.candidate().exists());
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"old binary");
    }

    #[test]
    fn unwritable_pending_marker_drops_backup_and_candidate() {
        let tmp = TempDir::new().unwrap();
        let (layout, candidate) = install(&tmp);
        // A directory in the marker's place makes the final rename fail.
        std::fs::create_dir(layout.pending_marker()).unwrap();
        std::fs::write(layout.pending_marker().join("occupied"), b"x").unwrap();
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        let err = coordinator(&layout, ReplacementStrategy::Deferred, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap_err();

        assert!(matches!(err, UpdateError::Io { .. }));
        assert!(launcher.launched.borrow().is_empty());
        assert!(!layout.backup().exists());
        assert!(!layout.candidate().exists());
        assert!(!layout.helper_script().exists());
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"old binary");
    }

    #[test]
    #[cfg(unix)]
    fn generated_helper_completes_the_swap_when_tool_is_gone() {
        let tmp = TempDir::new().unwrap();
        // A name no real process carries, so the poll loop exits at once.
        let layout = InstallLayout::at(tmp.path().join("tools-helper-e2e-zz")).unwrap();
        std::fs::write(&layout.live, b"old binary").unwrap();
        std::fs::write(layout.candidate(), b"new binary").unwrap();
        let candidate = CandidateBinary {
            path: layout.candidate(),
            sha256: file_sha256(&layout.candidate()).unwrap(),
        };
        let launcher = RecordingLauncher::default();
        let (old, new) = versions();

        coordinator(&layout, ReplacementStrategy::Deferred, &launcher)
            .swap(&candidate, &old, &new)
            .unwrap();

        let status = Command::new("sh")
            .arg(layout.helper_script())
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(std::fs::read(&layout.live).unwrap(), b"new binary");
        assert!(!layout.backup().exists());
        assert!(!layout.displaced().exists());
        assert!(!layout.candidate().exists());
        assert!(!layout.pending_marker().exists());
        assert!(!layout.helper_script().exists());
        assert_eq!(inspect_at(&layout, &ReplacementConfig::default()).unwrap(), PendingState::None);
    }
}
