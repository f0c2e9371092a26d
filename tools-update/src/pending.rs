//! Pending marker for deferred replacements.
//!
//! Phase 1 (this process) writes `.tools-update-pending.json` before launching
//! the helper; phase 2 (the helper) removes it once the swap is done. A later
//! run uses [`inspect_at`] to tell a swap that is still waiting from one that
//! stalled or was interrupted. A helper that outlived its polling bound
//! without finishing or writing the stalled marker is treated as dead.
//!
//! Writes use the `.tmp` + rename pattern so a crash never leaves a torn marker.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tools_core::{InstallLayout, ReplacementConfig, Version};

use crate::error::{io_err, UpdateError};

/// Slack on top of the helper's own polling bound before its marker is
/// considered abandoned.
pub const HELPER_GRACE_SECS: i64 = 300;

/// On-disk pending marker payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingUpdate {
    pub staged_at: DateTime<Utc>,
    pub live: PathBuf,
    pub candidate: PathBuf,
    pub backup: PathBuf,
    pub displaced: PathBuf,
    /// SHA-256 of the candidate at staging time.
    pub candidate_sha256: String,
    pub previous_version: Version,
    pub new_version: Version,
}

/// What a leftover marker means, as seen by a later run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    /// No deferred update is outstanding.
    None,
    /// The helper is (presumably) still waiting for the tool to exit.
    Waiting(PendingUpdate),
    /// The live executable already is the candidate; only the marker was left.
    Applied(PendingUpdate),
    /// The helper gave up and left a stalled marker with its reason.
    Stalled {
        update: Option<PendingUpdate>,
        reason: String,
    },
    /// The live executable was never replaced and no helper can still be
    /// working on it: the candidate is gone, or the helper's deadline passed.
    Interrupted(PendingUpdate),
}

/// SHA-256 hex digest of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String, UpdateError> {
    let mut file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Load the pending marker, `None` if it does not exist.
pub fn load_at(layout: &InstallLayout) -> Result<Option<PendingUpdate>, UpdateError> {
    let path = layout.pending_marker();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save the pending marker atomically.
pub fn save_at(layout: &InstallLayout, update: &PendingUpdate) -> Result<(), UpdateError> {
    let path = layout.pending_marker();
    let json = serde_json::to_string_pretty(update)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Remove the pending and stalled markers. Missing files are fine.
pub fn clear_at(layout: &InstallLayout) -> Result<(), UpdateError> {
    for path in [layout.pending_marker(), layout.stalled_marker()] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }
    }
    Ok(())
}

/// Whether a helper launched for `update` must have finished or given up by
/// `now`. A live helper polls at most `max_poll_attempts` times,
/// `poll_interval_secs` apart.
pub fn helper_expired(
    update: &PendingUpdate,
    replacement: &ReplacementConfig,
    now: DateTime<Utc>,
) -> bool {
    let polling = replacement
        .poll_interval_secs
        .max(1)
        .saturating_mul(u64::from(replacement.max_poll_attempts.max(1)));
    let limit = i64::try_from(polling)
        .unwrap_or(i64::MAX)
        .saturating_add(HELPER_GRACE_SECS);
    now.signed_duration_since(update.staged_at).num_seconds() > limit
}

/// Classify leftover markers.
///
/// Precedence: stalled marker, then live == candidate digest (applied), then
/// candidate missing or helper deadline passed (interrupted), otherwise
/// waiting.
pub fn inspect_at(
    layout: &InstallLayout,
    replacement: &ReplacementConfig,
) -> Result<PendingState, UpdateError> {
    let stalled = layout.stalled_marker();
    let update = load_at(layout)?;

    if stalled.exists() {
        let reason = std::fs::read_to_string(&stalled)
            .map_err(|e| io_err(&stalled, e))?
            .trim()
            .to_string();
        return Ok(PendingState::Stalled { update, reason });
    }

    let Some(update) = update else {
        return Ok(PendingState::None);
    };

    if update.live.is_file() && file_sha256(&update.live)? == update.candidate_sha256 {
        return Ok(PendingState::Applied(update));
    }
    if !update.candidate.exists() || helper_expired(&update, replacement, Utc::now()) {
        return Ok(PendingState::Interrupted(update));
    }
    Ok(PendingState::Waiting(update))
}
