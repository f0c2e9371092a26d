//! Source-control collaborator.
//!
//! [`SourceControl`] is the narrow set of git operations the sync engine
//! needs; [`GitCli`] implements it by running the `git` binary in the
//! install directory.

use std::path::{Path, PathBuf};

use tools_core::RemoteName;

use crate::command::{run_captured, CommandOutput};
use crate::error::UpdateError;

pub trait SourceControl {
    /// Whether the working directory is already a git work tree.
    fn is_work_tree(&self) -> bool;

    /// `git init` followed by registering `remote` at `url`.
    fn init(&self, remote: &RemoteName, url: &str) -> Result<(), UpdateError>;

    /// Retrieve remote history without merging.
    fn fetch(&self, remote: &RemoteName) -> Result<(), UpdateError>;

    /// Commit id of `HEAD`, or `None` on an unborn branch.
    fn head(&self) -> Option<String>;

    /// Number of commits in a revision range such as `HEAD..origin/main`.
    fn rev_count(&self, range: &str) -> Result<usize, UpdateError>;

    /// Whether tracked files carry uncommitted modifications.
    fn has_local_changes(&self) -> Result<bool, UpdateError>;

    fn stash_push(&self, label: &str) -> Result<(), UpdateError>;

    fn stash_pop(&self) -> Result<CommandOutput, UpdateError>;

    /// Raw pull output. Only a failure to run git is an `Err`; callers
    /// inspect `success` and the text for conflicts.
    fn pull(&self, remote: &RemoteName, branch: &str) -> Result<CommandOutput, UpdateError>;

    /// Discard an in-progress merge. Best-effort.
    fn merge_abort(&self);

    fn reset_hard(&self, target: &str) -> Result<(), UpdateError>;

    /// One-line summaries (`<sha> <subject>`) for a revision range, newest first.
    fn log_oneline(&self, range: &str, max: usize) -> Result<Vec<String>, UpdateError>;
}

/// [`SourceControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, UpdateError> {
        run_captured("git", args, &self.dir).map_err(|e| UpdateError::SyncFailed {
            command: args.join(" "),
            output: e.to_string(),
        })
    }

    /// Run and require a zero exit status.
    fn run_ok(&self, args: &[&str]) -> Result<CommandOutput, UpdateError> {
        let out = self.run(args)?;
        if out.success {
            Ok(out)
        } else {
            Err(UpdateError::SyncFailed {
                command: args.join(" "),
                output: out.text,
            })
        }
    }
}

impl SourceControl for GitCli {
    fn is_work_tree(&self) -> bool {
        self.dir.join(".git").exists()
    }

    fn init(&self, remote: &RemoteName, url: &str) -> Result<(), UpdateError> {
        self.run_ok(&["init"])?;
        let added = self.run(&["remote", "add", &remote.0, url])?;
        if !added.success {
            // Already registered is fine; anything else is not.
            self.run_ok(&["remote", "get-url", &remote.0])?;
        }
        Ok(())
    }

    fn fetch(&self, remote: &RemoteName) -> Result<(), UpdateError> {
        let out = run_captured("git", ["fetch", remote.0.as_str()], &self.dir).map_err(|e| {
            UpdateError::RemoteUnavailable {
                remote: remote.0.clone(),
                output: e.to_string(),
            }
        })?;
        if out.success {
            Ok(())
        } else {
            Err(UpdateError::RemoteUnavailable {
                remote: remote.0.clone(),
                output: out.text,
            })
        }
    }

    fn head(&self) -> Option<String> {
        let out = self.run(&["rev-parse", "--verify", "-q", "HEAD"]).ok()?;
        out.success.then(|| out.text.trim().to_string())
    }

    fn rev_count(&self, range: &str) -> Result<usize, UpdateError> {
        let out = self.run_ok(&["rev-list", "--count", range])?;
        out.text
            .trim()
            .parse()
            .map_err(|_| UpdateError::SyncFailed {
                command: format!("rev-list --count {range}"),
                output: out.text.clone(),
            })
    }

    fn has_local_changes(&self) -> Result<bool, UpdateError> {
        let out = self.run_ok(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!out.text.trim().is_empty())
    }

    fn stash_push(&self, label: &str) -> Result<(), UpdateError> {
        self.run_ok(&["stash", "push", "-m", label]).map(|_| ())
    }

    fn stash_pop(&self) -> Result<CommandOutput, UpdateError> {
        self.run_ok(&["stash", "pop"])
    }

    fn pull(&self, remote: &RemoteName, branch: &str) -> Result<CommandOutput, UpdateError> {
        self.run(&["pull", "--no-rebase", "--no-edit", &remote.0, branch])
    }

    fn merge_abort(&self) {
        let _ = self.run(&["merge", "--abort"]);
    }

    fn reset_hard(&self, target: &str) -> Result<(), UpdateError> {
        self.run_ok(&["reset", "--hard", target]).map(|_| ())
    }

    fn log_oneline(&self, range: &str, max: usize) -> Result<Vec<String>, UpdateError> {
        let max = format!("--max-count={max}");
        let out = self.run_ok(&["log", "--oneline", &max, range])?;
        Ok(out
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}
