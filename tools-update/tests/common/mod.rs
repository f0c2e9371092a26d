//! Git fixtures: a bare remote, an upstream clone that publishes commits,
//! and the install clone the update subsystem works on.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub const GITIGNORE: &str = "/tools\n/tools.*\n/built.bin\n/.tools-update-*\n/tools-update-helper.*\n";

/// Run git with a fixed identity; panics with output on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.test",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed in {}: {}{}",
        dir.display(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn manifest(version: &str) -> String {
    format!("[package]\nname = \"tools\"\nversion = \"{version}\"\n")
}

pub struct Fixture {
    pub root: TempDir,
    pub remote: PathBuf,
    pub upstream: PathBuf,
    pub install: PathBuf,
}

impl Fixture {
    /// Remote with one commit at `version`, cloned into `install`.
    pub fn new(version: &str) -> Self {
        let root = TempDir::new().expect("root");
        let remote = root.path().join("remote.git");
        let upstream = root.path().join("upstream");
        let install = root.path().join("install");
        fs::create_dir_all(&remote).unwrap();
        fs::create_dir_all(&upstream).unwrap();

        git(&remote, &["init", "--bare"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        git(&upstream, &["init"]);
        git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(upstream.join("Cargo.toml"), manifest(version)).unwrap();
        fs::write(upstream.join("README.md"), "tools\n").unwrap();
        fs::write(upstream.join(".gitignore"), GITIGNORE).unwrap();
        git(&upstream, &["add", "."]);
        git(&upstream, &["commit", "-m", "initial"]);
        git(
            &upstream,
            &["remote", "add", "origin", remote.to_str().unwrap()],
        );
        git(&upstream, &["push", "-u", "origin", "main"]);

        git(
            root.path(),
            &["clone", remote.to_str().unwrap(), install.to_str().unwrap()],
        );
        // The code under test runs plain `git`, so the clone needs its own identity.
        git(&install, &["config", "user.name", "Installer"]);
        git(&install, &["config", "user.email", "installer@example.test"]);
        git(&install, &["config", "commit.gpgsign", "false"]);

        Self {
            root,
            remote,
            upstream,
            install,
        }
    }

    /// Commit `content` to `file` upstream and push it.
    pub fn publish(&self, file: &str, content: &str, message: &str) {
        fs::write(self.upstream.join(file), content).unwrap();
        git(&self.upstream, &["add", file]);
        git(&self.upstream, &["commit", "-m", message]);
        git(&self.upstream, &["push", "origin", "main"]);
    }

    /// Commit `content` to `file` in the install clone without pushing.
    pub fn commit_locally(&self, file: &str, content: &str, message: &str) {
        fs::write(self.install.join(file), content).unwrap();
        git(&self.install, &["add", file]);
        git(&self.install, &["commit", "-m", message]);
    }

    pub fn read_installed(&self, file: &str) -> String {
        fs::read_to_string(self.install.join(file)).unwrap()
    }

    pub fn stash_list(&self) -> String {
        git(&self.install, &["stash", "list"])
    }
}

/// Skip a test body when git is not installed.
macro_rules! require_git {
    () => {
        if !common::git_available() {
            eprintln!("git not available; skipping");
            return;
        }
    };
}
