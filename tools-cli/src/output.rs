//! Console rendering: colored progress for humans, JSON for scripts.

use anyhow::{anyhow, Result};
use colored::Colorize;
use serde::Serialize;

use tools_core::Version;
use tools_update::{Availability, CheckReport, Outcome, Stage, UpdateObserver, UpdateSession};

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Prints progress and change lists to stdout and warnings to stderr.
/// In JSON mode only warnings are printed; the final report carries the rest.
pub struct ConsoleObserver {
    json: bool,
}

impl ConsoleObserver {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl UpdateObserver for ConsoleObserver {
    fn progress(&self, _stage: Stage, message: &str) {
        if !self.json {
            println!("{}", message.yellow());
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {message}", "warning:".yellow().bold());
    }

    fn changes(&self, heading: &str, lines: &[String]) {
        if self.json {
            return;
        }
        println!();
        println!("{}", heading.cyan().bold());
        for line in lines {
            println!("  {}", line.cyan());
        }
    }
}

// ---------------------------------------------------------------------------
// Update session
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SessionJson<'a> {
    outcome: Outcome,
    previous_version: &'a Version,
    new_version: &'a Version,
    forced: bool,
    stashed: bool,
    conflict: bool,
    staged: bool,
    strategy: Option<String>,
    failed_stage: Option<String>,
    error: Option<String>,
    warnings: &'a [String],
}

impl<'a> From<&'a UpdateSession> for SessionJson<'a> {
    fn from(s: &'a UpdateSession) -> Self {
        Self {
            outcome: s.outcome,
            previous_version: &s.previous_version,
            new_version: &s.new_version,
            forced: s.force,
            stashed: s.stashed,
            conflict: s.conflict,
            staged: s.staged,
            strategy: s.plan.map(|p| p.to_string()),
            failed_stage: s.failed_stage.map(|st| st.to_string()),
            error: s.failure.as_ref().map(|e| e.to_string()),
            warnings: &s.warnings,
        }
    }
}

/// Report a finished session. `RolledBack` becomes an error so the process
/// exits non-zero.
pub fn finish_session(session: UpdateSession, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&SessionJson::from(&session))?);
    } else {
        print_session(&session);
    }

    if session.outcome != Outcome::RolledBack {
        return Ok(());
    }
    let stage = session
        .failed_stage
        .map_or_else(|| "updating".to_string(), |s| s.to_string());
    Err(match session.failure {
        Some(err) => anyhow::Error::new(err).context(format!("update failed while {stage}")),
        None => anyhow!("update failed while {stage}"),
    })
}

fn print_session(session: &UpdateSession) {
    let prev = &session.previous_version;
    let new = &session.new_version;
    match session.outcome {
        Outcome::Skipped => {
            println!("{} Already up to date ({prev})", "✓".green());
        }
        Outcome::Completed if session.staged => {
            println!(
                "{} Update to {new} staged; it takes effect the next time tools starts",
                "✓".green()
            );
        }
        Outcome::Completed if prev == new => {
            println!("{} Rebuilt {new}", "✓".green());
        }
        Outcome::Completed => {
            println!("{} Updated {prev} → {new}", "✓".green());
        }
        Outcome::RolledBack => {
            eprintln!(
                "{} Update rolled back; {} is still installed",
                "✗".red(),
                prev
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Check report
// ---------------------------------------------------------------------------

pub fn print_check(report: &CheckReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let version = &report.current_version;
    match report.availability {
        Availability::NotTracked => {
            println!(
                "tools {version} is not tracked by git; run `tools update` to start tracking or `tools self-update` to rebuild"
            );
        }
        Availability::UpToDate => {
            println!("{} tools {version} is up to date", "✓".green());
        }
        Availability::UpdateAvailable { commits } => {
            println!(
                "{} Update available: {commits} new commit{} (installed {version})",
                "↑".green().bold(),
                plural(commits)
            );
        }
        Availability::Ahead { commits } => {
            println!(
                "tools {version} is {commits} commit{} ahead of the remote; nothing to update",
                plural(commits)
            );
        }
        Availability::Diverged { behind, ahead } => {
            println!(
                "{} Local history has diverged ({behind} behind, {ahead} ahead); `tools update` resets to the remote on conflict",
                "!".yellow().bold()
            );
        }
    }

    if !report.incoming.is_empty() {
        println!();
        println!("{}", "Incoming changes:".cyan().bold());
        for line in &report.incoming {
            println!("  {}", line.cyan());
        }
        println!();
        println!("Run `tools update` to install.");
    }
    if let Some(pending) = &report.pending {
        println!("{} {pending}", "note:".yellow().bold());
    }
    Ok(())
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
