//! Build pipeline: compile the synced tree into a candidate executable.
//!
//! The toolchain runs in two independently failable steps (dependency fetch,
//! then compile). The compiled artifact is copied to the candidate path next
//! to the live executable; a failed build never leaves a candidate behind.

use std::path::{Path, PathBuf};

use tools_core::BuildConfig;

use crate::command::run_captured;
use crate::error::{io_err, UpdateError};
use crate::pending::file_sha256;

pub trait Toolchain {
    fn fetch_dependencies(&self, source_dir: &Path) -> Result<(), UpdateError>;

    /// Compile `source_dir` and place the resulting binary at `output`.
    fn compile(&self, source_dir: &Path, output: &Path) -> Result<(), UpdateError>;
}

/// [`Toolchain`] that runs the argv vectors from [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    config: BuildConfig,
}

impl CommandToolchain {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    fn run_step(&self, argv: &[String], dir: &Path) -> Result<(), UpdateError> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };
        let step = argv.join(" ");
        tracing::debug!(%step, dir = %dir.display(), "running build step");

        let out = run_captured(program, args, dir).map_err(|e| UpdateError::BuildFailed {
            step: step.clone(),
            output: e.to_string(),
        })?;
        if !out.success {
            return Err(UpdateError::BuildFailed {
                step,
                output: out.text,
            });
        }
        Ok(())
    }
}

impl Toolchain for CommandToolchain {
    fn fetch_dependencies(&self, source_dir: &Path) -> Result<(), UpdateError> {
        self.run_step(&self.config.fetch, source_dir)
    }

    fn compile(&self, source_dir: &Path, output: &Path) -> Result<(), UpdateError> {
        // An empty compile step would promote whatever artifact a past build left.
        if self.config.compile.is_empty() {
            return Err(UpdateError::BuildFailed {
                step: "compile".to_string(),
                output: "no compile command configured (build.compile is empty)".to_string(),
            });
        }
        self.run_step(&self.config.compile, source_dir)?;

        let artifact = source_dir.join(&self.config.artifact);
        if !artifact.is_file() {
            return Err(UpdateError::BuildFailed {
                step: self.config.compile.join(" "),
                output: format!("expected build artifact at {}", artifact.display()),
            });
        }
        std::fs::copy(&artifact, output).map_err(|e| io_err(output, e))?;
        Ok(())
    }
}

/// A freshly built executable that has not been promoted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBinary {
    pub path: PathBuf,
    pub sha256: String,
}

pub struct BuildPipeline<T> {
    toolchain: T,
}

impl<T: Toolchain> BuildPipeline<T> {
    pub fn new(toolchain: T) -> Self {
        Self { toolchain }
    }

    /// Build `source_dir` into `staging`.
    pub fn build(&self, source_dir: &Path, staging: &Path) -> Result<CandidateBinary, UpdateError> {
        remove_if_exists(staging)?;

        let result = self
            .toolchain
            .fetch_dependencies(source_dir)
            .and_then(|()| self.toolchain.compile(source_dir, staging))
            .and_then(|()| {
                if staging.is_file() {
                    Ok(())
                } else {
                    Err(UpdateError::BuildFailed {
                        step: "compile".to_string(),
                        output: format!("no binary produced at {}", staging.display()),
                    })
                }
            });

        if let Err(err) = result {
            let _ = std::fs::remove_file(staging);
            return Err(err);
        }

        set_executable(staging)?;
        let sha256 = file_sha256(staging)?;
        tracing::info!(path = %staging.display(), %sha256, "candidate built");
        Ok(CandidateBinary {
            path: staging.to_path_buf(),
            sha256,
        })
    }
}

fn remove_if_exists(path: &Path) -> Result<(), UpdateError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

#[cfg(unix)]
pub(crate) fn set_executable(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_executable(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records the steps it was asked to run; optionally fails one of them.
    struct ScriptedToolchain {
        fail_fetch: bool,
        fail_compile: bool,
        leave_partial: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl ScriptedToolchain {
        fn ok() -> Self {
            Self {
                fail_fetch: false,
                fail_compile: false,
                leave_partial: false,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Toolchain for ScriptedToolchain {
        fn fetch_dependencies(&self, _source_dir: &Path) -> Result<(), UpdateError> {
            self.calls.borrow_mut().push("fetch");
            if self.fail_fetch {
                return Err(UpdateError::BuildFailed {
                    step: "fetch".into(),
                    output: "network unreachable".into(),
                });
            }
            Ok(())
        }

        fn compile(&self, _source_dir: &Path, output: &Path) -> Result<(), UpdateError> {
            self.calls.borrow_mut().push("compile");
            if self.leave_partial {
                std::fs::write(output, b"half").unwrap();
            }
            if self.fail_compile {
                return Err(UpdateError::BuildFailed {
                    step: "compile".into(),
                    output: "error[E0425]: cannot find value".into(),
                });
            }
            std::fs::write(output, b"new binary").unwrap();
            Ok(())
        }
    }

    #[test]
    fn successful_build_produces_hashed_candidate() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("tools.new");
        let pipeline = BuildPipeline::new(ScriptedToolchain::ok());

        let candidate = pipeline.build(tmp.path(), &staging).unwrap();
        assert_eq!(candidate.path, staging);
        assert_eq!(candidate.sha256, file_sha256(&staging).unwrap());
        assert_eq!(
            *pipeline.toolchain.calls.borrow(),
            vec!["fetch", "compile"]
        );
    }

    #[test]
    fn fetch_failure_skips_compile() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("tools.new");
        let pipeline = BuildPipeline::new(ScriptedToolchain {
            fail_fetch: true,
            ..ScriptedToolchain::ok()
        });

        let err = pipeline.build(tmp.path(), &staging).unwrap_err();
        assert!(matches!(err, UpdateError::BuildFailed { ref step, .. } if step == "fetch"));
        assert_eq!(*pipeline.toolchain.calls.borrow(), vec!["fetch"]);
        assert!(!staging.exists());
    }

    #[test]
    fn compile_failure_removes_partial_candidate() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("tools.new");
        let pipeline = BuildPipeline::new(ScriptedToolchain {
            fail_compile: true,
            leave_partial: true,
            ..ScriptedToolchain::ok()
        });

        let err = pipeline.build(tmp.path(), &staging).unwrap_err();
        assert!(err.to_string().contains("E0425"));
        assert!(!staging.exists(), "partial candidate must be removed");
    }

    #[test]
    fn stale_candidate_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("tools.new");
        std::fs::write(&staging, b"stale").unwrap();

        BuildPipeline::new(ScriptedToolchain::ok())
            .build(tmp.path(), &staging)
            .unwrap();
        assert_eq!(std::fs::read(&staging).unwrap(), b"new binary");
    }

    #[test]
    #[cfg(unix)]
    fn command_toolchain_copies_artifact() {
        let tmp = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(BuildConfig {
            fetch: vec!["sh".into(), "-c".into(), "true".into()],
            compile: vec![
                "sh".into(),
                "-c".into(),
                "mkdir -p out && printf built > out/tools".into(),
            ],
            artifact: PathBuf::from("out/tools"),
        });
        let staging = tmp.path().join("tools.new");

        let candidate = BuildPipeline::new(toolchain)
            .build(tmp.path(), &staging)
            .unwrap();
        assert_eq!(std::fs::read(&candidate.path).unwrap(), b"built");

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&staging).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "candidate must be executable");
    }

    #[test]
    #[cfg(unix)]
    fn command_toolchain_reports_step_output() {
        let tmp = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(BuildConfig {
            fetch: vec![],
            compile: vec![
                "sh".into(),
                "-c".into(),
                "echo 'error: linker not found' >&2; exit 101".into(),
            ],
            artifact: PathBuf::from("out/tools"),
        });

        let err = BuildPipeline::new(toolchain)
            .build(tmp.path(), &tmp.path().join("tools.new"))
            .unwrap_err();
        match err {
            UpdateError::BuildFailed { output, .. } => {
                assert!(output.contains("linker not found"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_compile_step_never_promotes_a_stale_artifact() {
        let tmp = TempDir::new().unwrap();
        let stale = tmp.path().join("target/release/tools");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"last month's build").unwrap();
        let toolchain = CommandToolchain::new(BuildConfig {
            fetch: vec![],
            compile: vec![],
            artifact: PathBuf::from("target/release/tools"),
        });
        let staging = tmp.path().join("tools.new");

        let err = BuildPipeline::new(toolchain)
            .build(tmp.path(), &staging)
            .unwrap_err();
        assert!(err.to_string().contains("no compile command configured"));
        assert!(!staging.exists());
    }

    #[test]
    #[cfg(unix)]
    fn command_toolchain_missing_artifact_fails() {
        let tmp = TempDir::new().unwrap();
        let toolchain = CommandToolchain::new(BuildConfig {
            fetch: vec![],
            compile: vec!["sh".into(), "-c".into(), "true".into()],
            artifact: PathBuf::from("target/release/tools"),
        });

        let err = BuildPipeline::new(toolchain)
            .build(tmp.path(), &tmp.path().join("tools.new"))
            .unwrap_err();
        assert!(err.to_string().contains("expected build artifact"));
    }
}
