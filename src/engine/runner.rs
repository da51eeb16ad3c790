//! Process execution
//!
//! Package managers are run through [`CommandRunner`] so the queue can be
//! driven by a scripted runner in tests.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Exit {
        program: String,
        status: String,
        output: String,
    },
}

/// Runs a program to completion
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` in `cwd`, inheriting the environment.
    /// Resolves only on a zero exit status.
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<(), ExecError>;
}

/// Runs real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<(), ExecError> {
        let output = Command::new(executable(program))
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let text: Vec<&str> = [stderr.trim_end(), stdout.trim_end()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();

        Err(ExecError::Exit {
            program: program.to_string(),
            status: output.status.to_string(),
            output: text.join("\n"),
        })
    }
}

/// Package managers ship as `.cmd` shims on Windows
fn executable(program: &str) -> String {
    #[cfg(windows)]
    {
        format!("{}.cmd", program)
    }

    #[cfg(not(windows))]
    {
        program.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn successful_command() {
        let dir = TempDir::new().unwrap();
        let result = SystemRunner.run("true", &[], dir.path());
        assert!(result.is_ok());
    }

    #[test]
    fn failing_command_carries_output() {
        let dir = TempDir::new().unwrap();
        let args = vec!["-c".to_string(), "echo '404 Not Found: x@1' >&2; exit 1".to_string()];

        let err = SystemRunner.run("sh", &args, dir.path()).unwrap_err();
        assert!(err.to_string().contains("404 Not Found: x@1"));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let err = SystemRunner
            .run("typings-no-such-program", &[], dir.path())
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
