//! Daemon PID file
//!
//! One daemon runs per workspace; its PID lives in `.typings/daemon.pid`.
//! A PID file whose process has exited is stale and gets cleaned up the
//! first time anyone looks at it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// What the PID file says about the workspace daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running(u32),
    Stopped,
    /// The file named a process that no longer exists. The file is gone now.
    Stale(u32),
}

impl DaemonState {
    pub fn running_pid(&self) -> Option<u32> {
        match self {
            DaemonState::Running(pid) => Some(*pid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<u32>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).context("Failed to read PID file")?;
        let pid = content.trim().parse().context("Invalid PID in file")?;
        Ok(Some(pid))
    }

    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, pid.to_string()).context("Failed to write PID file")
    }

    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove PID file")?;
        }
        Ok(())
    }

    /// Resolves the daemon state, removing a stale PID file
    pub fn state(&self) -> Result<DaemonState> {
        match self.read()? {
            Some(pid) if process_alive(pid) => Ok(DaemonState::Running(pid)),
            Some(pid) => {
                self.remove()?;
                Ok(DaemonState::Stale(pid))
            }
            None => Ok(DaemonState::Stopped),
        }
    }
}

/// Checks if a process with the given PID is running
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}

/// Asks `pid` to exit and force-kills it if it is still alive after `grace`
pub fn terminate(pid: u32, grace: Duration) -> Result<()> {
    let pid_arg = pid.to_string();

    #[cfg(unix)]
    {
        Command::new("kill")
            .args(["-TERM", &pid_arg])
            .stderr(Stdio::null())
            .status()
            .context("Failed to send TERM signal")?;
    }

    #[cfg(windows)]
    {
        Command::new("taskkill")
            .args(["/PID", &pid_arg])
            .stdout(Stdio::null())
            .status()
            .context("Failed to terminate process")?;
    }

    let deadline = Instant::now() + grace;
    while process_alive(pid) {
        if Instant::now() >= deadline {
            force_kill(&pid_arg)?;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    Ok(())
}

fn force_kill(pid_arg: &str) -> Result<()> {
    #[cfg(unix)]
    {
        Command::new("kill")
            .args(["-KILL", pid_arg])
            .stderr(Stdio::null())
            .status()
            .context("Failed to kill daemon")?;
    }

    #[cfg(windows)]
    {
        Command::new("taskkill")
            .args(["/F", "/PID", pid_arg])
            .stdout(Stdio::null())
            .status()
            .context("Failed to kill daemon")?;
    }

    Ok(())
}
