//! Background daemon for automatic typings installation
//!
//! The daemon watches the workspace for manifest, `tsconfig.json` and
//! lockfile changes and installs or removes `@types` packages as
//! dependencies come and go.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::{json, Value};

use super::output::Output;
use crate::engine::{FileClassifier, ProjectRegistry, SystemRunner, Watcher};
use crate::storage::{tail_lines, terminate, DaemonLog, DaemonState, LogFollower, Workspace};

/// How long `stop` waits for a graceful exit before killing
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Bytes of existing log shown when following
const FOLLOW_BACKLOG: u64 = 4096;

const FOLLOW_INTERVAL: Duration = Duration::from_millis(100);

/// How often the daemon loop wakes up without events to check the root
const ROOT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the background daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(long)]
        foreground: bool,

        /// Suppress startup message
        #[arg(long)]
        quiet: bool,
    },

    /// Stop the background daemon
    Stop,

    /// Show daemon status
    Status,

    /// View daemon logs
    Logs {
        /// Number of lines to show (default: 50)
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Follow log output (like tail -f)
        #[arg(short = 'F', long)]
        follow: bool,
    },
}

pub fn run(cmd: DaemonCommands, output: &Output) -> Result<()> {
    match cmd {
        DaemonCommands::Start { foreground, quiet } => start_daemon(output, foreground, quiet),
        DaemonCommands::Stop => stop_daemon(output),
        DaemonCommands::Status => show_status(output),
        DaemonCommands::Logs { lines, follow } => show_logs(output, lines, follow),
    }
}

/// Prints `data` in JSON mode, otherwise runs `text`
fn report(output: &Output, data: Value, text: impl FnOnce()) {
    if output.is_json() {
        output.data(&data);
    } else {
        text();
    }
}

fn start_daemon(output: &Output, foreground: bool, quiet: bool) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let root = workspace.root().display().to_string();

    if let DaemonState::Running(pid) = workspace.pid_file().state()? {
        report(
            output,
            json!({ "status": "already_running", "pid": pid, "workspace": root }),
            || output.error(&format!("Daemon already running for this workspace (PID: {})", pid)),
        );
        return Ok(());
    }

    if !workspace.config().workspace.daemon.enabled {
        report(
            output,
            json!({ "status": "disabled", "message": "Daemon is disabled in config" }),
            || output.error("Daemon is disabled in config. Set daemon.enabled = true in .typings/config.toml"),
        );
        return Ok(());
    }

    if foreground {
        run_foreground(&workspace, output, quiet)
    } else {
        spawn_background(&workspace, output, quiet)
    }
}

fn run_foreground(workspace: &Workspace, output: &Output, quiet: bool) -> Result<()> {
    let pid = std::process::id();
    let pid_file = workspace.pid_file();
    pid_file.write(pid)?;

    let log = DaemonLog::to_file(workspace.log_path(), !quiet && output.is_text());
    log.info(format!("Daemon starting in foreground (PID: {})", pid));

    if !quiet {
        report(
            output,
            json!({
                "status": "started",
                "pid": pid,
                "foreground": true,
                "workspace": workspace.root().display().to_string(),
            }),
            || output.success(&format!("Daemon started in foreground (PID: {})", pid)),
        );
    }

    let result = run_daemon_loop(workspace, &log);
    if let Err(e) = &result {
        log.error(format!("Daemon failed: {:#}", e));
    }

    pid_file.remove()?;
    log.info("Daemon stopped");
    result
}

/// Re-executes this binary as a detached `daemon start --foreground`
fn spawn_background(workspace: &Workspace, output: &Output, quiet: bool) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate typings executable")?;

    let mut cmd = Command::new(&exe);
    cmd.args(["daemon", "start", "--foreground", "--quiet"])
        .current_dir(workspace.root())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        cmd.creation_flags(DETACHED_PROCESS);
    }

    let pid = cmd.spawn().context("Failed to spawn daemon process")?.id();

    report(
        output,
        json!({
            "status": "started",
            "pid": pid,
            "workspace": workspace.root().display().to_string(),
        }),
        || {
            if !quiet {
                output.success(&format!("Daemon started (PID: {})", pid));
            }
        },
    );
    Ok(())
}

fn stop_daemon(output: &Output) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let root = workspace.root().display().to_string();
    let pid_file = workspace.pid_file();

    match pid_file.state()? {
        DaemonState::Stopped => report(
            output,
            json!({ "status": "not_running", "workspace": root }),
            || println!("Daemon is not running for this workspace"),
        ),
        DaemonState::Stale(pid) => report(
            output,
            json!({ "status": "not_running", "stale_pid": pid, "workspace": root }),
            || println!("Daemon is not running (cleaned up stale PID file)"),
        ),
        DaemonState::Running(pid) => {
            terminate(pid, STOP_GRACE)?;
            pid_file.remove()?;
            DaemonLog::to_file(workspace.log_path(), false).info("Daemon stopped by user");

            report(
                output,
                json!({ "status": "stopped", "pid": pid, "workspace": root }),
                || output.success(&format!("Daemon stopped (PID: {})", pid)),
            );
        }
    }

    Ok(())
}

fn show_status(output: &Output) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let config = workspace.config();
    let daemon = &config.workspace.daemon;
    let running = workspace.pid_file().state()?.running_pid();

    let mut status = json!({
        "running": running.is_some(),
        "workspace": workspace.root().display().to_string(),
        "config": {
            "enabled": daemon.enabled,
            "debounce_ms": daemon.debounce_ms,
            "bin": config.bin(),
            "dev": config.dev(),
            "skip_dev": config.skip_dev(),
        },
    });
    if let Some(pid) = running {
        status["pid"] = json!(pid);
    }

    report(output, status, || {
        println!("Workspace: {}", workspace.root().display());
        match running {
            Some(pid) => println!("Daemon status: RUNNING (PID: {})", pid),
            None => println!("Daemon status: STOPPED"),
        }

        println!();
        println!("Configuration:");
        println!("  Enabled: {}", daemon.enabled);
        println!("  Debounce: {}ms", daemon.debounce_ms);
        println!("  Default manager: {}", config.bin());
        println!("  Typings as devDependencies: {}", config.dev());
        println!("  Skip devDependencies: {}", config.skip_dev());
    });

    Ok(())
}

fn show_logs(output: &Output, lines: usize, follow: bool) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let log_path = workspace.log_path();

    if !log_path.exists() {
        report(
            output,
            json!({
                "logs": [],
                "message": "No log file found",
                "workspace": workspace.root().display().to_string(),
            }),
            || println!("No daemon logs found for this workspace"),
        );
        return Ok(());
    }

    if follow {
        return follow_logs(&log_path);
    }

    let tail = tail_lines(&log_path, lines)
        .with_context(|| format!("Failed to read {}", log_path.display()))?;
    report(
        output,
        json!({
            "logs": tail.lines,
            "total_lines": tail.total,
            "showing": tail.lines.len(),
        }),
        || {
            for line in &tail.lines {
                println!("{}", line);
            }
        },
    );

    Ok(())
}

fn follow_logs(log_path: &Path) -> Result<()> {
    let mut follower = LogFollower::open(log_path, FOLLOW_BACKLOG)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    loop {
        for line in follower.poll().context("Failed to read daemon log")? {
            println!("{}", line);
        }
        thread::sleep(FOLLOW_INTERVAL);
    }
}

/// Watches the workspace and feeds file events to the project registry
/// until the watcher stops or the workspace root disappears
fn run_daemon_loop(workspace: &Workspace, log: &DaemonLog) -> Result<()> {
    let root = workspace.root().to_path_buf();
    let config = workspace.config();
    let debounce_ms = config.workspace.daemon.debounce_ms;

    let mut registry = ProjectRegistry::new(config.clone(), Arc::new(SystemRunner), log.clone());
    let mut classifier = FileClassifier::new(&root);
    for project_root in workspace.discover_projects() {
        classifier.seed_project(&project_root);
        registry.load_project(&project_root);
    }

    log.info(format!("Watching directory: {}", root.display()));
    let watcher = Watcher::start(&root, Duration::from_millis(debounce_ms))?;
    log.info(format!(
        "Daemon ready ({} package(s), debounce: {}ms)",
        registry.len(),
        debounce_ms
    ));

    loop {
        match watcher.recv_timeout(ROOT_CHECK_INTERVAL) {
            Ok(Ok(events)) => {
                let mut paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                paths.sort();
                paths.dedup();

                for path in paths {
                    for event in classifier.classify(&path) {
                        registry.handle(&event);
                    }
                }
            }
            Ok(Err(error)) => log.error(format!("Watch error: {:?}", error)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log.error("File watcher stopped");
                break;
            }
        }

        if !root.is_dir() {
            log.info(format!("Workspace root removed: {}", root.display()));
            break;
        }
    }

    registry.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::OutputFormat;
    use std::cell::Cell;

    #[test]
    fn report_runs_text_only_in_text_mode() {
        let ran = Cell::new(false);
        report(&Output::new(OutputFormat::Text, false), json!({}), || ran.set(true));
        assert!(ran.get());

        let ran = Cell::new(false);
        report(&Output::new(OutputFormat::Json, false), json!({}), || ran.set(true));
        assert!(!ran.get());
    }
}
