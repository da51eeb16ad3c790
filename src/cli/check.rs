//! One-shot workspace scan

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::output::Output;
use crate::engine::{ProjectRegistry, ProjectReport, SystemRunner};
use crate::storage::{DaemonLog, Workspace};

/// Lists every project with its manager and the typings its dependencies
/// lack; with `install`, installs them in active projects and waits
pub fn run(output: &Output, install: bool) -> Result<()> {
    let workspace = Workspace::open_current()?;
    output.verbose_ctx("check", &format!("Scanning {}", workspace.root().display()));

    let log = if output.is_verbose() || (install && output.is_text()) {
        DaemonLog::stderr()
    } else {
        DaemonLog::discard()
    };
    let mut registry = ProjectRegistry::new(workspace.config().clone(), Arc::new(SystemRunner), log);
    for root in workspace.discover_projects() {
        registry.load_project(&root);
    }
    output.verbose_ctx("check", &format!("Found {} project(s)", registry.len()));

    let reports = registry.reports();
    let missing: usize = reports.iter().map(|report| report.missing.len()).sum();

    let queued = if install {
        let queued = registry.install_missing();
        output.verbose_ctx("check", &format!("Waiting for {} install(s)", queued));
        registry.wait_idle();
        Some(queued)
    } else {
        None
    };

    if output.is_json() {
        let mut data = serde_json::json!({
            "workspace": workspace.root().display().to_string(),
            "projects": reports,
            "missing": missing,
        });
        if let Some(queued) = queued {
            data["installed"] = serde_json::json!(queued);
        }
        output.data(&data);
        return Ok(());
    }

    println!("Workspace: {}", workspace.root().display());
    if reports.is_empty() {
        println!("No packages found");
        return Ok(());
    }

    println!();
    println!("{:<30} {:<9} {:<16} {:<6} MISSING", "PACKAGE", "STATUS", "MANAGER", "DEV");
    println!("{}", "-".repeat(78));
    for report in &reports {
        print_report(workspace.root(), report);
    }

    println!();
    match queued {
        Some(queued) => println!("Processed {} install(s) across {} package(s)", queued, reports.len()),
        None if missing > 0 => {
            println!("{} missing typing(s) in {} package(s)", missing, reports.len());
            println!("Run `typings check --install` to install them in active packages");
        }
        None => println!("All {} package(s) have their typings", reports.len()),
    }

    Ok(())
}

fn print_report(workspace_root: &Path, report: &ProjectReport) {
    let name = match report.root.strip_prefix(workspace_root) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative.display().to_string(),
        Err(_) => report.root.display().to_string(),
    };
    let status = if report.active { "active" } else { "inactive" };
    let manager = format!("{} ({})", report.manager, report.manager_source.as_str());
    let dev = match report.dev_default {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    };
    let missing = if report.missing.is_empty() {
        "-".to_string()
    } else {
        report.missing.join(", ")
    };

    println!("{:<30} {:<9} {:<16} {:<6} {}", name, status, manager, dev, missing);
}
