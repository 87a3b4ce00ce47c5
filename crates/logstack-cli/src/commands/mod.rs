pub mod cancel;
pub mod create_index;
pub mod declare;
pub mod delete_index;
pub mod doctor;
pub mod index_template;
pub mod inspect;
pub mod list;
pub mod provision;
pub mod reconcile;
pub mod secret;
pub mod wait;

use indicatif::{ProgressBar, ProgressStyle};
use logstack_core::CoreError;
use logstack_store::ResourceRecord;
use std::io::{stderr, stdin, IsTerminal};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DECLARATION_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render a core error, tagging the families `main` maps to exit codes.
pub fn core_err(e: CoreError) -> String {
    if e.is_validation() {
        format!("declaration error: {e}")
    } else {
        e.to_string()
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

/// Run `op` under a spinner unless JSON output was requested.
pub fn with_spinner<T>(
    json: bool,
    msg: &str,
    ok: &str,
    failed: &str,
    op: impl FnOnce() -> Result<T, CoreError>,
) -> Result<T, String> {
    let pb = if json { None } else { Some(spinner(msg)) };
    match op() {
        Ok(v) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, ok);
            }
            Ok(v)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, failed);
            }
            Err(core_err(e))
        }
    }
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "active" => Style::new().green().apply_to(status).to_string(),
        "provisioning" => Style::new().cyan().bold().apply_to(status).to_string(),
        "declared" => Style::new().yellow().apply_to(status).to_string(),
        "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "retiring" => Style::new().magenta().apply_to(status).to_string(),
        "deleted" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

/// Ask before a mutating operation. Without a terminal, `--yes` is required.
pub fn confirm(prompt: &str, yes: bool) -> Result<(), String> {
    if yes {
        return Ok(());
    }
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        return Err(format!("refusing to continue without confirmation: {prompt} (pass --yes)"));
    }
    let accepted = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if accepted {
        Ok(())
    } else {
        Err("aborted".to_owned())
    }
}

/// One-line summary used by most commands.
pub fn print_record(record: &ResourceRecord, json: bool) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(&summary(record))?);
    } else {
        println!(
            "{} {}: {}",
            record.kind(),
            record.id,
            colorize_status(&record.status.to_string())
        );
        if let Some(failure) = &record.last_failure {
            println!("  last failure at '{}': {}", failure.stage, failure.message);
        }
        if let Some(job) = &record.pending_job {
            println!("  pending job {} ({})", job.job_id, job.status_url);
        }
    }
    Ok(())
}

pub fn summary(record: &ResourceRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "kind": record.kind(),
        "status": record.status,
        "created": record.created,
        "completed_stages": record.completed_stages,
        "last_failure": record.last_failure,
        "pending_job": record.pending_job,
    })
}
