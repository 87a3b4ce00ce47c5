use super::{EXIT_FAILURE, EXIT_SUCCESS};
use logstack_core::StoreLock;
use logstack_schema::{ExecutorBackend, OrchestratorConfig, ResourceStatus, VaultBackend};
use logstack_store::{EnvVault, FileVault, ResourceStore, SecretVault, StoreLayout, VaultError};
use std::path::Path;

pub fn run(store_path: &Path, config: &OrchestratorConfig, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_executor(config, &mut checks, &mut all_pass);
    check_playbooks(config, &mut checks);

    let layout = StoreLayout::new(store_path);
    if layout.is_initialized() {
        checks.push(Check::pass("store_exists", "Store directory exists"));
        check_store(&layout, config, &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "store_exists",
            "Store not initialized (will be created on first declare)",
        ));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_executor(config: &OrchestratorConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if config.executor.backend == ExecutorBackend::Mock {
        checks.push(Check::info(
            "executor",
            "Mock executor configured; playbooks are not run",
        ));
        return;
    }
    let missing = logstack_runner::check_ansible_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass("executor", "Ansible prerequisites satisfied"));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "executor",
            &logstack_runner::format_missing(&missing),
        ));
    }
}

fn check_playbooks(config: &OrchestratorConfig, checks: &mut Vec<Check>) {
    let playbooks = &config.playbooks;
    let missing: Vec<String> = [
        &playbooks.inventory,
        &playbooks.bootstrap,
        &playbooks.search_service,
        &playbooks.dashboard_service,
    ]
    .into_iter()
    .filter(|p| !p.exists())
    .map(|p| p.display().to_string())
    .collect();

    if missing.is_empty() {
        checks.push(Check::pass("playbooks", "Inventory and playbooks found"));
    } else if config.executor.backend == ExecutorBackend::Mock {
        checks.push(Check::info(
            "playbooks",
            &format!("Not found (unused by mock executor): {}", missing.join(", ")),
        ));
    } else {
        checks.push(Check::warn(
            "playbooks",
            &format!("Not found: {}", missing.join(", ")),
        ));
    }
}

fn check_store(
    layout: &StoreLayout,
    config: &OrchestratorConfig,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    match layout.verify_version() {
        Ok(()) => checks.push(Check::pass("store_version", "Store format version valid")),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "store_version",
                &format!("Store version check failed: {e}"),
            ));
            return;
        }
    }

    let store = ResourceStore::new(layout.clone());
    let entries = match store.list_with_errors() {
        Ok(entries) => entries,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "records",
                &format!("Cannot list resource records: {e}"),
            ));
            return;
        }
    };
    let mut records = Vec::new();
    let mut broken = Vec::new();
    for entry in entries {
        match entry {
            Ok(record) => records.push(record),
            Err((id, e)) => broken.push(format!("{id} ({e})")),
        }
    }
    if broken.is_empty() {
        checks.push(Check::pass(
            "records",
            &format!("Resource records OK ({} checked)", records.len()),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "records",
            &format!("Unreadable records: {}", broken.join(", ")),
        ));
    }

    match StoreLock::try_acquire(layout) {
        Ok(Some(_)) => checks.push(Check::pass("store_lock", "Store lock is free")),
        Ok(None) => checks.push(Check::warn(
            "store_lock",
            "Store lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "store_lock",
                &format!("Cannot check store lock: {e}"),
            ));
        }
    }

    let pending = records.iter().filter(|r| r.pending_job.is_some()).count();
    let failed = records
        .iter()
        .filter(|r| r.status == ResourceStatus::Failed)
        .count();
    checks.push(Check::info(
        "resources",
        &format!(
            "{} resources ({pending} with pending jobs, {failed} failed)",
            records.len()
        ),
    ));

    let vault: Box<dyn SecretVault> = match config.vault.backend {
        VaultBackend::File => Box::new(FileVault::new(layout)),
        VaultBackend::Env => Box::new(EnvVault),
    };
    let mut unresolved = Vec::new();
    for record in records.iter().filter(|r| r.status != ResourceStatus::Deleted) {
        for key in record.spec.secret_refs() {
            match vault.get_secret(key) {
                Ok(_) => {}
                Err(VaultError::NotFound(_)) => unresolved.push(format!("{} ({})", key, record.id)),
                Err(e) => {
                    checks.push(Check::warn("secrets", &format!("Cannot read vault: {e}")));
                    return;
                }
            }
        }
    }
    if unresolved.is_empty() {
        checks.push(Check::pass(
            "secrets",
            &format!("All referenced secrets present in {} vault", vault.name()),
        ));
    } else {
        checks.push(Check::warn(
            "secrets",
            &format!(
                "Missing from {} vault: {}",
                vault.name(),
                unresolved.join(", ")
            ),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("logstack doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
