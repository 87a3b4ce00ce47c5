//! Per-resource locking and crash recovery.
//!
//! Two callers racing on one resource must leave exactly one transition out
//! of `Declared`, and a run that died mid-stage must be retryable after the
//! next orchestrator start.

use logstack_core::{CoreError, Orchestrator, ProvisionOutcome, ResourceLock};
use logstack_remote::{ApiResponse, RemoteError, SearchAdminApi, SearchEndpoint};
use logstack_runner::MockExecutor;
use logstack_schema::{parse_declarations_str, OrchestratorConfig, ResourceStatus};
use logstack_store::{MemoryVault, ResourceStore, StoreLayout};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

struct AlwaysOk;

impl SearchAdminApi for AlwaysOk {
    fn create_index(&self, _: &SearchEndpoint, _: &Value) -> Result<ApiResponse, RemoteError> {
        Ok(ApiResponse {
            status: 200,
            body: "{}".into(),
        })
    }

    fn delete_index(&self, _: &SearchEndpoint, _: &str) -> Result<ApiResponse, RemoteError> {
        Ok(ApiResponse {
            status: 200,
            body: "{}".into(),
        })
    }

    fn list_indexes(&self, _: &SearchEndpoint) -> Result<ApiResponse, RemoteError> {
        Ok(ApiResponse {
            status: 200,
            body: "[]".into(),
        })
    }
}

fn open(root: &Path, executor: Arc<MockExecutor>) -> Orchestrator {
    Orchestrator::new(
        root,
        OrchestratorConfig::default(),
        Arc::new(MemoryVault::new()),
        executor,
        Arc::new(AlwaysOk),
    )
    .unwrap()
}

fn declare_vm(orch: &Orchestrator, id: &str) {
    let toml = format!(
        "[[resource]]\nid = \"{id}\"\nkind = \"virtual_machine\"\npublic_address = \"10.0.0.2\"\n"
    );
    let mut decls = parse_declarations_str(&toml).unwrap();
    orch.declare(decls.remove(0)).unwrap();
}

#[test]
fn concurrent_provision_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::new());
    let orch = Arc::new(open(dir.path(), executor.clone()));
    declare_vm(&orch, "vm-a");

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orch = Arc::clone(&orch);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                orch.provision("vm-a")
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results
        .iter()
        .filter(|r| matches!(r, Ok(ProvisionOutcome::Active)))
        .count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::InvalidTransition { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, 1);
    assert_eq!(executor.invocation_count(), 1);
    assert_eq!(
        orch.inspect("vm-a").unwrap().status,
        ResourceStatus::Active
    );
}

#[test]
fn concurrent_declarations_of_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let orch = Arc::new(open(dir.path(), Arc::new(MockExecutor::new())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orch = Arc::clone(&orch);
            thread::spawn(move || declare_vm(&orch, &format!("vm-{i}")))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(orch.list().unwrap().len(), 8);
}

fn stranded_vm(root: &Path, stage_done: bool) {
    let layout = StoreLayout::new(root);
    let store = ResourceStore::new(layout);
    let mut record = store.get("vm-a").unwrap();
    record.status = ResourceStatus::Provisioning;
    if stage_done {
        record.completed_stages.push("bootstrap".into());
    }
    store.put(&record).unwrap();
}

#[test]
fn interrupted_run_is_failed_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let orch = open(dir.path(), Arc::new(MockExecutor::new()));
        declare_vm(&orch, "vm-a");
    }
    stranded_vm(dir.path(), false);

    let executor = Arc::new(MockExecutor::new());
    let orch = open(dir.path(), executor.clone());
    let record = orch.inspect("vm-a").unwrap();
    assert_eq!(record.status, ResourceStatus::Failed);
    let failure = record.last_failure.unwrap();
    assert_eq!(failure.stage, "bootstrap");
    assert_eq!(failure.message, "interrupted");

    assert_eq!(orch.provision("vm-a").unwrap(), ProvisionOutcome::Active);
    assert_eq!(executor.invocation_count(), 1);
}

#[test]
fn locked_resource_is_left_alone_by_recovery() {
    let dir = tempfile::tempdir().unwrap();
    {
        let orch = open(dir.path(), Arc::new(MockExecutor::new()));
        declare_vm(&orch, "vm-a");
    }
    stranded_vm(dir.path(), false);

    let layout = StoreLayout::new(dir.path());
    let held = ResourceLock::acquire(&layout, "vm-a").unwrap();
    let orch = open(dir.path(), Arc::new(MockExecutor::new()));
    assert_eq!(
        orch.inspect("vm-a").unwrap().status,
        ResourceStatus::Provisioning
    );
    drop(held);
}

#[test]
fn dispatched_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::persistent(dir.path().join("jobs")));
    let orch = open(dir.path(), executor.clone());
    declare_vm(&orch, "vm-a");
    stranded_vm(dir.path(), true);

    let layout = StoreLayout::new(dir.path());
    let store = ResourceStore::new(layout);
    let mut record = store.get("vm-a").unwrap();
    record.pending_job = Some(logstack_schema::JobHandle {
        job_id: "j1".into(),
        stage: "bootstrap".into(),
        playbook: "bootstrap.yml".into(),
        mode: logstack_schema::ExecutionMode::Background,
        status_url: "file:///dev/null".into(),
    });
    store.put(&record).unwrap();
    drop(orch);

    let orch = open(dir.path(), executor);
    assert_eq!(
        orch.inspect("vm-a").unwrap().status,
        ResourceStatus::Provisioning
    );
}
