//! CLI subprocess integration tests.
//!
//! These tests invoke the `logstack` binary as a subprocess against a temp
//! store configured with the mock executor, and verify exit codes, stdout
//! content and JSON output.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const STACK: &str = r#"
[[resource]]
id = "vm-a"
kind = "virtual_machine"
public_address = "10.0.0.2"

[[resource]]
id = "qw"
kind = "search_server"
host = "vm-a"
storage = { endpoint = "https://s3.example.com", region = "eu-1", bucket = "logs", access_token = "s3-token", secret_key = "s3-secret" }
api = { token = "qw-api-token", secret = "qw-api-secret" }
"#;

fn logstack_bin(store: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_logstack"));
    cmd.env("LOGSTACK_SKIP_PREREQS", "1");
    cmd.env_remove("LOGSTACK_LOG");
    cmd.arg("--store").arg(store);
    cmd
}

fn temp_store() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("logstack.toml"),
        "[executor]\nbackend = \"mock\"\n",
    )
    .unwrap();
    dir
}

fn write_declarations(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("stack.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn run(store: &Path, args: &[&str]) -> Output {
    logstack_bin(store).args(args).output().unwrap()
}

fn set_secret(store: &Path, reference: &str, value: &str) {
    let mut child = logstack_bin(store)
        .args(["secret", "set", reference])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(format!("{value}\n").as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "secret set must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_logstack"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("logstack"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_logstack"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["declare", "provision", "create-index", "delete-index", "reconcile"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_declare_then_list_json() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);

    let output = run(store.path(), &["declare", &file.to_string_lossy()]);
    assert!(
        output.status.success(),
        "declare must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = run(store.path(), &["--json", "list"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "qw");
    assert_eq!(entries[0]["kind"], "search_server");
    assert_eq!(entries[1]["id"], "vm-a");
    assert_eq!(entries[1]["status"], "declared");
}

#[test]
fn cli_provision_stack_with_mock_executor() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);
    assert!(run(store.path(), &["declare", &file.to_string_lossy()])
        .status
        .success());
    for (key, value) in [
        ("s3-token", "AKIA"),
        ("s3-secret", "s3cret"),
        ("qw-api-token", "tok"),
        ("qw-api-secret", "sec"),
    ] {
        set_secret(store.path(), key, value);
    }

    let output = run(store.path(), &["--json", "provision", "vm-a", "--yes"]);
    assert!(
        output.status.success(),
        "provision vm-a must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(stdout_json(&output)["status"], "active");

    let output = run(store.path(), &["--json", "provision", "qw", "--yes", "--wait"]);
    assert!(
        output.status.success(),
        "provision qw must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json = stdout_json(&output);
    assert_eq!(json["status"], "active");
    assert_eq!(
        json["completed_stages"],
        serde_json::json!(["bootstrap", "search-service"])
    );
}

#[test]
fn cli_provision_without_yes_refuses_off_terminal() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);
    assert!(run(store.path(), &["declare", &file.to_string_lossy()])
        .status
        .success());

    let output = run(store.path(), &["provision", "vm-a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--yes"));

    let output = run(store.path(), &["--json", "inspect", "vm-a"]);
    assert_eq!(stdout_json(&output)["status"], "declared");
}

#[test]
fn cli_provision_missing_secret_fails() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);
    assert!(run(store.path(), &["declare", &file.to_string_lossy()])
        .status
        .success());
    assert!(run(store.path(), &["provision", "vm-a", "--yes"])
        .status
        .success());

    let output = run(store.path(), &["provision", "qw", "--yes"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not in file vault"), "stderr: {stderr}");
}

#[test]
fn cli_index_template_prints_schema() {
    let store = temp_store();
    let output = run(store.path(), &["index-template", "tenant-logs"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["index_id"], "tenant-logs");
    assert!(json["doc_mapping"].is_object());
}

#[test]
fn cli_bad_declaration_exits_two() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(
        project.path(),
        "[[resource]]\nid = \"vm-a\"\nkind = \"mainframe\"\n",
    );

    let output = run(store.path(), &["declare", &file.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_duplicate_declaration_exits_two() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);
    assert!(run(store.path(), &["declare", &file.to_string_lossy()])
        .status
        .success());

    let output = run(store.path(), &["declare", &file.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already declared"));
}

#[test]
fn cli_inspect_unknown_resource_exits_one() {
    let store = temp_store();
    let output = run(store.path(), &["inspect", "nope"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn cli_cancel_declared_vm_is_rejected() {
    let store = temp_store();
    let project = tempfile::tempdir().unwrap();
    let file = write_declarations(project.path(), STACK);
    assert!(run(store.path(), &["declare", &file.to_string_lossy()])
        .status
        .success());

    let output = run(store.path(), &["cancel", "vm-a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid state transition"));
}

#[test]
fn cli_doctor_json_reports_checks() {
    let store = temp_store();
    let output = run(store.path(), &["--json", "doctor"]);
    let json = stdout_json(&output);
    assert!(json["checks"].is_array());
    assert!(json["healthy"].is_boolean());
}
