use serde_json::json;
use vigil_common::testing::{TestLogger, TestPhase};

use crate::common::{Workspace, init_test_logging, session, stdout_json};

const CONFIG: &str = r#"
[general]
log_level = "warn"

[probes]
enabled_backends = ["container"]
timeout_ms = 2000
"#;

fn workspace_with_sessions() -> Workspace {
    let ws = Workspace::new();
    ws.write_config(CONFIG);

    let present = ws.worktree("present");
    let deleted = ws.path().join("worktrees").join("deleted");

    let mut gone = session("gone", "docker", &deleted);
    gone["backend_id"] = json!("vigil-gone");
    gone["uncommitted_changes"] = json!(true);

    let mut archived = session("archived", "container", &deleted);
    archived["status"] = json!("archived");

    let fresh = session("fresh", "container", &present);

    let mut creating = session("creating", "container", &present);
    creating["status"] = json!("creating");
    creating["backend_id"] = json!("vigil-creating");

    let mut vm = session("vm", "sprites", &present);
    vm["backend_id"] = json!("sprite-vm");

    let mut pr = session("pr", "container", &present);
    pr["pr_url"] = json!("https://github.com/acme/app/pull/42");
    pr["pr_check_status"] = json!("passing");
    pr["pr_review_decision"] = json!("approved");

    ws.write_sessions(&[gone, archived, fresh, creating, vm, pr]);
    ws
}

#[test]
fn test_vigild_help_includes_usage() {
    init_test_logging();
    crate::test_log!("TEST START: test_vigild_help_includes_usage");

    let ws = Workspace::new();
    let output = ws.run(&["--help"]);

    assert!(output.status.success(), "vigild --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "check", "workflow", "config"] {
        assert!(stdout.contains(command), "help is missing {command}: {stdout}");
    }

    crate::test_log!("TEST PASS: test_vigild_help_includes_usage");
}

#[test]
fn test_check_sweeps_without_probing_unreachable_backends() {
    init_test_logging();
    crate::test_log!("TEST START: test_check_sweeps_without_probing_unreachable_backends");

    let ws = workspace_with_sessions();
    let json = stdout_json(&ws.run(&["check"]));

    let reports = json["reports"].as_array().expect("reports array");
    let ids: Vec<&str> = reports
        .iter()
        .map(|r| r["session_id"].as_str().unwrap())
        .collect();
    assert!(!ids.contains(&"creating"), "transitioning sessions are skipped");
    assert_eq!(json["summary"]["total"], 5);

    let by_id = |id: &str| reports.iter().find(|r| r["session_id"] == id).unwrap();

    let gone = by_id("gone");
    assert_eq!(gone["state"]["type"], "worktree_missing");
    assert_eq!(gone["available_actions"], json!(["cleanup"]));
    assert_eq!(gone["data_safe"], false);
    assert!(
        gone["details"]
            .as_str()
            .unwrap()
            .contains("uncommitted changes")
    );

    assert_eq!(by_id("archived")["state"]["type"], "healthy");

    let fresh = by_id("fresh");
    assert_eq!(fresh["state"]["type"], "missing");
    assert_eq!(fresh["details"], "No backend resource created yet.");

    let vm = by_id("vm");
    assert_eq!(vm["state"]["type"], "error");
    assert!(vm["details"].as_str().unwrap().starts_with("[VGL-E106]"));
    assert_eq!(vm["data_safe"], true);

    crate::test_log!("TEST PASS: test_check_sweeps_without_probing_unreachable_backends");
}

#[test]
fn test_check_single_session() {
    init_test_logging();
    let ws = workspace_with_sessions();

    let json = stdout_json(&ws.run(&["check", "--session", "gone"]));
    assert_eq!(json["session_id"], "gone");
    assert_eq!(json["backend"], "container");

    let output = ws.run(&["check", "--session", "nope"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("VGL-E202"), "unexpected stderr: {stderr}");
}

#[test]
fn test_workflow_command() {
    init_test_logging();
    let logger = TestLogger::for_test("cli_tests::test_workflow_command");
    let ws = workspace_with_sessions();

    logger.log(TestPhase::Execute, "vigild workflow");
    let json = stdout_json(&ws.run(&["workflow"]));
    let rows = json.as_array().expect("array");
    logger.log_with_data(TestPhase::Verify, "workflow rows", json!({"rows": rows.len()}));
    assert_eq!(rows.len(), 6);

    let pr = rows.iter().find(|r| r["session_id"] == "pr").unwrap();
    assert_eq!(pr["stage"], "ready_to_merge");
    assert_eq!(pr["blockers"], json!([]));

    let fresh = rows.iter().find(|r| r["session_id"] == "fresh").unwrap();
    assert_eq!(fresh["stage"], "planning");
    logger.pass();
}

#[test]
fn test_missing_sessions_file_is_empty_sweep() {
    init_test_logging();
    let ws = Workspace::new();
    ws.write_config(CONFIG);

    let json = stdout_json(&ws.run(&["check"]));
    assert_eq!(json["summary"]["total"], 0);
}

#[test]
fn test_invalid_config_is_reported_with_code() {
    init_test_logging();
    let ws = Workspace::new();
    ws.write_config("[poller]\ninterval_ms = 0\n");

    let output = ws.run(&["check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("VGL-E003"), "unexpected stderr: {stderr}");
}

#[test]
fn test_config_command_prints_effective_toml() {
    init_test_logging();
    let ws = Workspace::new();
    ws.write_config(CONFIG);

    let output = ws.run(&["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: toml::Value = toml::from_str(&stdout).expect("valid TOML");
    assert_eq!(parsed["general"]["log_level"].as_str(), Some("warn"));
    assert_eq!(parsed["probes"]["timeout_ms"].as_integer(), Some(2000));
}
