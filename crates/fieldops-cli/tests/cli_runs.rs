use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;
use ulid::Ulid;

fn temp_path(name: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fieldops-cli-test-{}-{}.{}", name, Ulid::new(), ext))
}

fn run_cli(args: &[&str]) -> (bool, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_fieldops")).args(args).output();
    assert!(output.is_ok());
    let output = output.unwrap_or_else(|_| unreachable!());
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn parse_json(stdout: &str) -> Value {
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|err| panic!("stdout is not JSON: {err}\n{stdout}"))
}

const SHARMA_EXTRACTION: &str = r#"{
  "customer_name": "Sharma",
  "job_type": "plumbing",
  "materials_used": [{"item": "copper pipe", "quantity": 3, "unit": "piece"}],
  "labor_hours": 2.0,
  "follow_up_date": "6 months",
  "follow_up_reason": "Heater is old",
  "invoice_required": true,
  "confidence_score": 0.92,
  "raw_transcript": "Finished the pipe replacement at the Sharma place."
}"#;

#[test]
fn init_then_process_runs_the_full_pipeline() {
    let db = temp_path("full", "sqlite");
    let extraction_path = temp_path("extraction", "json");
    assert!(fs::write(&extraction_path, SHARMA_EXTRACTION).is_ok());

    let (ok, stdout, stderr) = run_cli(&["init", "--db", &db.display().to_string()]);
    assert!(ok, "init failed: {stderr}");
    assert!(stdout.contains("inventory seeded"));

    let (ok, stdout, stderr) = run_cli(&[
        "process",
        "--db",
        &db.display().to_string(),
        "--extraction",
        &extraction_path.display().to_string(),
    ]);
    assert!(ok, "process failed: {stderr}");

    let result = parse_json(&stdout);
    assert_eq!(result["success"], true);
    let executed: Vec<&str> = result["tools_executed"]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    assert_eq!(
        executed,
        vec![
            "log_job",
            "update_inventory",
            "generate_invoice",
            "update_revenue",
            "schedule_followup",
        ]
    );
    assert_eq!(result["execution"]["invoice_generated"], true);
    assert!((result["execution"]["revenue_added"].as_f64().unwrap_or(0.0) - 225.0).abs() < 1e-9);

    let trace_tags: Vec<&str> = result["trace"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["step"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(
        trace_tags,
        vec![
            "JOB_LOGGED",
            "INVENTORY_UPDATED",
            "INVOICE_GENERATED",
            "REVENUE_RECORDED",
            "FOLLOWUP_SCHEDULED",
        ]
    );

    // The seed catalogue has no plain "copper pipe" row, so the handler
    // created one from the assumed starting stock.
    let (ok, stdout, stderr) = run_cli(&["inventory", "--db", &db.display().to_string()]);
    assert!(ok, "inventory failed: {stderr}");
    let copper_line = stdout
        .lines()
        .map(parse_json)
        .find(|item| item["item_name"] == "copper pipe");
    assert!(copper_line.is_some());
    let copper_line = copper_line.unwrap_or_else(|| unreachable!());
    assert_eq!(copper_line["quantity"], 97);

    let (ok, stdout, stderr) = run_cli(&["dashboard", "--db", &db.display().to_string()]);
    assert!(ok, "dashboard failed: {stderr}");
    let dashboard = parse_json(&stdout);
    assert_eq!(dashboard["total_jobs_today"], 1);
    assert!(
        (dashboard["total_revenue_today"].as_f64().unwrap_or(0.0) - 225.0).abs() < 1e-9,
        "unexpected dashboard revenue: {stdout}"
    );

    let (ok, stdout, stderr) = run_cli(&["followups", "--db", &db.display().to_string()]);
    assert!(ok, "followups failed: {stderr}");
    let followup = parse_json(stdout.lines().next().unwrap_or_default());
    assert_eq!(followup["customer_name"], "Sharma");
    assert_eq!(followup["status"], "pending");
}

#[test]
fn minimal_extraction_only_logs_the_job() {
    let db = temp_path("minimal", "sqlite");
    let extraction_path = temp_path("minimal-extraction", "json");
    assert!(fs::write(&extraction_path, r#"{"invoice_required": false}"#).is_ok());

    let (ok, _, stderr) = run_cli(&["init", "--db", &db.display().to_string(), "--skip-seed"]);
    assert!(ok, "init failed: {stderr}");

    let (ok, stdout, stderr) = run_cli(&[
        "process",
        "--db",
        &db.display().to_string(),
        "--extraction",
        &extraction_path.display().to_string(),
    ]);
    assert!(ok, "process failed: {stderr}");

    let result = parse_json(&stdout);
    assert_eq!(result["success"], true);
    let executed = result["tools_executed"].as_array().cloned().unwrap_or_default();
    assert_eq!(executed, vec![Value::from("log_job")]);
    assert_eq!(result["execution"]["inventory_updated"], false);
    assert_eq!(result["execution"]["invoice_generated"], false);
    assert!(result["summary"]
        .as_str()
        .unwrap_or_default()
        .contains("logged for Unknown"));
}

#[test]
fn invalid_extraction_is_rejected_before_the_run() {
    let db = temp_path("invalid", "sqlite");
    let extraction_path = temp_path("invalid-extraction", "json");
    assert!(fs::write(
        &extraction_path,
        r#"{"materials_used": [{"item": "wire", "quantity": 0}]}"#,
    )
    .is_ok());

    let (ok, _, stderr) = run_cli(&["init", "--db", &db.display().to_string(), "--skip-seed"]);
    assert!(ok, "init failed: {stderr}");

    let (ok, _, stderr) = run_cli(&[
        "process",
        "--db",
        &db.display().to_string(),
        "--extraction",
        &extraction_path.display().to_string(),
    ]);
    assert!(!ok);
    assert!(stderr.contains("quantity"), "unexpected stderr: {stderr}");

    // Nothing was persisted.
    let (ok, stdout, _) = run_cli(&["jobs", "--db", &db.display().to_string()]);
    assert!(ok);
    assert!(stdout.trim().is_empty());
}
