//! CLI route table against a workspace on disk

use clap::Parser;
use scaffold_engine::cli::{Cli, RunContext};
use serde_json::Value;
use tempfile::TempDir;

const CATALOG_TOML: &str = r#"
[[frames]]
id = "collect"
name = "Collect"
capability_kind = "in_process"
entry_point = "builtin.echo"

[frames.parameters]
collected = true

[[frames]]
id = "summarize"
name = "Summarize"
capability_kind = "in_process"
entry_point = "builtin.echo"
dependencies = ["collect"]

[frames.parameters]
summary = "ok"

[[scaffolds]]
id = "digest"
name = "Digest"

[scaffolds.stages]
1 = ["collect", "summarize"]

[scaffolds.success_criteria]
summary = "ok"
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("scaffolds.toml"), CATALOG_TOML).unwrap();
    dir
}

fn context(ws: &TempDir) -> RunContext {
    RunContext::new(ws.path().to_path_buf(), None, None).unwrap()
}

fn parse(ws: &TempDir, args: &[&str]) -> Cli {
    let root = ws.path().to_string_lossy().to_string();
    let mut argv = vec!["scaffold", "--workspace", root.as_str()];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[tokio::test]
async fn test_validate_reports_fingerprint() {
    let ws = workspace();
    let cli = parse(&ws, &["validate", "--format", "json"]);
    let output = context(&ws).execute(&cli.command).await.unwrap();

    assert_eq!(output.exit_code, 0);
    let summary: Value = serde_json::from_str(&output.text).unwrap();
    assert_eq!(summary["frames"], 2);
    assert_eq!(summary["scaffolds"], 1);
    assert_eq!(summary["fingerprint"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_plan_groups_dependent_frames() {
    let ws = workspace();
    let cli = parse(&ws, &["plan", "digest", "--format", "json"]);
    let output = context(&ws).execute(&cli.command).await.unwrap();

    let plans: Value = serde_json::from_str(&output.text).unwrap();
    let plans = plans.as_array().unwrap();
    assert_eq!(plans.len(), 8);
    assert_eq!(plans[0]["groups"], serde_json::json!([["collect"], ["summarize"]]));
    assert_eq!(plans[1]["groups"], serde_json::json!([]));
}

#[tokio::test]
async fn test_list_frames_text() {
    let ws = workspace();
    let cli = parse(&ws, &["list", "frames"]);
    let output = context(&ws).execute(&cli.command).await.unwrap();
    assert!(output.text.contains("collect"));
    assert!(output.text.contains("summarize"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_completes_and_writes_report() {
    let ws = workspace();
    let cli = parse(&ws, &["run", "digest", "--format", "json"]);
    let output = context(&ws).execute(&cli.command).await.unwrap();

    assert_eq!(output.exit_code, 0, "{}", output.text);
    let status: Value = serde_json::from_str(&output.text).unwrap();
    assert_eq!(status["status"], "complete");
    assert_eq!(status["criteria_satisfied"], true);
    let report_path = std::path::PathBuf::from(status["report_path"].as_str().unwrap());
    assert!(report_path.starts_with(ws.path().join(".scaffold/reports")));
    assert!(report_path.exists());
}

#[test]
fn test_missing_catalog_fails_context() {
    let ws = TempDir::new().unwrap();
    assert!(RunContext::new(ws.path().to_path_buf(), None, None).is_err());
}
