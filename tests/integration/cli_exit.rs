//! Binary-level tests: exit codes, stage messages and a full run

use assert_cmd::Command;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bin(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mindat-downloader").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("MINDAT_API_KEY")
        .env_remove("MINDAT_API_KEY_FILE")
        .env("RUST_LOG", "mindat_downloader=warn");
    cmd
}

#[test]
fn test_help_lists_flags() {
    let workdir = TempDir::new().unwrap();
    let output = bin(&workdir).arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--country", "--type", "--page-size", "--no-enrich", "--format", "--no-resume"] {
        assert!(help.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn test_invalid_flag_value_is_usage_error() {
    let workdir = TempDir::new().unwrap();
    bin(&workdir)
        .args(["--country", "Iran", "--page-size", "0"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_missing_api_key_exits_with_auth_stage() {
    let workdir = TempDir::new().unwrap();
    let output = bin(&workdir)
        .args(["--country", "Iran", "--api-key-file", "nope.txt"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[auth]"), "stderr: {stderr}");
    assert!(stderr.contains("nope.txt"));
}

#[test]
fn test_invalid_config_exits_with_config_stage() {
    let workdir = TempDir::new().unwrap();
    fs::write(workdir.path().join("config.yaml"), "page_size: 0\n").unwrap();

    let output = bin(&workdir).args(["--country", "Iran"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[config]"));
}

#[test]
fn test_unparseable_config_exits_with_config_stage() {
    let workdir = TempDir::new().unwrap();
    fs::write(workdir.path().join("config.yaml"), "save: [unclosed\n").unwrap();

    let output = bin(&workdir).args(["--country", "Iran"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_prompt_answers_are_used_without_country_flag() {
    let workdir = TempDir::new().unwrap();
    // No key available, so the run stops at the auth stage after prompting
    let output = bin(&workdir)
        .write_stdin("Chile\n\n\n")
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Country [Iran]: "));
    assert!(stdout.contains("Page size [100]: "));
    assert_eq!(output.status.code(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_run_against_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/localities/"))
        .and(header("authorization", "Token cli-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1, "next": null, "results": [{"id": 77, "txt": "Sar Cheshmeh"}]
        })))
        .mount(&server)
        .await;

    let workdir = TempDir::new().unwrap();
    fs::write(
        workdir.path().join("config.yaml"),
        format!(
            "base_url: {}/v1\nsave:\n  dir: out\n  format: jsonl\nsearch_strategies:\n  - {{ param: ltype, value: 60 }}\n",
            server.uri()
        ),
    )
    .unwrap();

    let dir = workdir.path().to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        let mut cmd = Command::cargo_bin("mindat-downloader").unwrap();
        cmd.current_dir(&dir)
            .env("MINDAT_API_KEY", "cli-test-key")
            .args(["--country", "Iran", "--no-enrich"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Outcome: Completed(1)"));

    let saved = fs::read_to_string(workdir.path().join("out/Iran_Mine_enriched.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(saved.trim()).unwrap();
    assert_eq!(record["id"], 77);

    let run_logs = fs::read_dir(workdir.path().join("out"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("run_"))
        .count();
    assert_eq!(run_logs, 1);
}
