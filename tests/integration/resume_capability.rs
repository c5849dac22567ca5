//! Integration tests for rerunning over an existing output file

use crate::support::{
    config, detail_url, locality, script_enrichment, ScriptedTransport, LOCALITIES_URL,
    MINERALS_URL,
};
use mindat_downloader::config::SaveFormat;
use mindat_downloader::downloader::{DownloadJob, DownloadOutcome, DownloadService, NoopProgress};
use mindat_downloader::output::json::read_document;
use mindat_downloader::output::jsonl::read_lines;
use serde_json::json;
use std::sync::Arc;

fn script_search(transport: &ScriptedTransport, ids: &[i64]) {
    let items: Vec<_> = ids.iter().map(|id| locality(*id, "mine")).collect();
    transport.on(LOCALITIES_URL, &[("ltype", "60")], Ok(json!(items)));
}

fn service(
    transport: Arc<ScriptedTransport>,
    dir: &std::path::Path,
    format: SaveFormat,
) -> DownloadService {
    DownloadService::from_config(&config(dir, format, 1), transport).unwrap()
}

#[tokio::test]
async fn test_rerun_does_not_duplicate_or_reenrich() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&json!({"results": [
            {"id": 1, "txt": "mine", "detail": {"id": 1}, "locality_minerals": []},
            {"id": 2, "txt": "mine", "detail": {"id": 2}, "locality_minerals": []}
        ]}))
        .unwrap(),
    )
    .unwrap();

    let transport = ScriptedTransport::new();
    script_search(&transport, &[1, 2, 3]);
    script_enrichment(&transport, 3);

    let summary = service(transport.clone(), dir.path(), SaveFormat::Json)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.outcome, DownloadOutcome::Completed { count: 1 });

    assert_eq!(transport.calls_to(&detail_url(1)), 0);
    assert_eq!(transport.calls_to(&detail_url(2)), 0);
    assert_eq!(transport.calls_to(&detail_url(3)), 1);
    assert_eq!(transport.calls_with(MINERALS_URL, "locality", "1"), 0);

    let saved = read_document(&path).unwrap();
    let ids: Vec<_> = saved.iter().map(|v| v["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    // Previously persisted records are carried over untouched
    assert_eq!(saved[0]["detail"], json!({"id": 1}));
}

#[tokio::test]
async fn test_resume_keeps_foreign_entries_and_top_level_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    std::fs::write(
        &path,
        r#"{"results": [{"id": 1, "txt": "mine"}, "legacy-string-entry"], "meta": {"v": 1}}"#,
    )
    .unwrap();

    let transport = ScriptedTransport::new();
    script_search(&transport, &[1, 2]);

    let summary = service(transport, dir.path(), SaveFormat::Json)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 1);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["results"][0], json!({"id": 1, "txt": "mine"}));
    assert_eq!(saved["results"][1], json!("legacy-string-entry"));
    assert_eq!(saved["results"][2]["id"], json!(2));
    assert_eq!(saved["results"].as_array().map(Vec::len), Some(3));
    assert_eq!(saved["meta"], json!({"v": 1}));
}

#[tokio::test]
async fn test_second_identical_run_writes_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    script_search(&transport, &[1, 2]);

    let svc = service(transport, dir.path(), SaveFormat::Json);
    let job = DownloadJob::new("Iran", false);
    let first = svc.download_country_mines(&job, &NoopProgress).await.unwrap();
    let second = svc.download_country_mines(&job, &NoopProgress).await.unwrap();

    assert_eq!(first.written, 2);
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(read_document(&second.output_path).unwrap().len(), 2);
}

#[tokio::test]
async fn test_resume_disabled_rewrites_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    std::fs::write(&path, r#"{"results": [{"id": 1, "stale": true}]}"#).unwrap();

    let transport = ScriptedTransport::new();
    script_search(&transport, &[1, 2]);

    let summary = service(transport, dir.path(), SaveFormat::Json)
        .with_resume(false)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 0);
    let saved = read_document(&path).unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved[0].get("stale").is_none());
}

#[tokio::test]
async fn test_corrupt_output_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    std::fs::write(&path, "{\"results\": [{\"id\": 1}, {\"id\": ").unwrap();

    let transport = ScriptedTransport::new();
    script_search(&transport, &[1]);

    let summary = service(transport, dir.path(), SaveFormat::Json)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap();
    assert_eq!(summary.written, 1);

    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    let kept = std::fs::read_to_string(quarantined[0].path()).unwrap();
    assert!(kept.starts_with("{\"results\": [{\"id\": 1}"));
}

#[tokio::test]
async fn test_jsonl_resume_appends_missing_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.jsonl");
    std::fs::write(&path, "{\"id\":1,\"txt\":\"mine\"}\n").unwrap();

    let transport = ScriptedTransport::new();
    script_search(&transport, &[1, 2]);

    let summary = service(transport, dir.path(), SaveFormat::Jsonl)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    let ids: Vec<_> = read_lines(&path).unwrap().iter().map(|v| v["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2)]);
}
