//! Integration tests for search, enrichment and persistence end to end

use crate::support::{
    config, detail_url, locality, page, script_enrichment, status_error, timeout_error,
    ScriptedTransport, LOCALITIES_URL, MINERALS_URL,
};
use mindat_downloader::config::SaveFormat;
use mindat_downloader::downloader::{
    DownloadError, DownloadJob, DownloadOutcome, DownloadService, NoopProgress, ProgressUpdate,
};
use mindat_downloader::output::json::read_document;
use mindat_downloader::output::jsonl::read_lines;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn three_mines(transport: &ScriptedTransport) {
    transport.on(LOCALITIES_URL, &[("ltype", "60")], Ok(page(json!([]), None)));
    transport.on(
        LOCALITIES_URL,
        &[("txt", "Mine")],
        Ok(page(
            json!([locality(1, "Sarcheshmeh"), locality(2, "Gol-e-Gohar"), locality(3, "Angouran")]),
            None,
        )),
    );
}

fn service(
    transport: Arc<ScriptedTransport>,
    dir: &std::path::Path,
    format: SaveFormat,
    every: usize,
) -> DownloadService {
    DownloadService::from_config(&config(dir, format, every), transport).unwrap()
}

#[tokio::test]
async fn test_fallback_strategy_completes_with_three_records() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    three_mines(&transport);
    for id in 1..=3 {
        script_enrichment(&transport, id);
    }

    let summary = service(transport.clone(), dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.outcome, DownloadOutcome::Completed { count: 3 });
    assert_eq!(summary.outcome.to_string(), "Completed(3)");
    assert_eq!(summary.output_path, dir.path().join("Iran_Mine_enriched.json"));
    assert_eq!(summary.strategy.as_ref().map(|s| s.to_string()).as_deref(), Some("txt=Mine"));

    let saved = read_document(&summary.output_path).unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[0]["txt"], "Sarcheshmeh");
    assert_eq!(saved[0]["detail"]["description"], "detail 1");
    assert_eq!(saved[2]["locality_minerals"], json!([{"mineral": "min-3"}]));
}

#[tokio::test]
async fn test_checkpoint_every_record_grows_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    let transport = ScriptedTransport::new();
    transport.on(
        LOCALITIES_URL,
        &[("ltype", "60")],
        Ok(json!([locality(1, "a"), locality(2, "b")])),
    );

    let seen = Mutex::new(Vec::new());
    let observer = |update: ProgressUpdate<'_>| {
        let len = read_document(&path).map(|v| v.len()).unwrap_or(0);
        seen.lock().unwrap().push((update.processed, len));
    };

    service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", false), &observer)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 1), (2, 2)]);
}

#[tokio::test]
async fn test_checkpoint_interval_batches_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    let transport = ScriptedTransport::new();
    transport.on(
        LOCALITIES_URL,
        &[("ltype", "60")],
        Ok(json!([locality(1, "a"), locality(2, "b"), locality(3, "c")])),
    );

    let seen = Mutex::new(Vec::new());
    let observer = |_: ProgressUpdate<'_>| {
        seen.lock().unwrap().push(read_document(&path).map(|v| v.len()).ok());
    };

    service(transport, dir.path(), SaveFormat::Json, 2)
        .download_country_mines(&DownloadJob::new("Iran", false), &observer)
        .await
        .unwrap();

    // Nothing on disk until the second record; the last one lands at close
    assert_eq!(*seen.lock().unwrap(), vec![None, Some(2), Some(2)]);
    assert_eq!(read_document(&path).unwrap().len(), 3);
}

#[tokio::test]
async fn test_enrichment_failure_degrades_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    three_mines(&transport);
    script_enrichment(&transport, 1);
    script_enrichment(&transport, 3);
    transport.on(&detail_url(2), &[], Err(timeout_error(&detail_url(2))));
    transport.on(MINERALS_URL, &[("locality", "2")], Ok(json!([{"mineral": "gold"}])));

    let summary = service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(
        summary.outcome,
        DownloadOutcome::CompletedWithPartialEnrichment { count: 3, failures: 1 }
    );
    assert_eq!(summary.enrichment_failures, 1);

    let saved = read_document(&summary.output_path).unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[1]["detail"], Value::Null);
    assert_eq!(saved[1]["locality_minerals"], json!([{"mineral": "gold"}]));
    assert!(saved[0]["detail"].is_object());
    assert!(saved[2]["detail"].is_object());
}

#[tokio::test]
async fn test_both_enrichment_calls_failing_counts_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(LOCALITIES_URL, &[("ltype", "60")], Ok(json!([locality(7, "a")])));
    // detail and minerals both fall through to 404

    let summary = service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(
        summary.outcome,
        DownloadOutcome::CompletedWithPartialEnrichment { count: 1, failures: 1 }
    );
    let saved = read_document(&summary.output_path).unwrap();
    assert_eq!(saved[0]["detail"], Value::Null);
    assert_eq!(saved[0]["locality_minerals"], Value::Null);
}

#[tokio::test]
async fn test_locality_without_id_is_kept_unenriched() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(
        LOCALITIES_URL,
        &[("ltype", "60")],
        Ok(json!([{"txt": "nameless"}])),
    );

    let summary = service(transport.clone(), dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.enrichment_failures, 1);
    assert_eq!(transport.calls_to(MINERALS_URL), 0);
    let saved = read_document(&summary.output_path).unwrap();
    assert_eq!(saved[0]["txt"], "nameless");
    assert_eq!(saved[0]["detail"], Value::Null);
}

#[tokio::test]
async fn test_no_enrich_skips_detail_and_minerals() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    three_mines(&transport);

    let summary = service(transport.clone(), dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.outcome, DownloadOutcome::Completed { count: 3 });
    assert_eq!(transport.calls_to(MINERALS_URL), 0);
    assert_eq!(transport.calls_to(&detail_url(1)), 0);
    let saved = read_document(&summary.output_path).unwrap();
    assert!(saved[0].get("detail").is_none());
}

#[tokio::test]
async fn test_no_results_writes_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(LOCALITIES_URL, &[], Ok(page(json!([]), None)));

    let summary = service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Atlantis", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.outcome, DownloadOutcome::Completed { count: 0 });
    assert!(summary.strategy.is_none());
    let text = std::fs::read_to_string(&summary.output_path).unwrap();
    let doc: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc, json!({"results": []}));
}

#[tokio::test]
async fn test_search_failure_keeps_flushed_records() {
    let dir = tempfile::tempdir().unwrap();
    let next = "http://mindat.test/v1/localities/?ltype=60&page=2";
    let transport = ScriptedTransport::new();
    transport.on(
        LOCALITIES_URL,
        &[("ltype", "60")],
        Ok(page(json!([locality(1, "a"), locality(2, "b")]), Some(next))),
    );
    transport.on(next, &[], Err(status_error(next, 502)));

    let err = service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Search(_)));
    assert_eq!(err.stage(), "search");
    let saved = read_document(&dir.path().join("Iran_Mine_enriched.json")).unwrap();
    assert_eq!(saved.len(), 2);
}

#[tokio::test]
async fn test_auth_failure_reports_auth_stage() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(LOCALITIES_URL, &[], Err(status_error(LOCALITIES_URL, 401)));

    let err = service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "auth");
}

#[tokio::test]
async fn test_jsonl_output_one_record_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    three_mines(&transport);
    for id in 1..=3 {
        script_enrichment(&transport, id);
    }

    let summary = service(transport, dir.path(), SaveFormat::Jsonl, 1)
        .download_country_mines(&DownloadJob::new("Iran", true), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(summary.output_path, dir.path().join("Iran_Mine_enriched.jsonl"));
    let text = std::fs::read_to_string(&summary.output_path).unwrap();
    assert_eq!(text.lines().count(), 3);
    let lines = read_lines(&summary.output_path).unwrap();
    let ids: Vec<_> = lines.iter().map(|v| v["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(lines[1]["locality_minerals"], json!([{"mineral": "min-2"}]));
}

#[tokio::test]
async fn test_country_with_spaces_and_invalid_country() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(LOCALITIES_URL, &[], Ok(json!([])));
    let svc = service(transport, dir.path(), SaveFormat::Json, 1);

    let summary = svc
        .download_country_mines(&DownloadJob::new("South Africa", false), &NoopProgress)
        .await
        .unwrap();
    assert_eq!(summary.output_path, dir.path().join("South_Africa_Mine_enriched.json"));

    let err = svc
        .download_country_mines(&DownloadJob::new("../etc", false), &NoopProgress)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "config");
}

#[tokio::test]
async fn test_unwritable_output_dir_is_persistence_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "file").unwrap();

    let transport = ScriptedTransport::new();
    transport.on(LOCALITIES_URL, &[], Ok(json!([locality(1, "a")])));

    let err = service(transport, &blocker, SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", false), &NoopProgress)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "persistence");
}

#[tokio::test]
async fn test_progress_observer_sees_every_locality() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.on(
        LOCALITIES_URL,
        &[("ltype", "60")],
        Ok(json!({"count": 2, "next": null, "results": [locality(1, "a"), locality(2, "b")]})),
    );

    let seen = Mutex::new(Vec::new());
    let observer = |u: ProgressUpdate<'_>| {
        seen.lock()
            .unwrap()
            .push((u.processed, u.total, u.strategy.map(|s| s.to_string())));
    };

    service(transport, dir.path(), SaveFormat::Json, 1)
        .download_country_mines(&DownloadJob::new("Iran", false), &observer)
        .await
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], (2, Some(2), Some("ltype=60".to_string())));
}
