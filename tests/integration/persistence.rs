//! Integration tests for the output sinks

use mindat_downloader::config::SaveFormat;
use mindat_downloader::output::json::{read_document, write_document};
use mindat_downloader::output::jsonl::read_lines;
use mindat_downloader::output::{
    output_path, LocalitySink, OutputWriter, PersistedDocument, SinkType,
};
use mindat_downloader::Locality;
use serde_json::{json, Value};

fn locality(id: i64) -> Locality {
    Locality::from_value(json!({"id": id, "name": format!("Mine {id}"), "elements": "Cu-Mo"})).unwrap()
}

fn ids(values: &[Value]) -> Vec<i64> {
    values.iter().filter_map(|v| v["id"].as_i64()).collect()
}

#[test]
fn test_json_sink_document_matches_appends_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = output_path(dir.path(), "Iran", SaveFormat::Json).unwrap();
    let mut sink = SinkType::open(&path, SaveFormat::Json, None).unwrap();
    assert_eq!(sink.format(), SaveFormat::Json);

    for id in 1..=5 {
        sink.append(&locality(id)).unwrap();
        sink.flush().unwrap();
        assert_eq!(ids(&read_document(&path).unwrap()), (1..=id).collect::<Vec<_>>());
    }
    assert_eq!(sink.appended(), 5);
    sink.close().unwrap();
}

#[test]
fn test_json_document_preserves_field_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordered.json");
    let record = Locality::from_value(json!({"zeta": 1, "alpha": 2, "id": 3})).unwrap();
    write_document(&path, &[record]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let zeta = text.find("zeta").unwrap();
    let alpha = text.find("alpha").unwrap();
    assert!(zeta < alpha);
    assert!(text.starts_with("{\n  \"results\""));
}

#[test]
fn test_rewrite_replaces_document_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");
    write_document(&path, &[locality(1)]).unwrap();
    write_document(&path, &[locality(1), locality(2)]).unwrap();

    assert_eq!(ids(&read_document(&path).unwrap()), vec![1, 2]);

    // Only the document and its lock file remain; no temp files leak
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Iran_Mine_enriched.json", "Iran_Mine_enriched.lock"]);
}

#[test]
fn test_jsonl_sink_without_seed_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.jsonl");
    std::fs::write(&path, "{\"id\":100}\n").unwrap();

    let mut sink = SinkType::open(&path, SaveFormat::Jsonl, None).unwrap();
    sink.append(&locality(1)).unwrap();
    sink.close().unwrap();

    assert_eq!(ids(&read_lines(&path).unwrap()), vec![1]);
}

#[test]
fn test_jsonl_sink_with_seed_appends_after_torn_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.jsonl");
    // A killed run can leave a partial last line and no trailing newline
    std::fs::write(&path, "{\"id\":1}\n{\"id\":2}\n{\"id\":3,\"na").unwrap();

    let mut sink = SinkType::open(&path, SaveFormat::Jsonl, Some(PersistedDocument::default())).unwrap();
    sink.append(&locality(4)).unwrap();
    sink.close().unwrap();

    assert_eq!(ids(&read_lines(&path).unwrap()), vec![1, 2, 4]);
}

#[test]
fn test_jsonl_reload_does_not_need_trailing_newline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_newline.jsonl");
    std::fs::write(&path, "{\"id\":1}\n\n{\"id\":2}").unwrap();
    assert_eq!(ids(&read_lines(&path).unwrap()), vec![1, 2]);
}

#[test]
fn test_json_sink_seeded_keeps_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Iran_Mine_enriched.json");

    let seed = PersistedDocument::from(vec![locality(1), locality(2)]);
    let mut sink = SinkType::open(&path, SaveFormat::Json, Some(seed)).unwrap();
    sink.append(&locality(3)).unwrap();
    sink.flush().unwrap();
    assert_eq!(ids(&read_document(&path).unwrap()), vec![1, 2, 3]);
    assert_eq!(sink.appended(), 1);
}

#[test]
fn test_read_document_rejects_truncated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"results\": [{\"id\": 1}").unwrap();
    assert!(read_document(&path).is_err());
}
