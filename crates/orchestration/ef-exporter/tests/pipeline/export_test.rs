//! Pipeline runs: defaults, grouping, filters, items limit, failures.

use crate::common::{
    numbered, register_list_reader, register_memory_writer, register_recording_notifier,
    register_stalling_reader,
};
use ef_error::ExportError;
use ef_exporter::{job_from_uri, Exporter, Registry};
use ef_types::{ExportConfig, ModuleConfig};
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn memory_persistence() -> Option<ModuleConfig> {
    Some(ModuleConfig::new("persistence.memory"))
}

fn places() -> Vec<Value> {
    let mut records = Vec::new();
    for (country, city) in [("ES", "Madrid"), ("ES", "Valencia"), ("FR", "Paris")] {
        for n in 0..10 {
            records.push(json!({"country": country, "city": city, "n": n}));
        }
    }
    records
}

fn gz_lines(path: &Path) -> Vec<Value> {
    let mut content = String::new();
    GzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_random_to_console() {
    let mut config = ExportConfig::new(
        ModuleConfig::new("readers.random")
            .with_option("number_of_items", 1000)
            .with_option("batch_size", 100),
        ModuleConfig::new("writers.console"),
    );
    config.persistence = memory_persistence();

    let mut exporter = Exporter::new(config, Registry::with_builtins()).unwrap();
    exporter.export().await.unwrap();

    let metadata = exporter.metadata();
    assert_eq!(metadata.get_u64("writer", "items_count"), 1000);
    assert_eq!(metadata.get_u64("reader", "read_items"), 1000);
    assert!(!metadata.bypassed_pipeline());

    let job_id = metadata
        .get_metadata("persistence", "job_id")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap();
    assert!(job_from_uri(&format!("memory:{job_id}")).is_err());
    assert!(exporter.resume_uri().is_none());

    let snapshot = metadata.snapshot();
    assert!(snapshot["elapsed_time"].as_f64().unwrap() >= 0.0);
    assert!(snapshot["end_time"].is_string());
}

#[tokio::test]
async fn test_grouped_filesystem() {
    let out = TempDir::new().unwrap();
    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, places(), 7, None);

    let mut config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("writers.fs")
            .with_option(
                "filebase",
                format!("{}/{{groups[0]}}/{{groups[1]}}/file", out.path().display()),
            )
            .with_option("items_per_buffer_write", 2),
    );
    config.grouper = Some(ModuleConfig::new("groupers.keys").with_option("keys", json!(["country", "city"])));

    let mut exporter = Exporter::new(config, registry).unwrap();
    exporter.export().await.unwrap();

    for (dir, city) in [("ES/Madrid", "Madrid"), ("ES/Valencia", "Valencia"), ("FR/Paris", "Paris")] {
        let files: Vec<_> = std::fs::read_dir(out.path().join(dir))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 5, "{dir}");
        for file in files {
            assert!(file.to_string_lossy().ends_with(".jl.gz"));
            let lines = gz_lines(&file);
            assert_eq!(lines.len(), 2);
            assert!(lines.iter().all(|l| l["city"] == city));
        }
    }
    assert_eq!(exporter.metadata().get_u64("writer", "written_files"), 15);
}

#[tokio::test]
async fn test_filters_and_transform() {
    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, places(), 10, None);
    let writer = register_memory_writer(&mut registry);

    let mut config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("memory").with_option("compression", "none"),
    );
    config.filter_before = Some(
        ModuleConfig::new("filters.key_value")
            .with_option("keys", json!([{"name": "country", "value": "ES"}])),
    );
    config.transform =
        Some(ModuleConfig::new("transforms.project").with_option("fields", json!(["city", "n"])));
    config.filter_after = Some(
        ModuleConfig::new("key_value")
            .with_option("mode", "regex")
            .with_option("keys", json!([{"name": "city", "value": "^Ma"}])),
    );

    let mut exporter = Exporter::new(config, registry).unwrap();
    exporter.export().await.unwrap();

    let records = writer.records();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r == &json!({"city": "Madrid", "n": r["n"]})));

    let metadata = exporter.metadata();
    assert_eq!(metadata.get_u64("filter_before", "total"), 30);
    assert_eq!(metadata.get_u64("filter_before", "filtered_out"), 10);
    assert_eq!(metadata.get_u64("filter_after", "total"), 20);
    assert_eq!(metadata.get_u64("filter_after", "filtered_out"), 10);
}

#[tokio::test]
async fn test_items_limit() {
    let mut registry = Registry::with_builtins();
    let writer = register_memory_writer(&mut registry);

    let mut config = ExportConfig::new(
        ModuleConfig::new("random").with_option("number_of_items", 1000),
        ModuleConfig::new("memory")
            .with_option("compression", "none")
            .with_option("items_limit", 17),
    );
    config.persistence = memory_persistence();

    let mut exporter = Exporter::new(config, registry).unwrap();
    exporter.export().await.unwrap();

    assert_eq!(writer.records().len(), 17);
    assert_eq!(exporter.metadata().get_u64("writer", "items_count"), 17);
    assert!(exporter.job_id().is_none());
    assert!(writer.is_closed());
}

#[tokio::test]
async fn test_one_record_per_file() {
    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, numbered(5), 2, None);
    let writer = register_memory_writer(&mut registry);

    let config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("memory")
            .with_option("compression", "none")
            .with_option("items_per_buffer_write", 1),
    );
    let mut exporter = Exporter::new(config, registry).unwrap();
    exporter.export().await.unwrap();

    let delivered = writer.delivered();
    assert_eq!(delivered.len(), 5);
    assert!(delivered.iter().all(|d| d.lines.len() == 1 && d.group_keys.is_empty()));
}

#[tokio::test]
async fn test_failure_keeps_job_and_notifies() {
    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, numbered(10), 2, Some(4));
    let writer = register_memory_writer(&mut registry);
    let events = register_recording_notifier(&mut registry);

    let mut config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("memory").with_option("compression", "none"),
    );
    config.persistence = memory_persistence();
    config.exporter_options.notifications = vec![ModuleConfig::new("recording")];

    let mut exporter = Exporter::new(config, registry).unwrap();
    let err = exporter.export().await.unwrap_err();
    assert!(matches!(err, ExportError::Reader(_)));

    assert_eq!(
        *events.lock(),
        vec![
            "started".to_string(),
            "failed: Reader error: induced failure at 4".to_string()
        ]
    );
    assert!(writer.is_closed());
    assert!(writer.records().is_empty());

    let uri = exporter.resume_uri().unwrap();
    let job = job_from_uri(&uri).unwrap();
    assert_eq!(job.last_position, json!(4));
    assert!(!job.job_finished);
    assert!(exporter.metadata().snapshot()["end_time"].is_string());
}

#[tokio::test]
async fn test_empty_batch_keeps_checkpoint() {
    let mut registry = Registry::with_builtins();
    register_stalling_reader(&mut registry, numbered(10), 3, 6);
    let writer = register_memory_writer(&mut registry);

    let mut config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("memory").with_option("compression", "none"),
    );
    config.persistence = memory_persistence();

    let mut exporter = Exporter::new(config, registry).unwrap();
    let err = exporter.export().await.unwrap_err();
    assert!(err.to_string().contains("stalled at 6"), "{err}");

    let job = job_from_uri(&exporter.resume_uri().unwrap()).unwrap();
    assert_eq!(job.last_position, json!(6));
    assert_eq!(exporter.metadata().get_u64("reader", "read_items"), 6);
    assert!(writer.delivered().is_empty());
}

#[tokio::test]
async fn test_invalid_configuration_fails_before_reading() {
    let config = ExportConfig::new(
        ModuleConfig::new("random"),
        ModuleConfig::new("fs").with_option("filebase", "/tmp/x").with_option("bogus", true),
    );
    let err = Exporter::new(config, Registry::with_builtins()).err().unwrap();
    assert!(matches!(err, ExportError::Configuration(_)));

    let unknown = ExportConfig::new(ModuleConfig::new("kafka"), ModuleConfig::new("console"));
    assert!(Exporter::new(unknown, Registry::with_builtins()).is_err());
}
