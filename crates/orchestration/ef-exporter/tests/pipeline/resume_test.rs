//! Resuming failed jobs from their persistence URI.

use crate::common::{numbered, register_list_reader, register_memory_writer};
use ef_exporter::{configuration_from_uri, job_from_uri, Exporter, Registry};
use ef_types::{ExportConfig, ModuleConfig};
use serde_json::json;
use tempfile::TempDir;

fn config(persistence: ModuleConfig) -> ExportConfig {
    let mut config = ExportConfig::new(
        ModuleConfig::new("list"),
        ModuleConfig::new("memory").with_option("compression", "none"),
    );
    config.persistence = Some(persistence);
    config
}

/// Runs a job that fails at position 6 of 10 and returns its resume URI.
async fn failed_run(persistence: ModuleConfig) -> String {
    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, numbered(10), 3, Some(6));
    register_memory_writer(&mut registry);

    let mut exporter = Exporter::new(config(persistence), registry).unwrap();
    assert!(exporter.export().await.is_err());
    exporter.resume_uri().unwrap()
}

#[tokio::test]
async fn test_resume_from_memory() {
    let uri = failed_run(ModuleConfig::new("memory")).await;
    assert_eq!(job_from_uri(&uri).unwrap().last_position, json!(6));

    let resumed = configuration_from_uri(&uri).unwrap();
    assert!(resumed.exporter_options.resume);

    let mut registry = Registry::with_builtins();
    let reader = register_list_reader(&mut registry, numbered(10), 3, None);
    let writer = register_memory_writer(&mut registry);

    let mut exporter = Exporter::from_resume_uri(&uri, registry).unwrap();
    exporter.export().await.unwrap();

    assert_eq!(reader.positions(), vec![Some(json!(6))]);
    let ids: Vec<_> = writer.records().iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![6, 7, 8, 9]);
    assert!(job_from_uri(&uri).is_err());
}

#[tokio::test]
async fn test_resume_from_file_store() {
    let state = TempDir::new().unwrap();
    let persistence = ModuleConfig::new("persistence.file")
        .with_option("file_path", state.path().display().to_string());
    let uri = failed_run(persistence).await;
    assert!(uri.starts_with("file:"));

    let mut registry = Registry::with_builtins();
    register_list_reader(&mut registry, numbered(10), 3, None);
    let writer = register_memory_writer(&mut registry);

    let mut exporter = Exporter::from_resume_uri(&uri, registry).unwrap();
    exporter.export().await.unwrap();
    assert_eq!(writer.records().len(), 4);
    assert_eq!(std::fs::read_dir(state.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_resume_unknown_job() {
    let registry = Registry::with_builtins();
    assert!(Exporter::from_resume_uri("memory:no-such-job", registry).is_err());
    assert!(Exporter::from_resume_uri("pickle:/tmp/x", Registry::with_builtins()).is_err());
}
