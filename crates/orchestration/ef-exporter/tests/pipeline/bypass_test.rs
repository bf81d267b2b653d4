//! Stream bypass between filesystem reader and writer.

use ef_exporter::persistence::{JobStore, MemoryBackend};
use ef_exporter::{try_bypass, BypassKind, Exporter, Registry};
use ef_traits::Persistence;
use ef_types::{ExportConfig, ModuleConfig};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn fs_config(input: &Path, output: &Path) -> ExportConfig {
    let mut config = ExportConfig::new(
        ModuleConfig::new("readers.fs").with_option("input_dir", input.display().to_string()),
        ModuleConfig::new("writers.fs")
            .with_option("filebase", format!("{}/copy/", output.display())),
    );
    config.persistence = Some(ModuleConfig::new("memory"));
    config
}

fn write_inputs(dir: &Path) {
    std::fs::write(dir.join("a.jl"), b"{\"id\":1}\n{\"id\":2}\n").unwrap();
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    std::fs::write(dir.join("nested/b.jl.gz"), [0x1f, 0x8b, 0x08, 0x00, 0x42]).unwrap();
}

#[tokio::test]
async fn test_stream_bypass_copies_bytes() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_inputs(input.path());

    let config = fs_config(input.path(), output.path());
    assert_eq!(try_bypass(&config, &Registry::with_builtins()), Some(BypassKind::Stream));

    let mut exporter = Exporter::new(config, Registry::with_builtins()).unwrap();
    exporter.export().await.unwrap();

    assert_eq!(
        std::fs::read(output.path().join("copy/a.jl")).unwrap(),
        std::fs::read(input.path().join("a.jl")).unwrap()
    );
    assert_eq!(
        std::fs::read(output.path().join("copy/b.jl.gz")).unwrap(),
        vec![0x1f, 0x8b, 0x08, 0x00, 0x42]
    );

    let metadata = exporter.metadata();
    assert!(metadata.bypassed_pipeline());
    assert!(!metadata.accurate_items_count());
    assert_eq!(metadata.get_u64("writer", "written_files"), 2);
    assert_eq!(metadata.get_u64("writer", "bytes_copied"), 23);
    assert_eq!(metadata.get_u64("reader", "read_items"), 0);
    assert!(exporter.job_id().is_none());
}

#[tokio::test]
async fn test_stream_bypass_skips_done_files() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_inputs(input.path());
    let config = fs_config(input.path(), output.path());

    let mut store = JobStore::new(MemoryBackend::new());
    store.generate_new_job(&config.to_value()).unwrap();
    store
        .commit_position(json!({"done": ["a.jl"], "stats": {"bytes_copied": 18}}))
        .unwrap();
    let uri = store.resume_uri().unwrap();

    let mut exporter = Exporter::from_resume_uri(&uri, Registry::with_builtins()).unwrap();
    exporter.export().await.unwrap();

    assert!(!output.path().join("copy/a.jl").exists());
    assert!(output.path().join("copy/b.jl.gz").exists());
    assert_eq!(exporter.metadata().get_u64("writer", "written_files"), 2);
    assert_eq!(exporter.metadata().get_u64("writer", "bytes_copied"), 23);
}

#[tokio::test]
async fn test_prevent_bypass_runs_pipeline() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    std::fs::write(input.path().join("a.jl"), b"{\"id\":1}\n{\"id\":2}\n").unwrap();

    let mut config = fs_config(input.path(), output.path());
    config.exporter_options.prevent_bypass = true;

    let mut exporter = Exporter::new(config, Registry::with_builtins()).unwrap();
    exporter.export().await.unwrap();

    let metadata = exporter.metadata();
    assert!(!metadata.bypassed_pipeline());
    assert_eq!(metadata.get_u64("writer", "items_count"), 2);
    assert!(output.path().join("copy/0.jl.gz").exists());
}
