//! `SQLite`-backed job store.

use super::JobBackend;
use chrono::{DateTime, Utc};
use ef_error::{ExportError, Result};
use ef_types::{OptionKind, OptionSpec, PersistedJob};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Idempotent DDL for the jobs table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS export_jobs (
    job_id TEXT PRIMARY KEY,
    last_position TEXT NOT NULL,
    configuration TEXT NOT NULL,
    last_committed_timestamp TEXT,
    job_finished INTEGER NOT NULL DEFAULT 0,
    commited_positions INTEGER NOT NULL DEFAULT 0
);
";

#[derive(Debug, Deserialize)]
struct SqliteOptions {
    database: String,
}

/// One row per job in an `export_jobs` table.
///
/// Create with [`SqliteBackend::open`] for a database file or
/// [`SqliteBackend::in_memory`] for tests.
pub struct SqliteBackend {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    pub const OPTIONS: &'static [OptionSpec] =
        &[OptionSpec::required("database", OptionKind::String)];

    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExportError::persistence(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(backend_error)?;
        conn.execute_batch(CREATE_TABLES).map_err(backend_error)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(backend_error)?;
        conn.execute_batch(CREATE_TABLES).map_err(backend_error)?;
        Ok(Self { conn, path: None })
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: SqliteOptions =
            ef_types::parse_options("persistence.sqlite", Self::OPTIONS, options)?;
        Self::open(opts.database)
    }
}

fn backend_error(err: rusqlite::Error) -> ExportError {
    ExportError::persistence(format!("sqlite: {err}"))
}

fn parse_json(column: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| ExportError::persistence(format!("corrupt {column} column: {e}")))
}

impl JobBackend for SqliteBackend {
    fn read(&self, job_id: &str) -> Result<Option<PersistedJob>> {
        let row = self
            .conn
            .query_row(
                "SELECT last_position, configuration, last_committed_timestamp, \
                 job_finished, commited_positions FROM export_jobs WHERE job_id = ?1",
                [job_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(backend_error)?;

        let Some((position, configuration, timestamp, finished, commits)) = row else {
            return Ok(None);
        };
        Ok(Some(PersistedJob {
            job_id: job_id.to_string(),
            last_position: parse_json("last_position", &position)?,
            configuration: parse_json("configuration", &configuration)?,
            last_committed_timestamp: timestamp
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            job_finished: finished,
            commited_positions: commits.max(0) as u64,
        }))
    }

    fn write(&mut self, job: &PersistedJob) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO export_jobs (job_id, last_position, configuration, \
                 last_committed_timestamp, job_finished, commited_positions) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    job.job_id,
                    job.last_position.to_string(),
                    job.configuration.to_string(),
                    job.last_committed_timestamp.map(|t| t.to_rfc3339()),
                    job.job_finished,
                    job.commited_positions as i64,
                ],
            )
            .map_err(backend_error)?;
        Ok(())
    }

    fn remove(&mut self, job_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM export_jobs WHERE job_id = ?1", [job_id])
            .map_err(backend_error)?;
        Ok(())
    }

    fn uri(&self, job_id: &str) -> Option<String> {
        self.path
            .as_ref()
            .map(|path| format!("sqlite:{}/{job_id}", path.display()))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{configuration_from_uri, JobStore};
    use ef_traits::Persistence;
    use ef_types::{ExportConfig, ModuleConfig};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let mut backend = SqliteBackend::in_memory().unwrap();
        let mut job = PersistedJob::new("j1", json!({"a": [1, 2]}));
        backend.write(&job).unwrap();
        assert_eq!(backend.read("j1").unwrap(), Some(job.clone()));

        job.commit(json!({"key": "p/a", "line": 10}));
        job.finish();
        backend.write(&job).unwrap();
        let stored = backend.read("j1").unwrap().unwrap();
        assert_eq!(stored.last_position, job.last_position);
        assert!(stored.job_finished);
        assert_eq!(stored.commited_positions, 1);
        assert!(stored.last_committed_timestamp.is_some());
        assert!(backend.uri("j1").is_none());

        backend.remove("j1").unwrap();
        assert!(backend.read("j1").unwrap().is_none());
    }

    #[test]
    fn test_resume_from_uri() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("state/jobs.sqlite");
        let config = ExportConfig::new(
            ModuleConfig::new("random"),
            ModuleConfig::new("console"),
        );

        let mut store = JobStore::new(SqliteBackend::open(&database).unwrap());
        let job_id = store.generate_new_job(&config.to_value()).unwrap();
        store.commit_position(json!(30)).unwrap();
        let uri = store.resume_uri().unwrap();
        assert_eq!(uri, format!("sqlite:{}/{job_id}", database.display()));
        drop(store);

        let resumed = configuration_from_uri(&uri).unwrap();
        assert_eq!(resumed.exporter_options.persistence_state_id.as_deref(), Some(job_id.as_str()));

        let mut store = JobStore::new(SqliteBackend::open(&database).unwrap());
        store.load_job(&job_id).unwrap();
        assert_eq!(store.get_last_position().unwrap(), Some(json!(30)));
    }
}
