use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;

use crate::domain::replay::{HistoryError, SampleHistory};
use crate::domain::sample::{self, PowerSample, SampleSource};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    watts REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_samples_source_recorded_at
ON samples (source, recorded_at);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub id: i64,
    pub source: String,
    pub recorded_at: String,
    pub watts: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSampleRecord {
    pub source: String,
    pub recorded_at: String,
    pub watts: f64,
    pub created_at: String,
}

pub fn insert_sample(
    connection: &Connection,
    new_sample: &NewSampleRecord,
) -> Result<i64, DbError> {
    connection.execute(
        "INSERT INTO samples (source, recorded_at, watts, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            new_sample.source,
            new_sample.recorded_at,
            new_sample.watts,
            new_sample.created_at,
        ],
    )?;

    Ok(connection.last_insert_rowid())
}

/// Archived samples of one source since a boundary, ascending by recording
/// time. Timestamps are stored RFC 3339 UTC, so lexicographic comparison
/// matches chronological order.
pub fn samples_since(
    connection: &Connection,
    source: &str,
    since_inclusive: &str,
) -> Result<Vec<SampleRecord>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, source, recorded_at, watts, created_at
         FROM samples
         WHERE source = ?1 AND recorded_at >= ?2
         ORDER BY recorded_at ASC, id ASC",
    )?;

    let rows = statement.query_map(params![source, since_inclusive], map_sample_row)?;

    let mut samples = Vec::new();
    for row in rows {
        samples.push(row?);
    }

    Ok(samples)
}

pub fn list_recent_samples(
    connection: &Connection,
    source: Option<&str>,
    limit: u32,
) -> Result<Vec<SampleRecord>, DbError> {
    let mut samples = Vec::new();

    match source {
        Some(source) => {
            let mut statement = connection.prepare(
                "SELECT id, source, recorded_at, watts, created_at
                 FROM samples
                 WHERE source = ?1
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = statement.query_map(params![source, i64::from(limit)], map_sample_row)?;
            for row in rows {
                samples.push(row?);
            }
        }
        None => {
            let mut statement = connection.prepare(
                "SELECT id, source, recorded_at, watts, created_at
                 FROM samples
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = statement.query_map(params![i64::from(limit)], map_sample_row)?;
            for row in rows {
                samples.push(row?);
            }
        }
    }

    Ok(samples)
}

pub fn count_samples(connection: &Connection, source: &str) -> Result<i64, DbError> {
    let count = connection.query_row(
        "SELECT COUNT(*) FROM samples WHERE source = ?1",
        params![source],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn delete_samples_before(
    connection: &Connection,
    boundary_exclusive: &str,
) -> Result<usize, DbError> {
    let deleted = connection.execute(
        "DELETE FROM samples WHERE recorded_at < ?1",
        params![boundary_exclusive],
    )?;
    Ok(deleted)
}

pub fn latest_sample(connection: &Connection) -> Result<Option<SampleRecord>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, source, recorded_at, watts, created_at
         FROM samples
         ORDER BY recorded_at DESC, id DESC
         LIMIT 1",
    )?;

    let mut rows = statement.query([])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(map_sample_row(row)?));
    }

    Ok(None)
}

fn map_sample_row(row: &rusqlite::Row<'_>) -> Result<SampleRecord, rusqlite::Error> {
    Ok(SampleRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        recorded_at: row.get(2)?,
        watts: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn timestamp_to_rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The SQLite archive seen through the replay orchestrator's history seam.
#[derive(Clone)]
pub struct SqliteSampleArchive {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSampleArchive {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }
}

impl SampleHistory for SqliteSampleArchive {
    fn samples_since(
        &self,
        source: SampleSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<PowerSample>, HistoryError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| HistoryError("database lock poisoned".to_string()))?;

        let records = samples_since(&connection, source.as_str(), &timestamp_to_rfc3339(since))
            .map_err(|error| HistoryError(error.to_string()))?;

        let mut samples = Vec::with_capacity(records.len());
        for record in records {
            let timestamp = sample::parse_timestamp(&record.recorded_at)
                .map_err(|error| HistoryError(error.to_string()))?;
            samples.push(PowerSample::new(source, timestamp, record.watts));
        }

        Ok(samples)
    }
}
