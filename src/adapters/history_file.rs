use std::fs;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::replay::{HistoryError, SampleHistory};
use crate::domain::sample::{self, PowerSample, SampleParseError, SampleSource};

/// Captured sample archive loaded from a JSON file, used to replay a recorded
/// day without a database. Capture format:
///
/// ```json
/// {
///   "generator": [{ "recorded_at": "2026-03-14T09:00:00Z", "watts": 812.5 }],
///   "grid": [{ "recorded_at": "2026-03-14T09:00:05Z", "watts": -150.0 }]
/// }
/// ```
#[derive(Debug)]
pub struct FileSampleArchive {
    generator: Vec<PowerSample>,
    grid: Vec<PowerSample>,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptureFile {
    #[serde(default)]
    generator: Vec<CaptureEvent>,
    #[serde(default)]
    grid: Vec<CaptureEvent>,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptureEvent {
    recorded_at: String,
    watts: f64,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read capture file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse capture file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid capture event: {0}")]
    Event(#[from] SampleParseError),
}

impl FileSampleArchive {
    pub fn from_file(path: &str) -> Result<Self, CaptureError> {
        let content = fs::read_to_string(path)?;
        let capture: CaptureFile = serde_json::from_str(&content)?;

        Ok(Self {
            generator: parse_events(SampleSource::Generator, &capture.generator)?,
            grid: parse_events(SampleSource::Grid, &capture.grid)?,
        })
    }
}

fn parse_events(
    source: SampleSource,
    events: &[CaptureEvent],
) -> Result<Vec<PowerSample>, CaptureError> {
    let mut samples = Vec::with_capacity(events.len());
    for event in events {
        let timestamp = sample::parse_timestamp(&event.recorded_at)?;
        samples.push(PowerSample::new(source, timestamp, event.watts));
    }
    Ok(samples)
}

impl SampleHistory for FileSampleArchive {
    fn samples_since(
        &self,
        source: SampleSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<PowerSample>, HistoryError> {
        let samples = match source {
            SampleSource::Generator => &self.generator,
            SampleSource::Grid => &self.grid,
        };

        Ok(samples
            .iter()
            .filter(|sample| sample.timestamp >= since)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::FileSampleArchive;
    use crate::domain::replay::SampleHistory;
    use crate::domain::sample::SampleSource;

    fn write_capture(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("capture.json");
        std::fs::write(&path, content).expect("capture file should be writable");
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn loads_both_feeds_from_a_capture_file() {
        let (_dir, path) = write_capture(
            r#"{
                "generator": [
                    { "recorded_at": "2026-03-14T09:00:00Z", "watts": 812.5 },
                    { "recorded_at": "2026-03-14T09:00:10Z", "watts": 830.0 }
                ],
                "grid": [
                    { "recorded_at": "2026-03-14T09:00:05Z", "watts": -150.0 }
                ]
            }"#,
        );

        let archive = FileSampleArchive::from_file(&path).expect("capture should load");
        let since = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();

        let generator = archive
            .samples_since(SampleSource::Generator, since)
            .expect("generator feed should be readable");
        let grid = archive
            .samples_since(SampleSource::Grid, since)
            .expect("grid feed should be readable");

        assert_eq!(generator.len(), 2);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].watts, -150.0);
    }

    #[test]
    fn filters_events_before_the_boundary() {
        let (_dir, path) = write_capture(
            r#"{
                "generator": [
                    { "recorded_at": "2026-03-13T23:59:00Z", "watts": 10.0 },
                    { "recorded_at": "2026-03-14T00:01:00Z", "watts": 20.0 }
                ]
            }"#,
        );

        let archive = FileSampleArchive::from_file(&path).expect("capture should load");
        let since = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();

        let generator = archive
            .samples_since(SampleSource::Generator, since)
            .expect("generator feed should be readable");

        assert_eq!(generator.len(), 1);
        assert_eq!(generator[0].watts, 20.0);
    }

    #[test]
    fn missing_feed_defaults_to_empty() {
        let (_dir, path) = write_capture(r#"{ "generator": [] }"#);

        let archive = FileSampleArchive::from_file(&path).expect("capture should load");
        let grid = archive
            .samples_since(
                SampleSource::Grid,
                Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap(),
            )
            .expect("grid feed should be readable");

        assert!(grid.is_empty());
    }

    #[test]
    fn capture_replay_matches_database_replay() {
        use crate::adapters::db::{
            NewSampleRecord, SqliteSampleArchive, insert_sample, open_connection, run_migrations,
        };
        use crate::domain::replay::collect_since;
        use std::sync::{Arc, Mutex};

        let events = [
            ("generator", "2026-03-14T09:00:00.000Z", 1000.0),
            ("grid", "2026-03-14T09:00:10.000Z", -200.0),
            ("generator", "2026-03-14T09:00:20.000Z", 800.0),
        ];

        let (_dir, path) = write_capture(
            r#"{
                "generator": [
                    { "recorded_at": "2026-03-14T09:00:00.000Z", "watts": 1000.0 },
                    { "recorded_at": "2026-03-14T09:00:20.000Z", "watts": 800.0 }
                ],
                "grid": [
                    { "recorded_at": "2026-03-14T09:00:10.000Z", "watts": -200.0 }
                ]
            }"#,
        );
        let capture = FileSampleArchive::from_file(&path).expect("capture should load");

        let db_dir = tempfile::tempdir().expect("tempdir should be created");
        let db_path = db_dir.path().join("parity.sqlite");
        let mut connection = open_connection(db_path.to_string_lossy().as_ref())
            .expect("db connection should open");
        run_migrations(&mut connection).expect("migrations should succeed");
        for (source, at, watts) in events {
            insert_sample(
                &connection,
                &NewSampleRecord {
                    source: source.to_string(),
                    recorded_at: at.to_string(),
                    watts,
                    created_at: at.to_string(),
                },
            )
            .expect("insert should succeed");
        }
        let archive = SqliteSampleArchive::new(Arc::new(Mutex::new(connection)));

        let since = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();
        let from_capture = collect_since(&capture, since).expect("capture should be collectable");
        let from_db = collect_since(&archive, since).expect("archive should be collectable");

        assert_eq!(from_capture, from_db);
    }

    #[test]
    fn rejects_unparsable_timestamps() {
        let (_dir, path) = write_capture(
            r#"{ "generator": [{ "recorded_at": "not-a-time", "watts": 1.0 }] }"#,
        );

        assert!(FileSampleArchive::from_file(&path).is_err());
    }
}
