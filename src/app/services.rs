use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db::{self, DbError, NewSampleRecord, SampleRecord};
use crate::domain::accumulator::{AccumulatorState, EnergyAccumulator, StepOutcome};
use crate::domain::replay::{self, HistoryError, ReplaySummary, SampleHistory};
use crate::domain::sample::{PowerSample, SampleParseError, SourceResolver};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("accumulator lock poisoned")]
    AccumulatorLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
    #[error("history replay failed: {0}")]
    History(#[from] HistoryError),
}

pub trait SampleQueryHandler {
    fn get_schema_version(&self) -> Result<u32, ServiceError>;
    fn count_samples(&self, source: &str) -> Result<i64, ServiceError>;
    fn list_recent_samples(
        &self,
        source: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SampleRecord>, ServiceError>;
    fn get_latest_sample(&self) -> Result<Option<SampleRecord>, ServiceError>;
}

pub trait SampleCommandHandler {
    fn insert_sample(&self, new_sample: &NewSampleRecord) -> Result<i64, ServiceError>;
    fn delete_samples_before(&self, boundary_exclusive: &str) -> Result<usize, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteSampleService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSampleService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl SampleQueryHandler for SqliteSampleService {
    fn get_schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }

    fn count_samples(&self, source: &str) -> Result<i64, ServiceError> {
        self.with_connection(|connection| db::count_samples(connection, source))
    }

    fn list_recent_samples(
        &self,
        source: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SampleRecord>, ServiceError> {
        self.with_connection(|connection| db::list_recent_samples(connection, source, limit))
    }

    fn get_latest_sample(&self) -> Result<Option<SampleRecord>, ServiceError> {
        self.with_connection(db::latest_sample)
    }
}

impl SampleCommandHandler for SqliteSampleService {
    fn insert_sample(&self, new_sample: &NewSampleRecord) -> Result<i64, ServiceError> {
        self.with_connection(|connection| db::insert_sample(connection, new_sample))
    }

    fn delete_samples_before(&self, boundary_exclusive: &str) -> Result<usize, ServiceError> {
        self.with_connection(|connection| db::delete_samples_before(connection, boundary_exclusive))
    }
}

/// What happened to one raw sample at the service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The sample reached the engine; the parsed form is returned so the
    /// caller can archive it.
    Accumulated {
        sample: PowerSample,
        outcome: StepOutcome,
    },
    /// The sample never reached the engine (unknown value, bad timestamp,
    /// unconfigured source id).
    Dropped(SampleParseError),
}

/// Serializes all engine access and owns the logging policy around it: gap
/// anomalies are warned per occurrence, degradation is reported exactly once.
#[derive(Clone)]
pub struct AccumulatorService {
    resolver: SourceResolver,
    engine: Arc<Mutex<EnergyAccumulator>>,
}

impl AccumulatorService {
    pub fn new(resolver: SourceResolver) -> Self {
        Self {
            resolver,
            engine: Arc::new(Mutex::new(EnergyAccumulator::new())),
        }
    }

    pub fn snapshot(&self) -> Result<AccumulatorState, ServiceError> {
        let engine = self
            .engine
            .lock()
            .map_err(|_| ServiceError::AccumulatorLockPoisoned)?;
        Ok(engine.state().clone())
    }

    /// Parses one raw delivery and feeds it through the engine. Samples with
    /// an unknown or unparsable value are dropped without touching any state,
    /// and without emitting an event.
    pub fn ingest(
        &self,
        source_id: &str,
        timestamp_raw: &str,
        value_raw: &str,
    ) -> Result<IngestOutcome, ServiceError> {
        match PowerSample::from_parts(&self.resolver, source_id, timestamp_raw, value_raw) {
            Ok(sample) => {
                let outcome = self.apply(&sample)?;
                Ok(IngestOutcome::Accumulated { sample, outcome })
            }
            Err(error) => {
                if let SampleParseError::UnknownSourceId(source_id) = &error {
                    tracing::warn!(source_id = %source_id, "sample for unconfigured source id dropped");
                }
                Ok(IngestOutcome::Dropped(error))
            }
        }
    }

    pub fn apply(&self, sample: &PowerSample) -> Result<StepOutcome, ServiceError> {
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| ServiceError::AccumulatorLockPoisoned)?;

        let outcome = engine.process_sample(sample);

        match outcome {
            StepOutcome::Applied(report) => {
                if let Some(gap) = report.gap {
                    tracing::warn!(
                        elapsed_seconds = gap.elapsed_seconds,
                        prior_generator_w = gap.prior_generator_w,
                        sample_index = gap.sample_index,
                        "implausible sample interval, integration contribution dropped"
                    );
                }
            }
            StepOutcome::Failed { error, first: true } => {
                tracing::error!(
                    error = %error,
                    "accumulator degraded, suppressing further reports for this instance"
                );
            }
            StepOutcome::Failed { first: false, .. } | StepOutcome::Rejected => {}
        }

        Ok(outcome)
    }

    /// Backfill: feeds the merged, time-sorted archive of both feeds through
    /// the engine. Running this to completion before admitting live samples
    /// makes bulk replay and live delivery indistinguishable to the engine.
    pub fn replay<H: SampleHistory>(
        &self,
        history: &H,
        since: DateTime<Utc>,
    ) -> Result<ReplaySummary, ServiceError> {
        let samples = replay::collect_since(history, since)?;

        let mut summary = ReplaySummary::default();
        for sample in &samples {
            match self.apply(sample)? {
                StepOutcome::Applied(report) => {
                    summary.applied += 1;
                    if report.gap.is_some() {
                        summary.gap_guarded += 1;
                    }
                }
                StepOutcome::Rejected => summary.rejected += 1,
                StepOutcome::Failed { .. } => summary.failed += 1,
            }
        }

        Ok(summary)
    }
}
