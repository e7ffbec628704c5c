use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Which of the two configured feeds a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Generator,
    Grid,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleSource::Generator => "generator",
            SampleSource::Grid => "grid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generator" => Some(SampleSource::Generator),
            "grid" => Some(SampleSource::Grid),
            _ => None,
        }
    }
}

/// One validated power observation. Raw values that are "unknown" or fail to
/// parse never construct a `PowerSample`; naive timestamps are interpreted as
/// UTC during construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub source: SampleSource,
    pub timestamp: DateTime<Utc>,
    pub watts: f64,
}

impl PowerSample {
    pub fn new(source: SampleSource, timestamp: DateTime<Utc>, watts: f64) -> Self {
        Self {
            source,
            timestamp,
            watts,
        }
    }

    pub fn from_parts(
        resolver: &SourceResolver,
        source_id: &str,
        timestamp_raw: &str,
        value_raw: &str,
    ) -> Result<Self, SampleParseError> {
        let source = resolver
            .resolve(source_id)
            .ok_or_else(|| SampleParseError::UnknownSourceId(source_id.to_string()))?;
        let timestamp = parse_timestamp(timestamp_raw)?;
        let watts = parse_watts(value_raw)?;

        Ok(Self {
            source,
            timestamp,
            watts,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleParseError {
    #[error("sample source id is not configured: {0}")]
    UnknownSourceId(String),
    #[error("sample value is not a number: {0}")]
    NonNumericValue(String),
    #[error("sample timestamp is not parseable: {0}")]
    InvalidTimestamp(String),
}

/// Resolves the two configured source identifiers to a tagged variant once at
/// ingestion, so the engine never compares identifier strings per call.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    generator_id: String,
    grid_id: String,
}

impl SourceResolver {
    pub fn new(generator_id: impl Into<String>, grid_id: impl Into<String>) -> Self {
        Self {
            generator_id: generator_id.into(),
            grid_id: grid_id.into(),
        }
    }

    pub fn resolve(&self, source_id: &str) -> Option<SampleSource> {
        if source_id == self.generator_id {
            Some(SampleSource::Generator)
        } else if source_id == self.grid_id {
            Some(SampleSource::Grid)
        } else {
            None
        }
    }
}

pub fn parse_watts(raw: &str) -> Result<f64, SampleParseError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("unknown") {
        return Err(SampleParseError::NonNumericValue(raw.to_string()));
    }

    trimmed
        .parse::<f64>()
        .map_err(|_| SampleParseError::NonNumericValue(raw.to_string()))
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SampleParseError> {
    let trimmed = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    // timestamps without a timezone are interpreted as UTC
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(SampleParseError::InvalidTimestamp(raw.to_string()))
}
