use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use thiserror::Error;

use crate::domain::sample::{PowerSample, SampleSource};

#[derive(Debug, Error)]
#[error("sample history query failed: {0}")]
pub struct HistoryError(pub String);

/// Source of archived samples for the backfill replay. Implementations may
/// return the samples in any order; the orchestrator sorts.
pub trait SampleHistory {
    fn samples_since(
        &self,
        source: SampleSource,
        since: DateTime<Utc>,
    ) -> Result<Vec<PowerSample>, HistoryError>;
}

/// Tally of one backfill replay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    pub applied: usize,
    pub gap_guarded: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl ReplaySummary {
    pub fn total(&self) -> usize {
        self.applied + self.rejected + self.failed
    }
}

/// Retrieves the archived samples of both feeds since `since`, merged and
/// sorted ascending by timestamp, ready to be fed through the engine in the
/// exact order live delivery would have used.
pub fn collect_since<H: SampleHistory>(
    history: &H,
    since: DateTime<Utc>,
) -> Result<Vec<PowerSample>, HistoryError> {
    let mut samples = history.samples_since(SampleSource::Generator, since)?;
    samples.extend(history.samples_since(SampleSource::Grid, since)?);
    samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(samples)
}

/// Start of the current local calendar day, as a UTC instant.
pub fn local_midnight() -> DateTime<Utc> {
    local_midnight_of(Local::now())
}

pub fn local_midnight_of(now: DateTime<Local>) -> DateTime<Utc> {
    let start_of_day = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&start_of_day).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // a day whose first instant does not exist locally (DST edge)
        None => Utc.from_utc_datetime(&start_of_day),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::{HistoryError, SampleHistory, collect_since};
    use crate::domain::sample::{PowerSample, SampleSource};

    struct FakeHistory {
        generator: Vec<PowerSample>,
        grid: Vec<PowerSample>,
    }

    impl SampleHistory for FakeHistory {
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

    fn ts(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, seconds).unwrap()
    }

    #[test]
    fn merges_both_feeds_sorted_by_timestamp() {
        let history = FakeHistory {
            generator: vec![
                PowerSample::new(SampleSource::Generator, ts(30), 900.0),
                PowerSample::new(SampleSource::Generator, ts(10), 1000.0),
            ],
            grid: vec![PowerSample::new(SampleSource::Grid, ts(20), -150.0)],
        };

        let merged = collect_since(&history, ts(0)).expect("history should be collectable");

        let stamps: Vec<_> = merged.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![ts(10), ts(20), ts(30)]);
        assert_eq!(merged[1].source, SampleSource::Grid);
    }

    #[test]
    fn respects_the_since_boundary() {
        let history = FakeHistory {
            generator: vec![
                PowerSample::new(SampleSource::Generator, ts(5), 500.0),
                PowerSample::new(SampleSource::Generator, ts(40), 600.0),
            ],
            grid: vec![],
        };

        let merged = collect_since(&history, ts(10)).expect("history should be collectable");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].timestamp, ts(40));
    }

    #[test]
    fn one_empty_feed_still_replays_the_other() {
        let history = FakeHistory {
            generator: vec![],
            grid: vec![PowerSample::new(SampleSource::Grid, ts(20), 80.0)],
        };

        let merged = collect_since(&history, ts(0)).expect("history should be collectable");

        assert_eq!(merged.len(), 1);
    }
}
