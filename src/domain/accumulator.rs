use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::sample::{PowerSample, SampleSource};

/// Elapsed intervals outside `[0, GAP_LIMIT_SECONDS]` are considered
/// unreliable and contribute nothing to the integrated totals.
pub const GAP_LIMIT_SECONDS: f64 = 600.0;

const WS_PER_KWH: f64 = 3_600_000.0;

/// Running totals and instantaneous readings for one generator/grid pair.
///
/// Owned exclusively by one [`EnergyAccumulator`] and mutated only through
/// [`EnergyAccumulator::process_sample`]. All energy totals cover the current
/// calendar day; they are zeroed on the first sample and on every day change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccumulatorState {
    pub generator_w: f64,
    pub net_w: f64,
    pub home_w: f64,
    pub generated_kwh: f64,
    pub feed_in_kwh: f64,
    pub feed_out_kwh: f64,
    pub self_consumed_kwh: f64,
    pub total_consumed_kwh: f64,
    pub self_consumed_per: f64,
    pub home_from_solar_per: f64,
    pub last_updated_gen: Option<DateTime<Utc>>,
    pub last_updated_net: Option<DateTime<Utc>>,
    pub last_updated_calc: Option<DateTime<Utc>>,
    /// Sticky: set on the first failed integration step, never cleared.
    pub degraded: bool,
}

/// Context for an implausible elapsed interval, reported so the shell can log
/// it the way the caller wants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapAnomaly {
    pub elapsed_seconds: f64,
    pub prior_generator_w: f64,
    pub sample_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub sample_index: u64,
    /// The first sample ever, or the first sample of a new calendar day.
    pub reset: bool,
    /// Seconds actually integrated over (zero on reset or gap guard).
    pub elapsed_seconds: f64,
    pub gap: Option<GapAnomaly>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    #[error("accumulated energy turned non-finite")]
    NonFiniteAccumulator,
}

/// Explicit per-call result of the engine; nothing ever propagates past the
/// `process_sample` boundary as a raised error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Sample value was not a finite number; state is untouched.
    Rejected,
    Applied(StepReport),
    /// Integration failed and was rolled back. `first` is true exactly once
    /// per engine lifetime so the caller can log without flooding.
    Failed { error: StepError, first: bool },
}

#[derive(Debug, Clone, Default)]
pub struct EnergyAccumulator {
    state: AccumulatorState,
    samples_seen: u64,
}

impl EnergyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Feeds one sample through the zero-order-hold integrator.
    ///
    /// Power is assumed constant at its last known value for the whole
    /// elapsed interval; the incoming value only takes effect from this
    /// sample's timestamp onwards. Replayed history and live samples take
    /// the exact same path, so both delivery modes produce identical state.
    pub fn process_sample(&mut self, sample: &PowerSample) -> StepOutcome {
        if !sample.watts.is_finite() {
            return StepOutcome::Rejected;
        }

        self.samples_seen += 1;

        // Integrate on a scratch copy and commit only a finite result, so a
        // failed step leaves everything except the degraded flag untouched.
        let mut next = self.state.clone();
        let report = integrate(&mut next, sample, self.samples_seen);

        if finite(&next) {
            self.state = next;
            StepOutcome::Applied(report)
        } else {
            let first = !self.state.degraded;
            self.state.degraded = true;
            StepOutcome::Failed {
                error: StepError::NonFiniteAccumulator,
                first,
            }
        }
    }
}

fn integrate(state: &mut AccumulatorState, sample: &PowerSample, sample_index: u64) -> StepReport {
    let generator_w_prev = state.generator_w;
    let net_w_prev = state.net_w;

    let (mut elapsed, reset) = match state.last_updated_calc {
        None => {
            zero_totals(state);
            (0.0, true)
        }
        Some(prior) if sample.timestamp.date_naive() != prior.date_naive() => {
            zero_totals(state);
            (0.0, true)
        }
        Some(prior) => (
            (sample.timestamp - prior).num_milliseconds() as f64 / 1_000.0,
            false,
        ),
    };

    let mut gap = None;
    if elapsed > GAP_LIMIT_SECONDS || elapsed < 0.0 {
        gap = Some(GapAnomaly {
            elapsed_seconds: elapsed,
            prior_generator_w: generator_w_prev,
            sample_index,
        });
        elapsed = 0.0;
    }

    state.generated_kwh += generator_w_prev * elapsed / WS_PER_KWH;

    if net_w_prev > 0.0 {
        // importing: everything the generator produced stayed in the house
        state.feed_out_kwh += net_w_prev * elapsed / WS_PER_KWH;
        state.self_consumed_kwh += generator_w_prev * elapsed / WS_PER_KWH;
    } else if net_w_prev < 0.0 {
        // exporting: the fed-in share did not serve the house
        let exported = -net_w_prev;
        state.feed_in_kwh += exported * elapsed / WS_PER_KWH;
        state.self_consumed_kwh += (generator_w_prev - exported) * elapsed / WS_PER_KWH;
    }
    // net_w_prev == 0.0 exactly attributes nothing for this interval; see
    // tests::interval_with_exactly_zero_net_power_attributes_nothing

    state.self_consumed_per = if state.generated_kwh != 0.0 {
        state.self_consumed_kwh / state.generated_kwh * 100.0
    } else {
        0.0
    };

    state.total_consumed_kwh = state.generated_kwh - state.feed_in_kwh + state.feed_out_kwh;

    state.home_from_solar_per =
        if state.self_consumed_kwh != 0.0 && state.total_consumed_kwh != 0.0 {
            state.self_consumed_kwh / state.total_consumed_kwh * 100.0
        } else {
            0.0
        };

    match sample.source {
        SampleSource::Generator => {
            state.last_updated_gen = Some(sample.timestamp);
            state.generator_w = sample.watts;
        }
        SampleSource::Grid => {
            state.last_updated_net = Some(sample.timestamp);
            state.net_w = sample.watts;
        }
    }

    state.home_w = state.generator_w + state.net_w;
    state.last_updated_calc = Some(sample.timestamp);

    StepReport {
        sample_index,
        reset,
        elapsed_seconds: elapsed,
        gap,
    }
}

fn zero_totals(state: &mut AccumulatorState) {
    state.generated_kwh = 0.0;
    state.feed_in_kwh = 0.0;
    state.feed_out_kwh = 0.0;
    state.self_consumed_kwh = 0.0;
    state.total_consumed_kwh = 0.0;
}

fn finite(state: &AccumulatorState) -> bool {
    [
        state.generator_w,
        state.net_w,
        state.home_w,
        state.generated_kwh,
        state.feed_in_kwh,
        state.feed_out_kwh,
        state.self_consumed_kwh,
        state.total_consumed_kwh,
        state.self_consumed_per,
        state.home_from_solar_per,
    ]
    .iter()
    .all(|value| value.is_finite())
}
