use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::domain::accumulator::AccumulatorState;

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Display-ready projection of an [`AccumulatorState`]: watt and kWh fields
/// rounded to two decimals, percentages clamped into `[0, 100]`, timestamps
/// rendered as local-time strings and omitted when unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRecord {
    #[serde(rename = "Solar_W")]
    pub solar_w: f64,
    #[serde(rename = "Solar_generated_kWh")]
    pub solar_generated_kwh: f64,
    #[serde(rename = "Solar_to_home_kWh")]
    pub solar_to_home_kwh: f64,
    #[serde(rename = "Solar_to_home_pct")]
    pub solar_to_home_pct: f64,
    #[serde(rename = "Solar_to_grid_kWh")]
    pub solar_to_grid_kwh: f64,
    #[serde(rename = "Grid_W")]
    pub grid_w: f64,
    #[serde(rename = "Grid_to_home_kWh")]
    pub grid_to_home_kwh: f64,
    #[serde(rename = "Home_W")]
    pub home_w: f64,
    #[serde(rename = "Home_total_consumed_kWh")]
    pub home_total_consumed_kwh: f64,
    #[serde(rename = "Home_from_Solar_pct")]
    pub home_from_solar_pct: f64,
    #[serde(rename = "Solar_last_updated", skip_serializing_if = "Option::is_none")]
    pub solar_last_updated: Option<String>,
    #[serde(rename = "Grid_last_updated", skip_serializing_if = "Option::is_none")]
    pub grid_last_updated: Option<String>,
}

impl DisplayRecord {
    pub fn from_state(state: &AccumulatorState) -> Self {
        Self {
            solar_w: round2(state.generator_w),
            solar_generated_kwh: round2(state.generated_kwh),
            solar_to_home_kwh: round2(state.self_consumed_kwh),
            solar_to_home_pct: clamp_pct(state.self_consumed_per),
            solar_to_grid_kwh: round2(state.feed_in_kwh),
            grid_w: round2(state.net_w),
            grid_to_home_kwh: round2(state.feed_out_kwh),
            home_w: round2(state.home_w),
            home_total_consumed_kwh: round2(state.total_consumed_kwh),
            home_from_solar_pct: clamp_pct(state.home_from_solar_per),
            solar_last_updated: local_time_string(state.last_updated_gen),
            grid_last_updated: local_time_string(state.last_updated_net),
        }
    }
}

/// The single scalar the sensor exposes: self-consumption percentage, one
/// decimal, never above 100.
pub fn primary_value(state: &AccumulatorState) -> f64 {
    let rounded = (state.self_consumed_per * 10.0).round() / 10.0;
    rounded.min(100.0)
}

/// Primary value as presented: the literal `"error"` marker while the engine
/// is degraded, the numeric percentage otherwise.
pub fn primary_state(state: &AccumulatorState) -> Value {
    if state.degraded {
        Value::from("error")
    } else {
        Value::from(primary_value(state))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_pct(value: f64) -> f64 {
    round2(value).clamp(0.0, 100.0)
}

fn local_time_string(timestamp: Option<DateTime<Utc>>) -> Option<String> {
    timestamp.map(|instant| {
        instant
            .with_timezone(&Local)
            .format(LOCAL_TIME_FORMAT)
            .to_string()
    })
}
