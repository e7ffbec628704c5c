use actix_web::{HttpResponse, Responder, get, post, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::db::{NewSampleRecord, SampleRecord, timestamp_to_rfc3339};
use crate::app::services::{
    AccumulatorService, IngestOutcome, SampleCommandHandler, SampleQueryHandler, ServiceError,
    SqliteSampleService,
};
use crate::domain::accumulator::StepOutcome;
use crate::domain::display::{DisplayRecord, primary_state};
use crate::domain::sample::SampleSource;

/// State for the live sensor surface: ingestion, accumulator snapshot.
#[derive(Clone)]
pub struct SensorApiState {
    pub accumulator: AccumulatorService,
    pub samples: SqliteSampleService,
    pub sensor_name: String,
    pub sensor_icon: String,
}

/// State for the read-only archive surface.
#[derive(Clone)]
pub struct ArchiveApiState {
    pub sample_queries: SqliteSampleService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSubmission {
    pub source_id: String,
    pub timestamp: String,
    /// Raw reading; a JSON string or number. "unknown" and unparsable
    /// values are dropped without touching the accumulator.
    pub value: Value,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_guarded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStateResponse {
    pub name: String,
    pub icon: String,
    pub unit_of_measurement: &'static str,
    pub state: Value,
    pub degraded: bool,
    pub attributes: DisplayRecord,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SampleResponse {
    pub id: i64,
    pub source: String,
    pub recorded_at: String,
    pub watts: f64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub source: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsDbResponse {
    pub schema_version: u32,
    pub generator_samples_count: i64,
    pub grid_samples_count: i64,
    pub latest_sample: Option<SampleResponse>,
}

pub fn configure_sensor_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(submit_sample_endpoint)
        .service(get_sensor_state_endpoint);
}

pub fn configure_archive_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_samples_endpoint)
        .service(get_db_diagnostics_endpoint);
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[post("/samples")]
async fn submit_sample_endpoint(
    state: web::Data<SensorApiState>,
    submission: web::Json<SampleSubmission>,
) -> impl Responder {
    let value_raw = raw_value_string(&submission.value);

    let outcome = match state
        .accumulator
        .ingest(&submission.source_id, &submission.timestamp, &value_raw)
    {
        Ok(outcome) => outcome,
        Err(error) => return service_error_response(error),
    };

    match outcome {
        IngestOutcome::Accumulated { sample, outcome } => match outcome {
            StepOutcome::Applied(report) => {
                let new_sample = NewSampleRecord {
                    source: sample.source.as_str().to_string(),
                    recorded_at: timestamp_to_rfc3339(sample.timestamp),
                    watts: sample.watts,
                    created_at: timestamp_to_rfc3339(Utc::now()),
                };
                if let Err(error) = state.samples.insert_sample(&new_sample) {
                    return service_error_response(error);
                }

                HttpResponse::Ok().json(IngestResponse {
                    status: "applied",
                    reset: Some(report.reset),
                    gap_guarded: Some(report.gap.is_some()),
                    reason: None,
                })
            }
            StepOutcome::Rejected => HttpResponse::Ok().json(IngestResponse {
                status: "rejected",
                reset: None,
                gap_guarded: None,
                reason: Some("value is not a finite number".to_string()),
            }),
            StepOutcome::Failed { error, .. } => HttpResponse::Ok().json(IngestResponse {
                status: "failed",
                reset: None,
                gap_guarded: None,
                reason: Some(error.to_string()),
            }),
        },
        IngestOutcome::Dropped(error) => HttpResponse::Ok().json(IngestResponse {
            status: "dropped",
            reset: None,
            gap_guarded: None,
            reason: Some(error.to_string()),
        }),
    }
}

#[get("/state")]
async fn get_sensor_state_endpoint(state: web::Data<SensorApiState>) -> impl Responder {
    let snapshot = match state.accumulator.snapshot() {
        Ok(snapshot) => snapshot,
        Err(error) => return service_error_response(error),
    };

    HttpResponse::Ok().json(SensorStateResponse {
        name: state.sensor_name.clone(),
        icon: state.sensor_icon.clone(),
        unit_of_measurement: "%",
        state: primary_state(&snapshot),
        degraded: snapshot.degraded,
        attributes: DisplayRecord::from_state(&snapshot),
    })
}

#[get("/samples")]
async fn list_samples_endpoint(
    state: web::Data<ArchiveApiState>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let source = match query.source.as_deref() {
        None => None,
        Some(raw) => match SampleSource::parse(raw) {
            Some(source) => Some(source),
            None => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("unknown source: {raw}")
                }));
            }
        },
    };

    match state
        .sample_queries
        .list_recent_samples(source.map(|s| s.as_str()), limit)
    {
        Ok(samples) => {
            let mapped: Vec<SampleResponse> = samples.into_iter().map(sample_response).collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

#[get("/diagnostics/db")]
async fn get_db_diagnostics_endpoint(state: web::Data<ArchiveApiState>) -> impl Responder {
    let schema_version = match state.sample_queries.get_schema_version() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let generator_samples_count = match state
        .sample_queries
        .count_samples(SampleSource::Generator.as_str())
    {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let grid_samples_count = match state
        .sample_queries
        .count_samples(SampleSource::Grid.as_str())
    {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let latest_sample = match state.sample_queries.get_latest_sample() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };

    HttpResponse::Ok().json(DiagnosticsDbResponse {
        schema_version,
        generator_samples_count,
        grid_samples_count,
        latest_sample: latest_sample.map(sample_response),
    })
}

fn sample_response(record: SampleRecord) -> SampleResponse {
    SampleResponse {
        id: record.id,
        source: record.source,
        recorded_at: record.recorded_at,
        watts: record.watts,
        created_at: record.created_at,
    }
}

fn raw_value_string(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::AccumulatorLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "accumulator lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
        ServiceError::History(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("history query failed: {error}")
            }))
        }
    }
}
