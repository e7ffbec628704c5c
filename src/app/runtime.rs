use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{
    ArchiveApiState, SensorApiState, configure_archive_routes, configure_sensor_routes, health,
};
use crate::adapters::db::{self, SqliteSampleArchive, timestamp_to_rfc3339};
use crate::adapters::history_file::FileSampleArchive;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::{AccumulatorService, SampleCommandHandler, SqliteSampleService};
use crate::domain::replay;
use crate::domain::sample::SourceResolver;

/// Which HTTP surface a binary exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Combined,
    SensorOnly,
    ArchiveOnly,
}

pub fn run(config: AppConfig, surface: Surface) -> Result<(), AppError> {
    let mut connection = db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    db::run_migrations(&mut connection).map_err(AppError::database_init)?;
    let shared_connection = Arc::new(Mutex::new(connection));

    let samples = SqliteSampleService::new(Arc::clone(&shared_connection));

    if config.retention_days > 0 {
        let boundary = timestamp_to_rfc3339(
            replay::local_midnight() - chrono::Duration::days(i64::from(config.retention_days)),
        );
        let pruned = samples
            .delete_samples_before(&boundary)
            .map_err(AppError::database_init)?;
        if pruned > 0 {
            tracing::info!(pruned, boundary = %boundary, "pruned expired samples");
        }
    }

    let accumulator = AccumulatorService::new(SourceResolver::new(
        config.generator_source_id.clone(),
        config.grid_source_id.clone(),
    ));

    // Backfill runs to completion before the server binds, so every live
    // sample is ordered after the replayed history.
    if surface != Surface::ArchiveOnly {
        let since = replay::local_midnight();
        let summary = match &config.capture_file {
            Some(path) => {
                tracing::info!(path = %path, "replaying from capture file");
                let archive = FileSampleArchive::from_file(path).map_err(AppError::replay)?;
                accumulator
                    .replay(&archive, since)
                    .map_err(AppError::replay)?
            }
            None => {
                let archive = SqliteSampleArchive::new(Arc::clone(&shared_connection));
                accumulator
                    .replay(&archive, since)
                    .map_err(AppError::replay)?
            }
        };
        tracing::info!(
            applied = summary.applied,
            gap_guarded = summary.gap_guarded,
            rejected = summary.rejected,
            failed = summary.failed,
            "backfill replay completed"
        );
    }

    let sensor_state = SensorApiState {
        accumulator,
        samples: samples.clone(),
        sensor_name: config.sensor_name.clone(),
        sensor_icon: config.sensor_icon.clone(),
    };
    let archive_state = ArchiveApiState {
        sample_queries: samples,
    };

    tracing::info!(bind = %config.http_bind, ?surface, "http server starting");

    let bind = config.http_bind.clone();
    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let app = App::new();
            let app = match surface {
                Surface::Combined => app
                    .app_data(web::Data::new(sensor_state.clone()))
                    .app_data(web::Data::new(archive_state.clone()))
                    .configure(configure_sensor_routes)
                    .configure(configure_archive_routes),
                Surface::SensorOnly => app
                    .app_data(web::Data::new(sensor_state.clone()))
                    .configure(configure_sensor_routes),
                Surface::ArchiveOnly => app
                    .app_data(web::Data::new(archive_state.clone()))
                    .service(health)
                    .configure(configure_archive_routes),
            };
            app.wrap(Cors::permissive())
        })
        .bind(&bind)?
        .run()
        .await
    });

    server_result.map_err(AppError::runtime)
}
