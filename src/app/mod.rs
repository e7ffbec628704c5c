mod config;
mod error;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    bootstrap(runtime::Surface::Combined)
}

pub fn run_service() -> Result<(), AppError> {
    bootstrap(runtime::Surface::SensorOnly)
}

pub fn run_api() -> Result<(), AppError> {
    bootstrap(runtime::Surface::ArchiveOnly)
}

fn bootstrap(surface: runtime::Surface) -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        generator_source_id = %config.generator_source_id,
        grid_source_id = %config.grid_source_id,
        sensor_name = %config.sensor_name,
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        retention_days = config.retention_days,
        "application bootstrap initialized"
    );

    runtime::run(config, surface)
}
