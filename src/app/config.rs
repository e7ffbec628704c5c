use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub generator_source_id: String,
    pub grid_source_id: String,
    pub sensor_name: String,
    pub sensor_icon: String,
    pub db_path: String,
    pub http_bind: String,
    /// Archived samples older than this many days are pruned at startup;
    /// zero disables pruning.
    pub retention_days: u32,
    /// When set, the startup backfill replays from this JSON capture file
    /// instead of the database archive.
    pub capture_file: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let generator_source_id = required(&lookup, "GENERATOR_SOURCE_ID")?;
        let grid_source_id = required(&lookup, "GRID_SOURCE_ID")?;

        if generator_source_id == grid_source_id {
            return Err(AppError::config(
                "GENERATOR_SOURCE_ID and GRID_SOURCE_ID must differ",
            ));
        }

        Ok(Self {
            generator_source_id,
            grid_source_id,
            sensor_name: lookup("SENSOR_NAME")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "Solar self-consumption".to_string()),
            sensor_icon: lookup("SENSOR_ICON")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "mdi:solar-power".to_string()),
            db_path: lookup("DB_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "/var/lib/solarshare/solarshare.db".to_string()),
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            retention_days: parse_or_default(&lookup, "RETENTION_DAYS", 7_u32)?,
            capture_file: lookup("CAPTURE_FILE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    fn minimal(key: &str) -> Option<String> {
        match key {
            "GENERATOR_SOURCE_ID" => Some("sensor.solar_power".to_string()),
            "GRID_SOURCE_ID" => Some("sensor.grid_power".to_string()),
            _ => None,
        }
    }

    #[test]
    fn rejects_missing_source_ids() {
        let result = AppConfig::from_lookup(|_| None);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: GENERATOR_SOURCE_ID is required"
        );
    }

    #[test]
    fn rejects_identical_source_ids() {
        let result = AppConfig::from_lookup(|key| match key {
            "GENERATOR_SOURCE_ID" | "GRID_SOURCE_ID" => Some("sensor.same".to_string()),
            _ => None,
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: GENERATOR_SOURCE_ID and GRID_SOURCE_ID must differ"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(minimal).expect("config should be valid");

        assert_eq!(result.generator_source_id, "sensor.solar_power");
        assert_eq!(result.grid_source_id, "sensor.grid_power");
        assert_eq!(result.sensor_name, "Solar self-consumption");
        assert_eq!(result.sensor_icon, "mdi:solar-power");
        assert_eq!(result.db_path, "/var/lib/solarshare/solarshare.db");
        assert_eq!(result.http_bind, "0.0.0.0:8080");
        assert_eq!(result.retention_days, 7);
        assert_eq!(result.capture_file, None);
    }

    #[test]
    fn blank_capture_file_counts_as_unset() {
        let result = AppConfig::from_lookup(|key| match key {
            "CAPTURE_FILE" => Some("   ".to_string()),
            other => minimal(other),
        })
        .expect("config should be valid");

        assert_eq!(result.capture_file, None);
    }

    #[test]
    fn rejects_invalid_retention_value() {
        let result = AppConfig::from_lookup(|key| match key {
            "RETENTION_DAYS" => Some("abc".to_string()),
            other => minimal(other),
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: RETENTION_DAYS must be a valid number"
        );
    }
}
