use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub media: MediaConfig,
    pub import: ImportConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("CELIAQUIA_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let media_root = env::var("CELIAQUIA_MEDIA_ROOT").unwrap_or_else(|_| "media".to_string());
        let data_dir = env::var("CELIAQUIA_DATA_DIR").unwrap_or_else(|_| ".celiaquia".to_string());

        let tamano_lote = env::var("CELIAQUIA_TAMANO_LOTE")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidBatchSize)?;
        if tamano_lote == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let presupuesto_ms = env::var("CELIAQUIA_IO_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidIoBudget)?;

        let log_level = env::var("CELIAQUIA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            media: MediaConfig {
                root: PathBuf::from(media_root),
                data_dir: PathBuf::from(data_dir),
            },
            import: ImportConfig {
                tamano_lote,
                presupuesto_io: Duration::from_millis(presupuesto_ms),
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

/// Where uploaded files and the state snapshot live.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub data_dir: PathBuf,
}

/// Importer knobs: batch size for legajo inserts and the external I/O
/// time budget.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub tamano_lote: usize,
    pub presupuesto_io: Duration,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidBatchSize,
    InvalidIoBudget,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBatchSize => {
                write!(f, "CELIAQUIA_TAMANO_LOTE must be a positive integer")
            }
            ConfigError::InvalidIoBudget => {
                write!(f, "CELIAQUIA_IO_TIMEOUT_MS must be an integer of milliseconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("CELIAQUIA_ENV");
        env::remove_var("CELIAQUIA_MEDIA_ROOT");
        env::remove_var("CELIAQUIA_DATA_DIR");
        env::remove_var("CELIAQUIA_TAMANO_LOTE");
        env::remove_var("CELIAQUIA_IO_TIMEOUT_MS");
        env::remove_var("CELIAQUIA_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.import.tamano_lote, 500);
        assert_eq!(config.import.presupuesto_io, Duration::from_secs(30));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CELIAQUIA_TAMANO_LOTE", "0");
        let error = AppConfig::load().expect_err("zero batch rejected");
        assert!(matches!(error, ConfigError::InvalidBatchSize));
        reset_env();
    }
}
