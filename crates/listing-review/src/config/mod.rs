use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::ingestion::IngestMode;
use crate::review::DEFAULT_ALERT_TRAVEL_MINUTES;

const LOCAL_BIND: (&str, u16) = ("127.0.0.1", 5002);
const PUBLIC_BIND: (&str, u16) = ("0.0.0.0", 5001);

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub review: ReviewConfig,
    pub ingestion: IngestionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let local = match env::var("APP_LOCAL") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                name: "APP_LOCAL",
                value: raw,
            })?,
            Err(_) => false,
        };
        let (default_host, default_port) = if local { LOCAL_BIND } else { PUBLIC_BIND };

        let host = env::var("APP_HOST").unwrap_or_else(|_| default_host.to_string());
        let port = match env::var("APP_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => default_port,
        };

        let data_dir = PathBuf::from(env::var("APP_DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}/properties.db?mode=rwc", data_dir.display())
        });

        let alert_max_travel_minutes = match env::var("ALERT_MAX_TRAVEL_MINUTES") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .ok_or(ConfigError::InvalidThreshold { value: raw })?,
            Err(_) => DEFAULT_ALERT_TRAVEL_MINUTES,
        };

        let feed_url = env::var("INGEST_FEED_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let channel = match env::var("INGEST_CHANNEL") {
            Ok(raw) => raw
                .parse::<IngestMode>()
                .map_err(|_| ConfigError::InvalidChannel { value: raw })?,
            Err(_) => IngestMode::Buy,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            storage: StorageConfig {
                data_dir,
                database_url,
            },
            review: ReviewConfig {
                alert_max_travel_minutes,
            },
            ingestion: IngestionConfig { feed_url, channel },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Where the database, settings document, and email artifacts live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_url: String,
}

impl StorageConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("email_details.json")
    }
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub alert_max_travel_minutes: i64,
}

/// Listing feed used by the download action. `None` disables ingestion.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub feed_url: Option<String>,
    pub channel: IngestMode,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { name: &'static str, value: String },
    InvalidThreshold { value: String },
    InvalidChannel { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be a boolean flag, got '{value}'")
            }
            ConfigError::InvalidThreshold { value } => write!(
                f,
                "ALERT_MAX_TRAVEL_MINUTES must be a positive integer, got '{value}'"
            ),
            ConfigError::InvalidChannel { value } => {
                write!(f, "INGEST_CHANNEL must be BUY or RENT, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidFlag { .. }
            | ConfigError::InvalidThreshold { .. }
            | ConfigError::InvalidChannel { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_LOCAL",
            "APP_HOST",
            "APP_PORT",
            "APP_DATA_DIR",
            "DATABASE_URL",
            "ALERT_MAX_TRAVEL_MINUTES",
            "INGEST_FEED_URL",
            "INGEST_CHANNEL",
            "APP_LOG_LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(
            config.storage.database_url,
            "sqlite://data/properties.db?mode=rwc"
        );
        assert_eq!(config.review.alert_max_travel_minutes, 45);
        assert!(config.ingestion.feed_url.is_none());
        assert_eq!(config.ingestion.channel, IngestMode::Buy);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn local_flag_binds_loopback() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_LOCAL", "true");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("loopback parses");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 5002));
        reset_env();
    }

    #[test]
    fn rejects_unparseable_flag_and_threshold() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_LOCAL", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag { name: "APP_LOCAL", .. })
        ));

        reset_env();
        env::set_var("ALERT_MAX_TRAVEL_MINUTES", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
        reset_env();
    }

    #[test]
    fn feed_url_is_trimmed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("INGEST_FEED_URL", "http://feed.local/api/ ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.ingestion.feed_url.as_deref(),
            Some("http://feed.local/api")
        );
        reset_env();
    }
}
