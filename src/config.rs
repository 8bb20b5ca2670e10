//! # Bridge Configuration
//!
//! Everything the bridge needs to reach the print service and drive its loops.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [service]
//! url = "https://print.authentise.com/"
//! api_key = "key"
//! api_secret = "secret"
//! node_uuid = "4a3e1f6c-0d8b-4e61-9a52-6f1d2c3b4a59"
//!
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud_rate = 250000
//!
//! [polling]
//! status_interval_ms = 10000
//! temperature_request_ms = 4000
//!
//! [profile]
//! z_speed = 200
//! extruder_count = 1
//! ```
//!
//! Omitted sections and fields fall back to their defaults.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid service URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// Remote print service endpoint and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Identity of this node; its printers are registered under `/client/<node_uuid>/`.
    #[serde(default)]
    pub node_uuid: Option<Uuid>,
    #[serde(default = "default_printer_model")]
    pub printer_model: String,
    #[serde(default = "default_printer_name")]
    pub printer_name: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            api_key: String::new(),
            api_secret: String::new(),
            node_uuid: None,
            printer_model: default_printer_model(),
            printer_name: default_printer_name(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.url)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_readline_interval_ms")]
    pub readline_interval_ms: u64,
    /// Period of the `M105` requests; 0 turns them off.
    #[serde(default = "default_temperature_request_ms")]
    pub temperature_request_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            readline_interval_ms: default_readline_interval_ms(),
            temperature_request_ms: default_temperature_request_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EstimationConfig {
    #[serde(default = "default_threshold_secs")]
    pub threshold_secs: f64,
    #[serde(default = "default_rolling_window_secs")]
    pub rolling_window_secs: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            threshold_secs: default_threshold_secs(),
            rolling_window_secs: default_rolling_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_temperature_cutoff_mins")]
    pub temperature_cutoff_mins: u64,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            temperature_cutoff_mins: default_temperature_cutoff_mins(),
            history_len: default_history_len(),
        }
    }
}

/// Mechanics of the attached printer, used to build motion and heater commands.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProfileConfig {
    /// Jog feed rates in mm/min.
    #[serde(default = "default_xy_speed")]
    pub x_speed: u32,
    #[serde(default = "default_xy_speed")]
    pub y_speed: u32,
    #[serde(default = "default_z_speed")]
    pub z_speed: u32,
    #[serde(default = "default_e_speed")]
    pub e_speed: u32,
    #[serde(default = "default_extruder_count")]
    pub extruder_count: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            x_speed: default_xy_speed(),
            y_speed: default_xy_speed(),
            z_speed: default_z_speed(),
            e_speed: default_e_speed(),
            extruder_count: default_extruder_count(),
        }
    }
}

impl Config {
    /// Checks what serde cannot: URLs, credentials and nonzero intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.service.parsed_url()?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!("service.url '{url}' cannot be a base URL")));
        }
        if self.service.api_key.is_empty() || self.service.api_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "service.api_key and service.api_secret must be set".to_string(),
            ));
        }
        if self.service.node_uuid.is_none() {
            return Err(ConfigError::Invalid("service.node_uuid must be set".to_string()));
        }
        if self.polling.status_interval_ms == 0 || self.polling.readline_interval_ms == 0 {
            return Err(ConfigError::Invalid("polling intervals must be > 0".to_string()));
        }
        if self.estimation.threshold_secs <= 0.0 || self.estimation.rolling_window_secs <= 0.0 {
            return Err(ConfigError::Invalid("estimation values must be > 0".to_string()));
        }
        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::Invalid("monitor.interval_ms must be > 0".to_string()));
        }
        if self.profile.extruder_count == 0 {
            return Err(ConfigError::Invalid("profile.extruder_count must be > 0".to_string()));
        }
        Ok(())
    }
}

fn default_service_url() -> String { "https://print.authentise.com/".to_string() }
pub(crate) fn default_printer_model() -> String { "https://print.authentise.com/printer/model/9/".to_string() }
pub(crate) fn default_printer_name() -> String { "Cloud Printer".to_string() }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 250000 }
fn default_status_interval_ms() -> u64 { 10_000 }
fn default_readline_interval_ms() -> u64 { 100 }
fn default_temperature_request_ms() -> u64 { 4_000 }
fn default_threshold_secs() -> f64 { 60.0 }
fn default_rolling_window_secs() -> f64 { 15.0 }
fn default_monitor_interval_ms() -> u64 { 500 }
fn default_temperature_cutoff_mins() -> u64 { 30 }
fn default_history_len() -> usize { 300 }
fn default_xy_speed() -> u32 { 6000 }
fn default_z_speed() -> u32 { 200 }
fn default_e_speed() -> u32 { 300 }
fn default_extruder_count() -> u32 { 1 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> Config {
        let mut config = Config::default();
        config.service.api_key = "key".into();
        config.service.api_secret = "secret".into();
        config.service.node_uuid = Some(Uuid::nil());
        config
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.connection.baud_rate, 250000);
        assert_eq!(config.polling.status_interval_ms, 10_000);
        assert_eq!(config.polling.readline_interval_ms, 100);
        assert_eq!(config.polling.temperature_request_ms, 4_000);
        assert_eq!(config.estimation.threshold_secs, 60.0);
        assert_eq!(config.monitor.history_len, 300);
        assert_eq!(config.profile, ProfileConfig::default());
        assert_eq!(config.profile.z_speed, 200);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
url = "http://localhost:8080/"
api_key = "abc"
api_secret = "def"
node_uuid = "4a3e1f6c-0d8b-4e61-9a52-6f1d2c3b4a59"

[connection]
port = "/dev/tty.derp"
baud_rate = 115200

[polling]
status_interval_ms = 2000
temperature_request_ms = 0

[profile]
extruder_count = 2
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.service.api_key, "abc");
        assert_eq!(config.connection.port, "/dev/tty.derp");
        assert_eq!(config.connection.baud_rate, 115200);
        assert_eq!(config.polling.status_interval_ms, 2000);
        assert_eq!(config.polling.temperature_request_ms, 0);
        assert_eq!(config.profile.extruder_count, 2);
        assert_eq!(config.profile.x_speed, 6000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.service.api_secret.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = valid();
        config.service.url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::Url(_))));

        let mut config = valid();
        config.service.node_uuid = None;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.polling.status_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.profile.extruder_count = 0;
        assert!(config.validate().is_err());
    }
}
