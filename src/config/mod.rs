pub mod env;

use crate::error::SyncError;
use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::path::Path;
use std::time::Duration;

/// Complete teslabuddy configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuddyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Raise the default log filter to debug
    #[serde(default)]
    pub debug: bool,
}

/// TeslaMate PostgreSQL connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    /// A read-only user is enough
    pub user: String,
    pub pass: String,
    pub name: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            user: String::new(),
            pass: String::new(),
            name: String::new(),
            max_connections: 2,
            connect_timeout_seconds: 10,
        }
    }
}

impl DatabaseConfig {
    /// Connection options built field by field, so credentials never need
    /// URL escaping.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.pass)
            .database(&self.name)
    }
}

/// MQTT broker connection and topic layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix of the client id, a random suffix is appended per process
    pub client_id: String,
    pub keep_alive_seconds: u64,
    /// Home Assistant discovery prefix
    pub discovery_prefix: String,
    /// State and command topics live under `<base_topic>/<vin>/`
    pub base_topic: String,
    /// Capacity of the inbound command queue
    pub command_queue: usize,
    pub reconnect_delay_seconds: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            username: None,
            password: None,
            client_id: "teslabuddy".to_string(),
            keep_alive_seconds: 30,
            discovery_prefix: "homeassistant".to_string(),
            base_topic: "tesla/car".to_string(),
            command_queue: 32,
            reconnect_delay_seconds: 5,
        }
    }
}

/// Which vehicle to expose and how its location is interpreted
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Required only when TeslaMate logs more than one vehicle
    pub vin: Option<String>,
    /// Geofence name reported to Home Assistant as `home`
    pub home_geofence: String,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vin: None,
            home_geofence: "Home".to_string(),
        }
    }
}

/// Poll cycle tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub poll_interval_seconds: u64,
    /// Location moves smaller than this are GPS noise and not republished
    pub position_tolerance_meters: f64,
    /// Upper bound for every store and bus call
    pub operation_timeout_seconds: u64,
    /// Consecutive failed passes before the store is reconnected
    pub failure_threshold: u32,
    /// Failed reconnects in a row before the scheduler gives up
    pub max_reconnect_attempts: u32,
    /// Run an extra pass whenever TeslaMate publishes on its own MQTT topics
    pub observe_teslamate: bool,
    pub shutdown_grace_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            position_tolerance_meters: 10.0,
            operation_timeout_seconds: 10,
            failure_threshold: 5,
            max_reconnect_attempts: 3,
            observe_teslamate: true,
            shutdown_grace_seconds: 5,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// Upstream HTTP endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub tesla_api_url: String,
    /// TeslaMate web UI, used to resume logging after a command
    pub teslamate_url: String,
    pub request_timeout_seconds: u64,
    /// How long an access token read from TeslaMate is reused
    pub token_cache_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            tesla_api_url: "https://owner-api.teslamotors.com".to_string(),
            teslamate_url: "http://teslamate:4000/".to_string(),
            request_timeout_seconds: 15,
            token_cache_seconds: 30,
        }
    }
}

impl BuddyConfig {
    /// Check everything the core cannot start without.
    pub fn validate(&self) -> Result<(), SyncError> {
        let required = [
            ("database.host", &self.database.host),
            ("database.user", &self.database.user),
            ("database.pass", &self.database.pass),
            ("database.name", &self.database.name),
            ("mqtt.host", &self.mqtt.host),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::Config(format!("{} is required", name)));
            }
        }

        if self.sync.poll_interval_seconds == 0 {
            return Err(SyncError::Config(
                "sync.poll_interval_seconds must be positive".to_string(),
            ));
        }
        if self.sync.operation_timeout_seconds == 0 {
            return Err(SyncError::Config(
                "sync.operation_timeout_seconds must be positive".to_string(),
            ));
        }
        if !(self.sync.position_tolerance_meters >= 0.0) {
            return Err(SyncError::Config(
                "sync.position_tolerance_meters must not be negative".to_string(),
            ));
        }
        if self.mqtt.command_queue == 0 {
            return Err(SyncError::Config(
                "mqtt.command_queue must be positive".to_string(),
            ));
        }
        if let Some(vin) = &self.vehicle.vin {
            if vin.trim().is_empty() || vin.contains(['/', '+', '#']) {
                return Err(SyncError::Config(format!("invalid VIN '{}'", vin)));
            }
        }
        Ok(())
    }

    /// Base topic without trailing separators.
    pub fn base_topic(&self) -> &str {
        self.mqtt.base_topic.trim_end_matches('/')
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<BuddyConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BuddyConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> BuddyConfig {
        let mut config = BuddyConfig::default();
        config.database.host = "postgres.local".to_string();
        config.database.user = "teslamate".to_string();
        config.database.pass = "secret".to_string();
        config.database.name = "teslamate".to_string();
        config.mqtt.host = "mosquitto".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = BuddyConfig::default();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.base_topic, "tesla/car");
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert_eq!(config.vehicle.home_geofence, "Home");
        assert_eq!(config.sync.poll_interval_seconds, 30);
        assert!(config.vehicle.vin.is_none());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            debug = true

            [database]
            host = "db"
            user = "ro"
            pass = "pw"
            name = "teslamate"
            port = 5433

            [mqtt]
            host = "broker"
            base_topic = "cars/"

            [vehicle]
            vin = "5YJ3E7EB0KF000001"
            home_geofence = "Casa"

            [sync]
            poll_interval_seconds = 15
            position_tolerance_meters = 25.0
        "#;

        let config: BuddyConfig = toml::from_str(toml).unwrap();
        assert!(config.debug);
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.base_topic(), "cars");
        assert_eq!(config.vehicle.vin.as_deref(), Some("5YJ3E7EB0KF000001"));
        assert_eq!(config.vehicle.home_geofence, "Casa");
        assert_eq!(config.sync.poll_interval_seconds, 15);
        // Missing keys inside a present section keep their defaults
        assert_eq!(config.sync.failure_threshold, 5);
        assert_eq!(config.mqtt.port, 1883);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connect_options_keep_special_characters() {
        let mut config = valid_config();
        config.database.host = "db".to_string();
        config.database.port = 5433;
        config.database.user = "ro@user".to_string();
        config.database.pass = "p@ss/word:#?".to_string();

        let options = config.database.connect_options();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "ro@user");
        assert_eq!(options.get_database(), Some("teslamate"));
    }

    #[test]
    fn test_missing_required_field_is_config_error() {
        let mut config = valid_config();
        config.mqtt.host.clear();
        assert_eq!(
            config.validate(),
            Err(SyncError::Config("mqtt.host is required".to_string()))
        );
    }

    #[test]
    fn test_invalid_vin_rejected() {
        let mut config = valid_config();
        config.vehicle.vin = Some("VIN/WITH/SLASH".to_string());
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = valid_config();
        config.sync.poll_interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nhost = \"broker\"\nport = 8883").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mqtt.host, "broker");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/teslabuddy.toml"));
        assert!(result.is_err());
    }
}
