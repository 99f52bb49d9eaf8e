use common::mqtt::MqttConfig;
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backing store for the twin
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Storage configuration
    /// `postgres` or `memory`
    #[serde(default = "default_storage_driver")]
    pub storage_driver: StorageDriver,

    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum pooled connections
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // MQTT configuration
    /// MQTT broker host
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// MQTT client id; must be unique per broker
    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Keep-alive interval in seconds
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Capacity of the outgoing request channel
    #[serde(default = "default_mqtt_channel_capacity")]
    pub mqtt_channel_capacity: usize,

    /// Delay before reconnecting after a connection error
    #[serde(default = "default_mqtt_reconnect_delay_ms")]
    pub mqtt_reconnect_delay_ms: u64,

    /// Seconds a publish waits for the broker's acknowledgement
    #[serde(default = "default_mqtt_ack_timeout_secs")]
    pub mqtt_ack_timeout_secs: u64,

    // Device twin configuration
    /// Delay before refreshing the snap list after a snap mutation
    #[serde(default = "default_resync_delay_secs")]
    pub resync_delay_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name reported to OpenTelemetry
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_driver() -> StorageDriver {
    StorageDriver::Postgres
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "devicetwin".to_string()
}

fn default_postgres_username() -> String {
    "devicetwin".to_string()
}

fn default_postgres_password() -> String {
    "devicetwin".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "devicetwin".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_channel_capacity() -> usize {
    100
}

fn default_mqtt_reconnect_delay_ms() -> u64 {
    1000
}

fn default_mqtt_ack_timeout_secs() -> u64 {
    10
}

fn default_resync_delay_secs() -> u64 {
    10
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "devicetwin".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("DEVICETWIN"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn mqtt(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            channel_capacity: self.mqtt_channel_capacity,
            reconnect_delay_ms: self.mqtt_reconnect_delay_ms,
            ack_timeout_secs: self.mqtt_ack_timeout_secs,
        }
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_secs(self.resync_delay_secs)
    }
}
