use serde::{Deserialize, Serialize};
use std::time::Duration;

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
    pub reconnect_delay_ms: u64,
    /// How long a publish waits for the broker's PubAck
    pub ack_timeout_secs: u64,
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "devicetwin".to_string(),
            keep_alive_secs: 30,
            channel_capacity: 100,
            reconnect_delay_ms: 1000,
            ack_timeout_secs: 10,
        }
    }
}
