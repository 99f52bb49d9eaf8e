//! JSON payloads exchanged with devices.

use chrono::{DateTime, Utc};
use common::domain::ActionKind;
use serde::{Deserialize, Deserializer, Serialize};

/// Request envelope published to `devices/sub/{device_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeAction {
    pub id: String,
    pub action: ActionKind,
    #[serde(default)]
    pub snap: String,
    #[serde(default)]
    pub data: String,
}

/// Response envelope received on `devices/pub/{device_id}`
///
/// `action` stays a string so unknown kinds reach the reconciler and are
/// recorded as unhandled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Typed view of a response's `result` field
///
/// A missing or `null` result reads as `T::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Default + Deserialize<'de>"))]
pub struct ActionResult<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: T,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Liveness message received on `devices/health/{device_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMessage {
    #[serde(rename = "orgId")]
    pub organization_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub refresh: DateTime<Utc>,
}

/// Result of a `device` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDescription {
    #[serde(rename = "orgId")]
    pub organization_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub brand: String,
    pub model: String,
    #[serde(rename = "serial")]
    pub serial_number: String,
    #[serde(rename = "store")]
    pub store_id: String,
    #[serde(rename = "deviceKey")]
    pub device_key: String,
}

/// One installed snap as reported by `list`, `conf` and `info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapDescriptor {
    pub name: String,
    pub installed_size: i64,
    pub installed_date: Option<DateTime<Utc>>,
    pub status: String,
    pub channel: String,
    pub confinement: String,
    pub version: String,
    pub revision: i32,
    pub devmode: bool,
    pub config: String,
}

/// Result of a `server` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OsVersionDescriptor {
    pub version: String,
    pub series: String,
    pub os_id: String,
    pub os_version_id: String,
    pub on_classic: bool,
    pub kernel_version: String,
}

/// `data` of start, stop and restart requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapServices {
    #[serde(default)]
    pub services: Vec<String>,
}
