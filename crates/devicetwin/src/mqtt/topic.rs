use common::domain::{DomainError, DomainResult};

pub const HEALTH_TOPIC_FILTER: &str = "devices/health/+";
pub const RESPONSE_TOPIC_FILTER: &str = "devices/pub/+";

/// Inbound topic with the device id it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic {
    Health { device_id: String },
    Response { device_id: String },
}

/// Parse `devices/health/{device_id}` or `devices/pub/{device_id}`
///
/// # Examples
/// ```
/// use devicetwin::mqtt::{parse_topic, ParsedTopic};
///
/// let parsed = parse_topic("devices/health/a111").unwrap();
/// assert_eq!(parsed, ParsedTopic::Health { device_id: "a111".to_string() });
/// ```
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 3 || parts[0] != "devices" {
        return Err(DomainError::ValidationError(format!(
            "Invalid topic format '{}': expected 'devices/{{health|pub}}/{{device_id}}'",
            topic
        )));
    }

    let device_id = parts[2].trim();
    if device_id.is_empty() {
        return Err(DomainError::ValidationError(
            "Device ID cannot be empty in topic".to_string(),
        ));
    }
    let device_id = device_id.to_string();

    match parts[1] {
        "health" => Ok(ParsedTopic::Health { device_id }),
        "pub" => Ok(ParsedTopic::Response { device_id }),
        other => Err(DomainError::ValidationError(format!(
            "Unexpected topic kind '{}' in '{}'",
            other, topic
        ))),
    }
}
