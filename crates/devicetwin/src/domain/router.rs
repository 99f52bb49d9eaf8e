use crate::domain::{ActionDispatcher, DeviceTwinService, HealthMessage, PublishResponse};
use crate::mqtt::{parse_topic, ParsedTopic};
use common::domain::ActionKind;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Demultiplexes inbound transport messages into health and response
/// handling. Every failure is logged; nothing is propagated back to the
/// transport.
#[derive(Clone)]
pub struct MessageRouter {
    twin: Arc<DeviceTwinService>,
    dispatcher: ActionDispatcher,
}

impl MessageRouter {
    pub fn new(twin: Arc<DeviceTwinService>, dispatcher: ActionDispatcher) -> Self {
        Self { twin, dispatcher }
    }

    pub async fn route(&self, topic: &str, payload: &[u8]) {
        match parse_topic(topic) {
            Ok(ParsedTopic::Health { device_id }) => self.handle_health(&device_id, payload).await,
            Ok(ParsedTopic::Response { device_id }) => {
                self.handle_response(&device_id, payload).await
            }
            Err(e) => warn!(topic = %topic, error = %e, "dropping message on unexpected topic"),
        }
    }

    pub async fn handle_health(&self, device_id: &str, payload: &[u8]) {
        let health: HealthMessage = match serde_json::from_slice(payload) {
            Ok(health) => health,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "unparsable health message");
                return;
            }
        };

        if health.device_id != device_id {
            warn!(
                topic_device_id = %device_id,
                payload_device_id = %health.device_id,
                "health payload does not match topic, dropping"
            );
            return;
        }

        match self.twin.health_handler(&health).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(device_id = %device_id, "unknown device, requesting registration");
                self.bootstrap(&health.organization_id, device_id).await;
            }
            Err(e) => error!(device_id = %device_id, error = %e, "health update failed"),
        }
    }

    /// Ask an unseen device to describe itself and its snaps
    async fn bootstrap(&self, organization_id: &str, device_id: &str) {
        for kind in [ActionKind::Device, ActionKind::List] {
            if let Err(e) = self
                .dispatcher
                .publish_action(organization_id, device_id, kind, "", "")
                .await
            {
                error!(device_id = %device_id, action = %kind, error = %e, "bootstrap request failed");
            }
        }
    }

    pub async fn handle_response(&self, device_id: &str, payload: &[u8]) {
        let response: PublishResponse = match serde_json::from_slice(payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "unparsable action response");
                return;
            }
        };

        // Failed responses leave the action in its requested state
        if !response.success {
            warn!(
                device_id = %device_id,
                action_id = %response.id,
                action = %response.action,
                message = %response.message,
                "device reported action failure"
            );
            return;
        }

        debug!(device_id = %device_id, action_id = %response.id, action = %response.action, "action response received");

        if let Err(e) = self
            .twin
            .action_response(device_id, &response.id, &response.action, payload)
            .await
        {
            error!(
                device_id = %device_id,
                action_id = %response.id,
                error = %e,
                "action response handling failed"
            );
        }
    }
}
