use crate::domain::MessagePublisher;
use crate::mqtt::acks::PublishAcks;
use crate::mqtt::MqttConfig;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared handle to the broker connection
///
/// The event loop returned by [`MqttClient::new`] must be polled for any
/// publish or subscribe to make progress, and every polled event must be fed
/// back through [`handle_event`](Self::handle_event) so publishes can observe
/// their PubAck.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    acks: Arc<PublishAcks>,
    // Keeps waiter order equal to request order
    publish_order: Arc<Mutex<()>>,
    ack_timeout: Duration,
}

impl MqttClient {
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);

        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "created MQTT client"
        );

        let client = Self {
            client,
            acks: Arc::new(PublishAcks::default()),
            publish_order: Arc::new(Mutex::new(())),
            ack_timeout: config.ack_timeout(),
        };
        (client, eventloop)
    }

    pub fn is_connected(&self) -> bool {
        self.acks.is_connected()
    }

    /// Track connection state and publish acknowledgements from a polled event
    pub fn handle_event(&self, event: &Event) {
        self.acks.observe(event);
    }

    /// Called when polling the event loop fails
    pub fn handle_connection_error(&self) {
        self.acks.connection_lost();
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        debug!(topic = %topic, "subscription requested");
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        info!("MQTT client disconnected");
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for MqttClient {
    /// Publish at QoS 1 and wait for the broker's PubAck
    async fn publish(&self, topic: String, payload: Bytes) -> Result<()> {
        if !self.acks.is_connected() {
            bail!("not connected to MQTT broker");
        }

        debug!(topic = %topic, payload_size = payload.len(), "publishing MQTT message");

        let ack = {
            let _order = self.publish_order.lock().await;
            let ack = self.acks.enqueue();
            if let Err(e) = self
                .client
                .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
                .await
            {
                self.acks.cancel_last();
                return Err(e.into());
            }
            ack
        };

        match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow!("publish acknowledgement dropped")),
            Err(_) => Err(anyhow!(
                "no PubAck from MQTT broker within {:?}",
                self.ack_timeout
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Outgoing, Packet, PubAck};

    fn config() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ack_timeout_secs: 5,
            ..MqttConfig::default()
        }
    }

    fn mark_connected(client: &MqttClient) {
        client.handle_event(&Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))));
    }

    #[tokio::test]
    async fn test_publish_without_broker_fails() {
        let (client, eventloop) = MqttClient::new(&config());

        let result = client
            .publish("devices/sub/a111".to_string(), Bytes::from_static(b"{}"))
            .await;

        assert!(result.is_err());
        assert!(!client.is_connected());
        drop(eventloop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_times_out_without_puback() {
        let (client, _eventloop) = MqttClient::new(&config());
        mark_connected(&client);

        let err = client
            .publish("devices/sub/a111".to_string(), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no PubAck"));
    }

    #[tokio::test]
    async fn test_publish_waits_for_puback() {
        let (client, _eventloop) = MqttClient::new(&config());
        mark_connected(&client);

        let publisher = client.clone();
        let publish = tokio::spawn(async move {
            publisher
                .publish("devices/sub/a111".to_string(), Bytes::from_static(b"{}"))
                .await
        });

        // Wait until the request is queued behind the event loop
        while client.acks_pending() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!publish.is_finished());

        client.handle_event(&Event::Outgoing(Outgoing::Publish(1)));
        client.handle_event(&Event::Incoming(Packet::PubAck(PubAck::new(1))));

        assert!(publish.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_publish_fails_when_connection_drops() {
        let (client, _eventloop) = MqttClient::new(&config());
        mark_connected(&client);

        let publisher = client.clone();
        let publish = tokio::spawn(async move {
            publisher
                .publish("devices/sub/a111".to_string(), Bytes::from_static(b"{}"))
                .await
        });

        while client.acks_pending() == 0 {
            tokio::task::yield_now().await;
        }
        client.handle_event(&Event::Outgoing(Outgoing::Publish(1)));
        client.handle_connection_error();

        assert!(publish.await.unwrap().is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_publish_fails_when_event_loop_is_gone() {
        let (client, eventloop) = MqttClient::new(&config());
        mark_connected(&client);
        drop(eventloop);

        let result = client
            .publish("devices/sub/a111".to_string(), Bytes::from_static(b"{}"))
            .await;

        assert!(result.is_err());
        assert_eq!(client.acks_pending(), 0);
    }

    impl MqttClient {
        fn acks_pending(&self) -> usize {
            self.acks.pending()
        }
    }
}
