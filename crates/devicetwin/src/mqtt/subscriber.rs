use crate::domain::MessageRouter;
use crate::mqtt::{HEALTH_TOPIC_FILTER, RESPONSE_TOPIC_FILTER};
use bytes::Bytes;
use common::mqtt::MqttClient;
use rumqttc::{Event, EventLoop, Packet};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument, Span};

/// Drive the MQTT event loop until cancelled
///
/// Subscriptions are (re)issued on every ConnAck since sessions are clean.
/// Every polled event is also handed to the client so publishes see their PubAck.
/// Each inbound publish is handled in its own task under a fresh root span;
/// connection errors are logged and the loop reconnects after `reconnect_delay`.
#[instrument(name = "mqtt_subscriber", skip_all)]
pub async fn run_mqtt_subscriber(
    client: MqttClient,
    mut eventloop: EventLoop,
    router: MessageRouter,
    reconnect_delay: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    info!("starting MQTT subscriber");

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(event) => {
                        client.handle_event(&event);
                        match event {
                            Event::Incoming(Packet::ConnAck(_)) => {
                                info!("connected to MQTT broker");
                                spawn_subscriptions(client.clone());
                            }
                            Event::Incoming(Packet::SubAck(_)) => {
                                debug!("subscription acknowledged");
                            }
                            Event::Incoming(Packet::Publish(publish)) => {
                                spawn_message_handler(
                                    router.clone(),
                                    publish.topic,
                                    publish.payload,
                                );
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        client.handle_connection_error();
                        warn!(error = %e, "MQTT connection error, reconnecting");
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(reconnect_delay) => {}
                        }
                    }
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Request both topic filters off the polling task
///
/// The request channel is drained only by the event loop, so waiting on it
/// from the loop itself would stall once the channel is full.
fn spawn_subscriptions(client: MqttClient) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            for filter in [HEALTH_TOPIC_FILTER, RESPONSE_TOPIC_FILTER] {
                if let Err(e) = client.subscribe(filter).await {
                    warn!(topic = filter, error = %e, "failed to request subscription");
                }
            }
        }
        .in_current_span(),
    )
}

fn spawn_message_handler(router: MessageRouter, topic: String, payload: Bytes) {
    // Independent trace per message, not nested under the subscriber span
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
    );

    tokio::spawn(async move { router.route(&topic, &payload).await }.instrument(span));
}
