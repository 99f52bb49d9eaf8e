use async_trait::async_trait;
use bytes::Bytes;

/// Outbound side of the device transport
///
/// Implementations deliver at least once; a returned error means the
/// message was not handed to the broker.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: String, payload: Bytes) -> anyhow::Result<()>;
}
