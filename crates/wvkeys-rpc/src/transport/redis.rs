//! Redis pub/sub binding.
//!
//! Requests are published on `request_channel` with a `reply_to` naming a
//! per-call channel. That channel is subscribed before the publish and
//! unsubscribed once the call ends. Pushes arrive on `events_channel`.

use futures::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::Transport;
use crate::config::{RpcConfig, TransportKind};
use crate::dispatch::{Dispatcher, InboundMessage};
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;

pub struct RedisTransport {
    publisher: MultiplexedConnection,
    subscriptions: Mutex<PubSubSink>,
    request_channel: String,
    reply_channel_prefix: String,
    dispatcher: Dispatcher,
    inbound: JoinHandle<()>,
}

/// Correlation id carried by a per-call reply channel, if `channel` is one.
fn reply_correlation<'a>(channel: &'a str, prefix: &str) -> Option<&'a str> {
    channel.strip_prefix(prefix).filter(|id| !id.is_empty())
}

fn reply_channel(prefix: &str, id: &CorrelationId) -> String {
    format!("{}{}", prefix, id)
}

impl RedisTransport {
    pub async fn connect(
        config: &RpcConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, TransportError> {
        info!("Connecting to Redis");
        let client = redis::Client::open(config.transport_uri.as_str())
            .map_err(|e| TransportError::Connection(format!("Invalid Redis URI: {}", e)))?;

        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                TransportError::Connection(format!("Failed to connect to Redis: {}", e))
            })?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| {
                TransportError::Connection(format!("Failed to open Redis pub/sub: {}", e))
            })?;
        pubsub
            .subscribe(config.events_channel.as_str())
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!(
                    "Failed to subscribe to {}: {}",
                    config.events_channel, e
                ))
            })?;

        let (sink, mut stream) = pubsub.split();
        let prefix = config.reply_channel_prefix.clone();
        let loop_dispatcher = dispatcher.clone();
        let inbound = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name();
                trace!(channel, "Redis message received");
                let mut message = InboundMessage::new(msg.get_payload_bytes());
                if let Some(id) = reply_correlation(channel, &prefix) {
                    message = message.with_correlation_id(id);
                }
                loop_dispatcher.dispatch(message);
            }
            warn!("Redis subscription stream ended");
            loop_dispatcher.close();
        });

        info!("Successfully connected to Redis");
        Ok(Self {
            publisher,
            subscriptions: Mutex::new(sink),
            request_channel: config.request_channel.clone(),
            reply_channel_prefix: config.reply_channel_prefix.clone(),
            dispatcher,
            inbound,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Transport for RedisTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Redis
    }

    async fn open_reply(&self, id: &CorrelationId) -> Result<Option<String>, TransportError> {
        self.ensure_open()?;
        let channel = reply_channel(&self.reply_channel_prefix, id);
        self.subscriptions
            .lock()
            .await
            .subscribe(channel.as_str())
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!("Failed to subscribe to {}: {}", channel, e))
            })?;
        debug!(channel = %channel, "Subscribed to reply channel");
        Ok(Some(channel))
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        self.ensure_open()?;
        let payload = serde_json::to_string(&envelope.frame())?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(self.request_channel.as_str(), payload)
            .await
            .map_err(|e| {
                TransportError::Send(format!(
                    "Failed to publish to {}: {}",
                    self.request_channel, e
                ))
            })?;
        if receivers == 0 {
            warn!(channel = %self.request_channel, "No subscribers on request channel");
        }
        Ok(())
    }

    async fn close_reply(&self, id: &CorrelationId) -> Result<(), TransportError> {
        let channel = reply_channel(&self.reply_channel_prefix, id);
        self.subscriptions
            .lock()
            .await
            .unsubscribe(channel.as_str())
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!("Failed to unsubscribe from {}: {}", channel, e))
            })
    }
}

impl Drop for RedisTransport {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_correlation_strips_prefix() {
        assert_eq!(reply_correlation("api-3f2a", "api-"), Some("3f2a"));
    }

    #[test]
    fn test_events_channel_has_no_correlation() {
        assert_eq!(reply_correlation("bot", "api-"), None);
        assert_eq!(reply_correlation("api-", "api-"), None);
    }

    #[test]
    fn test_reply_channel_round_trips_through_correlation() {
        let id = CorrelationId::from("abc123");
        let channel = reply_channel("api-", &id);
        assert_eq!(channel, "api-abc123");
        assert_eq!(reply_correlation(&channel, "api-"), Some(id.as_str()));
    }
}
