//! NATS binding.
//!
//! Requests are published on the `request_channel` subject with a reply
//! subject `{inbox}.{id}`; a single `{inbox}.*` subscription collects every
//! reply. Pushes arrive on the `events_channel` subject.

use async_nats::Client;
use bytes::Bytes;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use super::Transport;
use crate::config::{RpcConfig, TransportKind};
use crate::dispatch::{Dispatcher, InboundMessage};
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;

pub struct NatsTransport {
    client: Client,
    inbox: String,
    request_subject: String,
    dispatcher: Dispatcher,
    inbound: JoinHandle<()>,
}

fn reply_subject(inbox: &str, id: &CorrelationId) -> String {
    format!("{}.{}", inbox, id)
}

/// Correlation id carried by a reply subject under `inbox`.
fn inbox_correlation<'a>(subject: &'a str, inbox: &str) -> Option<&'a str> {
    subject
        .strip_prefix(inbox)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|id| !id.is_empty())
}

async fn connect_client(uri: &str) -> Result<Client, TransportError> {
    info!("Connecting to NATS server: {}", uri);

    let client = async_nats::ConnectOptions::new()
        .name("wvkeys-bot")
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Connected => info!("Connected to NATS"),
                async_nats::Event::Disconnected => warn!("Disconnected from NATS"),
                async_nats::Event::ClientError(e) => warn!("NATS client error: {}", e),
                _ => {}
            }
        })
        .retry_on_initial_connect()
        .max_reconnects(None)
        .connect(uri)
        .await
        .map_err(|e| TransportError::Connection(format!("Failed to connect to NATS: {}", e)))?;

    info!("Successfully connected to NATS");
    Ok(client)
}

impl NatsTransport {
    pub async fn connect(
        config: &RpcConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, TransportError> {
        let client = connect_client(&config.transport_uri).await?;
        let inbox = client.new_inbox();

        let replies = client
            .subscribe(format!("{}.*", inbox))
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!("Failed to subscribe to inbox: {}", e))
            })?;
        let events = client
            .subscribe(config.events_channel.clone())
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!(
                    "Failed to subscribe to {}: {}",
                    config.events_channel, e
                ))
            })?;

        let reply_inbox = inbox.clone();
        let loop_dispatcher = dispatcher.clone();
        let mut incoming = futures::stream::select(replies, events);
        let inbound = tokio::spawn(async move {
            while let Some(msg) = incoming.next().await {
                trace!(subject = %msg.subject, "NATS message received");
                let mut message = InboundMessage::new(msg.payload.to_vec());
                if let Some(id) = inbox_correlation(msg.subject.as_str(), &reply_inbox) {
                    message = message.with_correlation_id(id);
                }
                loop_dispatcher.dispatch(message);
            }
            warn!("NATS subscriptions ended");
            loop_dispatcher.close();
        });

        Ok(Self {
            client,
            inbox,
            request_subject: config.request_channel.clone(),
            dispatcher,
            inbound,
        })
    }
}

impl Transport for NatsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Nats
    }

    async fn open_reply(&self, _id: &CorrelationId) -> Result<Option<String>, TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        // The reply subject travels in the NATS message header.
        Ok(None)
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        let payload = serde_json::to_vec(&envelope.frame())?;
        let reply = reply_subject(&self.inbox, &envelope.correlation_id);
        self.client
            .publish_with_reply(self.request_subject.clone(), reply, Bytes::from(payload))
            .await
            .map_err(|e| {
                TransportError::Send(format!(
                    "Failed to publish to {}: {}",
                    self.request_subject, e
                ))
            })
    }

    async fn close_reply(&self, _id: &CorrelationId) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Drop for NatsTransport {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}
