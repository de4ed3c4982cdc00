//! AMQP (RabbitMQ) binding.
//!
//! One exclusive reply queue lives for the whole connection. Requests carry
//! `reply_to` and `correlation_id` properties; replies are matched on the
//! latter.

use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use super::Transport;
use crate::config::{RpcConfig, TransportKind};
use crate::dispatch::{Dispatcher, InboundMessage};
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;

const CONSUMER_TAG: &str = "wvkeys-bot";

pub struct AmqpTransport {
    _connection: Connection,
    channel: Channel,
    reply_queue: String,
    request_queue: String,
    publish_lock: Mutex<()>,
    dispatcher: Dispatcher,
    inbound: JoinHandle<()>,
}

fn request_properties(reply_queue: &str, correlation_id: &CorrelationId) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from("application/json"))
        .with_reply_to(ShortString::from(reply_queue))
        .with_correlation_id(ShortString::from(correlation_id.as_str()))
}

fn delivery_correlation(properties: &BasicProperties) -> Option<String> {
    properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
}

impl AmqpTransport {
    pub async fn connect(
        config: &RpcConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, TransportError> {
        info!("Connecting to AMQP broker");
        let connection =
            Connection::connect(&config.transport_uri, ConnectionProperties::default())
                .await
                .map_err(|e| {
                    TransportError::Connection(format!("Failed to connect to broker: {}", e))
                })?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to open channel: {}", e)))?;

        let queue = channel
            .queue_declare(
                &config.reply_queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!(
                    "Failed to declare reply queue {}: {}",
                    config.reply_queue_name, e
                ))
            })?;
        let reply_queue = queue.name().as_str().to_string();

        let mut consumer = channel
            .basic_consume(
                &reply_queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TransportError::Subscribe(format!("Failed to consume {}: {}", reply_queue, e))
            })?;

        let loop_dispatcher = dispatcher.clone();
        let inbound = tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        warn!(error = %e, "AMQP consumer error");
                        break;
                    }
                };
                let correlation_id = delivery_correlation(&delivery.properties);
                trace!(correlation_id = ?correlation_id, "AMQP delivery received");
                let mut message = InboundMessage::new(delivery.data);
                if let Some(id) = correlation_id {
                    message = message.with_correlation_id(id);
                }
                loop_dispatcher.dispatch(message);
            }
            warn!("AMQP consumer stream ended");
            loop_dispatcher.close();
        });

        info!(reply_queue = %reply_queue, "Successfully connected to AMQP broker");
        Ok(Self {
            _connection: connection,
            channel,
            reply_queue,
            request_queue: config.request_queue_name.clone(),
            publish_lock: Mutex::new(()),
            dispatcher,
            inbound,
        })
    }
}

impl Transport for AmqpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Amqp
    }

    async fn open_reply(&self, _id: &CorrelationId) -> Result<Option<String>, TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        // The reply queue is long-lived and travels as a message property.
        Ok(None)
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        let payload = serde_json::to_vec(&envelope.frame())?;
        let properties = request_properties(&self.reply_queue, &envelope.correlation_id);

        let _guard = self.publish_lock.lock().await;
        self.channel
            .basic_publish(
                "",
                &self.request_queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| {
                TransportError::Send(format!("Failed to publish to {}: {}", self.request_queue, e))
            })?
            .await
            .map_err(|e| {
                TransportError::Send(format!(
                    "Broker rejected publish to {}: {}",
                    self.request_queue, e
                ))
            })?;
        Ok(())
    }

    async fn close_reply(&self, _id: &CorrelationId) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Drop for AmqpTransport {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}
