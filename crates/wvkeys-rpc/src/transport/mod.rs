//! Transport bindings.
//!
//! Every binding spawns its inbound loop at connect time, feeds what it
//! receives to the shared [`Dispatcher`], and aborts the loop on drop.
//!
//! | Binding   | Request goes to            | Reply correlated by             |
//! |-----------|----------------------------|---------------------------------|
//! | Redis     | `request_channel`          | per-call channel `{prefix}{id}` |
//! | AMQP      | `request_queue_name`       | `correlation_id` property       |
//! | WebSocket | the socket                 | `req_id` field in the frame     |
//! | NATS      | `request_channel` subject  | reply subject `{inbox}.{id}`    |

pub mod amqp;
pub mod nats;
pub mod redis;
pub mod websocket;

use std::future::Future;

use crate::config::{RpcConfig, TransportKind};
use crate::dispatch::Dispatcher;
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;

pub use self::amqp::AmqpTransport;
pub use self::nats::NatsTransport;
pub use self::redis::RedisTransport;
pub use self::websocket::WebSocketTransport;

/// The capability set the RPC client needs from a channel.
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    /// Prepare to receive the reply for `id` before the request goes out.
    /// Returns the reply target to advertise on the wire, if the binding has one.
    fn open_reply(
        &self,
        id: &CorrelationId,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    fn send(
        &self,
        envelope: &RequestEnvelope,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Release whatever [`open_reply`](Self::open_reply) set up.
    fn close_reply(
        &self,
        id: &CorrelationId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A transport chosen at runtime from the configured URI.
pub enum AnyTransport {
    Redis(RedisTransport),
    Amqp(AmqpTransport),
    WebSocket(WebSocketTransport),
    Nats(NatsTransport),
    #[cfg(any(test, feature = "test-support"))]
    Memory(crate::mock::MockTransport),
}

impl Transport for AnyTransport {
    fn kind(&self) -> TransportKind {
        match self {
            Self::Redis(t) => t.kind(),
            Self::Amqp(t) => t.kind(),
            Self::WebSocket(t) => t.kind(),
            Self::Nats(t) => t.kind(),
            #[cfg(any(test, feature = "test-support"))]
            Self::Memory(t) => t.kind(),
        }
    }

    async fn open_reply(&self, id: &CorrelationId) -> Result<Option<String>, TransportError> {
        match self {
            Self::Redis(t) => t.open_reply(id).await,
            Self::Amqp(t) => t.open_reply(id).await,
            Self::WebSocket(t) => t.open_reply(id).await,
            Self::Nats(t) => t.open_reply(id).await,
            #[cfg(any(test, feature = "test-support"))]
            Self::Memory(t) => t.open_reply(id).await,
        }
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        match self {
            Self::Redis(t) => t.send(envelope).await,
            Self::Amqp(t) => t.send(envelope).await,
            Self::WebSocket(t) => t.send(envelope).await,
            Self::Nats(t) => t.send(envelope).await,
            #[cfg(any(test, feature = "test-support"))]
            Self::Memory(t) => t.send(envelope).await,
        }
    }

    async fn close_reply(&self, id: &CorrelationId) -> Result<(), TransportError> {
        match self {
            Self::Redis(t) => t.close_reply(id).await,
            Self::Amqp(t) => t.close_reply(id).await,
            Self::WebSocket(t) => t.close_reply(id).await,
            Self::Nats(t) => t.close_reply(id).await,
            #[cfg(any(test, feature = "test-support"))]
            Self::Memory(t) => t.close_reply(id).await,
        }
    }
}

/// Connect the binding selected by `config.transport_uri`.
pub async fn connect(
    config: &RpcConfig,
    dispatcher: Dispatcher,
) -> Result<AnyTransport, TransportError> {
    match config.transport_kind()? {
        TransportKind::Redis => Ok(AnyTransport::Redis(
            RedisTransport::connect(config, dispatcher).await?,
        )),
        TransportKind::Amqp => Ok(AnyTransport::Amqp(
            AmqpTransport::connect(config, dispatcher).await?,
        )),
        TransportKind::WebSocket => Ok(AnyTransport::WebSocket(
            WebSocketTransport::connect(config, dispatcher).await?,
        )),
        TransportKind::Nats => Ok(AnyTransport::Nats(
            NatsTransport::connect(config, dispatcher).await?,
        )),
        TransportKind::Memory => Err(TransportError::UnsupportedUri(
            config.transport_uri.clone(),
        )),
    }
}
