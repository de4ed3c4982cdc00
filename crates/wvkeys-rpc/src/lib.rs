//! Request/reply bridge to the GetWVKeys account service
//!
//! Turns a publish on Redis, RabbitMQ, a WebSocket or NATS into an awaitable
//! call with correlation, a bounded wait and typed failures, and routes
//! unsolicited pushes to registered handlers.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod router;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use client::RpcClient;
pub use config::{ReadEnv, RpcConfig, SystemEnv, TransportKind};
pub use dispatch::{Dispatcher, Disposition, InboundMessage};
pub use envelope::RequestEnvelope;
pub use error::{Result, RpcError, TransportError};
pub use registry::{CorrelationId, CorrelationRegistry, PendingCall};
pub use router::{EventRouter, InboundHandler};
pub use transport::{connect, AnyTransport, Transport};
