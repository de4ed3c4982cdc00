//! The awaitable call surface over a fire-and-forget transport.

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use wvkeys_types::{
    FlagAction, InboundFrame, OpCode, PermissionUpdate, Request, SearchResults, UserFlag,
};

use crate::config::RpcConfig;
use crate::dispatch::Dispatcher;
use crate::envelope::RequestEnvelope;
use crate::error::{Result, RpcError, TransportError};
use crate::registry::{CorrelationId, CorrelationRegistry};
use crate::router::EventRouter;
use crate::transport::{self, AnyTransport, Transport};

pub struct RpcClient<T: Transport> {
    transport: Arc<T>,
    registry: Arc<CorrelationRegistry>,
    router: Arc<EventRouter>,
    timeout: Duration,
}

impl<T: Transport> Clone for RpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            timeout: self.timeout,
        }
    }
}

impl RpcClient<AnyTransport> {
    /// Connect the configured binding and build a client over it.
    pub async fn connect(config: &RpcConfig) -> std::result::Result<Self, TransportError> {
        let dispatcher = Dispatcher::default();
        let transport = transport::connect(config, dispatcher.clone()).await?;
        Ok(Self::new(transport, &dispatcher, config.request_timeout()))
    }
}

impl<T: Transport> RpcClient<T> {
    /// `dispatcher` must be the one feeding `transport`'s inbound loop.
    pub fn new(transport: T, dispatcher: &Dispatcher, timeout: Duration) -> Self {
        Self {
            transport: Arc::new(transport),
            registry: Arc::clone(dispatcher.registry()),
            router: Arc::clone(dispatcher.router()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `op` with `payload` and wait for the service's answer.
    ///
    /// Returns the reply's `message`. Fails with [`RpcError::Remote`] when
    /// the service reports an error, [`RpcError::Timeout`] when nothing
    /// arrives in time, and [`RpcError::Transport`] when the send fails or
    /// the inbound side of the connection is lost.
    #[instrument(skip_all, fields(op = %op))]
    pub async fn call(&self, op: OpCode, payload: Value) -> Result<Value> {
        if op.is_error() {
            return Err(RpcError::InvalidOperation(op));
        }

        if self.registry.is_closed() {
            return Err(TransportError::Closed.into());
        }

        let mut pending = self.registry.register();
        let id = pending.id().clone();

        let reply_target = self.transport.open_reply(&id).await?;
        let route = ReplyRoute {
            transport: Arc::clone(&self.transport),
            id: id.clone(),
            open: true,
        };
        let envelope = RequestEnvelope {
            operation: op,
            payload,
            correlation_id: id.clone(),
            reply_target,
        };

        debug!(correlation_id = %id, "Sending request");
        if let Err(e) = self.transport.send(&envelope).await {
            route.release().await;
            return Err(e.into());
        }

        let reply = pending.await_result(self.timeout).await;
        route.release().await;

        match reply {
            Some(frame) => decode_reply(frame),
            None if self.registry.is_closed() => {
                warn!(correlation_id = %id, "Connection lost while awaiting reply");
                Err(TransportError::Closed.into())
            }
            None => {
                warn!(
                    correlation_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(RpcError::Timeout {
                    op,
                    correlation_id: id.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Send a typed request and decode the reply message as `R`.
    pub async fn request<R: DeserializeOwned>(&self, request: &Request) -> Result<R> {
        let payload = request.payload().map_err(TransportError::from)?;
        let message = self.call(request.opcode(), payload).await?;
        serde_json::from_value(message).map_err(|e| {
            RpcError::MalformedReply(format!("{} reply: {}", request.opcode(), e))
        })
    }

    pub async fn disable_user(&self, user_id: u64) -> Result<Value> {
        self.request(&Request::disable_user(user_id)).await
    }

    pub async fn disable_users(&self, user_ids: Vec<u64>) -> Result<Value> {
        self.request(&Request::disable_users(user_ids)).await
    }

    pub async fn enable_user(&self, user_id: u64) -> Result<Value> {
        self.request(&Request::enable_user(user_id)).await
    }

    pub async fn key_count(&self) -> Result<u64> {
        self.request(&Request::KeyCount).await
    }

    pub async fn user_count(&self) -> Result<u64> {
        self.request(&Request::UserCount).await
    }

    /// `None` when the service answers with a null message.
    pub async fn search(&self, query: &str) -> Result<Option<SearchResults>> {
        self.request(&Request::search(query)).await
    }

    pub async fn update_permissions(
        &self,
        user_id: u64,
        action: FlagAction,
        flag: UserFlag,
    ) -> Result<Value> {
        self.request(&Request::UpdatePermissions(PermissionUpdate::new(
            user_id, action, flag,
        )))
        .await
    }

    pub async fn reset_api_key(&self, user_id: u64) -> Result<Value> {
        self.request(&Request::reset_api_key(user_id)).await
    }
}

/// Reply route opened for one call. Released on every exit path, including
/// a caller that drops the call future mid-flight.
struct ReplyRoute<T: Transport> {
    transport: Arc<T>,
    id: CorrelationId,
    open: bool,
}

impl<T: Transport> ReplyRoute<T> {
    async fn release(mut self) {
        self.open = false;
        if let Err(e) = self.transport.close_reply(&self.id).await {
            warn!(correlation_id = %self.id, error = %e, "Failed to release reply route");
        }
    }
}

impl<T: Transport> Drop for ReplyRoute<T> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let id = self.id.clone();
        runtime.spawn(async move {
            if let Err(e) = transport.close_reply(&id).await {
                warn!(correlation_id = %id, error = %e, "Failed to release reply route");
            }
        });
    }
}

/// Unwrap `d.message`, turning error replies into [`RpcError::Remote`].
fn decode_reply(frame: InboundFrame) -> Result<Value> {
    if frame.opcode() == Some(OpCode::Error) {
        return Err(RpcError::Remote(error_text(frame.d)));
    }
    let body = frame
        .reply_body()
        .map_err(|e| RpcError::MalformedReply(e.to_string()))?;
    if body.error {
        return Err(RpcError::Remote(message_text(body.message)));
    }
    Ok(body.message)
}

/// Error replies may carry a bare string, or nothing, instead of a body.
fn error_text(d: Value) -> String {
    match d {
        Value::Object(mut body) => match body.remove("message") {
            Some(message) => message_text(message),
            None => Value::Object(body).to_string(),
        },
        other => message_text(other),
    }
}

fn message_text(message: Value) -> String {
    match message {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
