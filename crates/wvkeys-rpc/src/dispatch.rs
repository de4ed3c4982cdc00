//! Classifies inbound messages: reply to a pending call, push for a handler, or noise.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use wvkeys_types::InboundFrame;

use crate::registry::CorrelationRegistry;
use crate::router::EventRouter;

/// A raw message taken off a transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Correlation carried by the transport itself (queue property, reply
    /// channel or subject suffix). Falls back to the frame's `req_id`.
    pub correlation_id: Option<String>,
    pub body: Vec<u8>,
}

impl InboundMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id: None,
            body: body.into(),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Resolved,
    Routed,
    Dropped,
}

/// Shared by every transport's inbound loop.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<CorrelationRegistry>,
    router: Arc<EventRouter>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CorrelationRegistry>, router: Arc<EventRouter>) -> Self {
        Self { registry, router }
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Called by a binding whose inbound loop has ended. In-flight calls fail
    /// with [`TransportError::Closed`](crate::TransportError::Closed) instead
    /// of waiting out their deadline.
    pub fn close(&self) {
        let failed = self.registry.close();
        warn!(in_flight = failed, "Inbound channel closed; failing pending requests");
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    pub fn dispatch(&self, message: InboundMessage) -> Disposition {
        let frame: InboundFrame = match serde_json::from_slice(&message.body) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    error = %e,
                    size = message.body.len(),
                    "Dropping undecodable inbound frame"
                );
                return Disposition::Dropped;
            }
        };
        self.dispatch_frame(message.correlation_id, frame)
    }

    pub fn dispatch_frame(
        &self,
        correlation_id: Option<String>,
        frame: InboundFrame,
    ) -> Disposition {
        let id = correlation_id.or_else(|| frame.req_id.clone());

        let frame = match id.as_deref() {
            Some(id) => match self.registry.try_resolve(id, frame) {
                Ok(()) => {
                    trace!(correlation_id = id, "Reply delivered");
                    return Disposition::Resolved;
                }
                Err(frame) => frame,
            },
            None => frame,
        };

        match frame.opcode() {
            Some(op) if !op.is_reply() && self.router.handles(op) => {
                debug!(op = %op, "Routing unsolicited message");
                self.router.route(op, frame.d);
                Disposition::Routed
            }
            Some(op) if op.is_reply() => {
                debug!(
                    op = %op,
                    correlation_id = id.as_deref().unwrap_or("-"),
                    "Dropping late or duplicate reply"
                );
                Disposition::Dropped
            }
            _ => {
                warn!(op = frame.op, "Dropping unrecognized inbound message");
                Disposition::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::InboundHandler;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wvkeys_types::OpCode;

    struct Forward(mpsc::UnboundedSender<Value>);

    #[async_trait]
    impl InboundHandler for Forward {
        async fn handle(&self, _op: OpCode, payload: Value) -> anyhow::Result<()> {
            self.0.send(payload)?;
            Ok(())
        }
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn test_reply_resolves_by_transport_correlation() {
        let dispatcher = Dispatcher::default();
        let mut call = dispatcher.registry().register();
        let id = call.id().to_string();

        let message = InboundMessage::new(body(json!({
            "op": 8, "d": {"error": false, "message": 3}
        })))
        .with_correlation_id(id);
        assert_eq!(dispatcher.dispatch(message), Disposition::Resolved);

        let frame = call.await_result(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame.reply_body().unwrap().message, json!(3));
    }

    #[tokio::test]
    async fn test_reply_resolves_by_req_id() {
        let dispatcher = Dispatcher::default();
        let call = dispatcher.registry().register();
        let id = call.id().to_string();

        let message = InboundMessage::new(body(json!({
            "op": 8, "d": {"error": false, "message": null}, "req_id": id
        })));
        assert_eq!(dispatcher.dispatch(message), Disposition::Resolved);
    }

    #[tokio::test]
    async fn test_push_goes_to_router() {
        let dispatcher = Dispatcher::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.router().register(OpCode::Quarantine, Forward(tx));

        let message = InboundMessage::new(body(json!({"op": 7, "d": {"user_id": 5}})));
        assert_eq!(dispatcher.dispatch(message), Disposition::Routed);
        assert_eq!(rx.recv().await.unwrap(), json!({"user_id": 5}));
    }

    #[test]
    fn test_unknown_reply_is_dropped_without_touching_others() {
        let dispatcher = Dispatcher::default();
        let call = dispatcher.registry().register();

        let message = InboundMessage::new(body(json!({"op": 8, "d": {"message": 1}})))
            .with_correlation_id("not-a-pending-id");
        assert_eq!(dispatcher.dispatch(message), Disposition::Dropped);
        assert!(dispatcher.registry().contains(call.id().as_str()));
    }

    #[test]
    fn test_close_fails_pending_calls() {
        let dispatcher = Dispatcher::default();
        let call = dispatcher.registry().register();
        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert!(!dispatcher.registry().contains(call.id().as_str()));
    }

    #[test]
    fn test_garbage_and_unknown_ops_are_dropped() {
        let dispatcher = Dispatcher::default();
        assert_eq!(
            dispatcher.dispatch(InboundMessage::new(b"{not json".to_vec())),
            Disposition::Dropped
        );
        assert_eq!(
            dispatcher.dispatch(InboundMessage::new(body(json!({"op": 99, "d": {}})))),
            Disposition::Dropped
        );
        // No handler registered for QUARANTINE.
        assert_eq!(
            dispatcher.dispatch(InboundMessage::new(body(json!({"op": 7, "d": {}})))),
            Disposition::Dropped
        );
    }
}
