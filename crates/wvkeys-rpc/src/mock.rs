//! In-memory transport for unit testing without a broker.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use wvkeys_types::{InboundFrame, OpCode};

use crate::config::TransportKind;
use crate::dispatch::{Dispatcher, Disposition, InboundMessage};
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;
use crate::transport::Transport;

/// What the scripted service does with one request.
pub enum Scripted {
    Reply(InboundFrame),
    After(Duration, InboundFrame),
    Silence,
}

type Responder = dyn Fn(&RequestEnvelope) -> Scripted + Send + Sync;

/// Records every request and answers through the real [`Dispatcher`].
///
/// # Example
/// ```rust,ignore
/// let dispatcher = Dispatcher::default();
/// let mock = MockTransport::echo(dispatcher.clone());
/// let client = RpcClient::new(mock.clone(), &dispatcher, Duration::from_millis(100));
/// assert_eq!(client.key_count().await?, 0);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    dispatcher: Dispatcher,
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<RequestEnvelope>>>,
    open_routes: Arc<Mutex<HashSet<String>>>,
}

impl MockTransport {
    pub fn new<F>(dispatcher: Dispatcher, responder: F) -> Self
    where
        F: Fn(&RequestEnvelope) -> Scripted + Send + Sync + 'static,
    {
        Self {
            dispatcher,
            responder: Arc::new(responder),
            sent: Arc::new(Mutex::new(Vec::new())),
            open_routes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Replies successfully with the request payload.
    pub fn echo(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher, |envelope| {
            Scripted::Reply(InboundFrame::reply(envelope.payload.clone()))
        })
    }

    /// Replies with the error sentinel and `message`.
    pub fn failing(dispatcher: Dispatcher, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(dispatcher, move |_| {
            Scripted::Reply(InboundFrame::error(message.clone()))
        })
    }

    /// Never replies.
    pub fn silent(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher, |_| Scripted::Silence)
    }

    /// Replies to each operation with a fixed message; anything else is silent.
    pub fn replying(dispatcher: Dispatcher, replies: Vec<(OpCode, Value)>) -> Self {
        Self::new(dispatcher, move |envelope| {
            replies
                .iter()
                .find(|(op, _)| *op == envelope.operation)
                .map(|(_, message)| Scripted::Reply(InboundFrame::reply(message.clone())))
                .unwrap_or(Scripted::Silence)
        })
    }

    /// Behave like a binding whose inbound loop just died: calls in flight
    /// fail and every later call is refused.
    pub fn disconnect(&self) {
        self.dispatcher.close();
    }

    /// Reply routes opened and not yet released.
    pub fn open_routes(&self) -> usize {
        self.open_routes.lock().unwrap().len()
    }

    /// Snapshot of all requests sent so far, in send order.
    pub fn sent(&self) -> Vec<RequestEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Deliver an unsolicited push as if it arrived on the events channel.
    pub fn push(&self, op: OpCode, payload: Value) -> Disposition {
        let frame = serde_json::json!({ "op": op.wire(), "d": payload });
        self.dispatcher
            .dispatch(InboundMessage::new(frame.to_string().into_bytes()))
    }

    /// Deliver a raw frame under `id`, e.g. a duplicate or late reply.
    pub fn deliver(&self, id: &str, frame: InboundFrame) -> Disposition {
        self.dispatcher.dispatch_frame(Some(id.to_string()), frame)
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    async fn open_reply(&self, id: &CorrelationId) -> Result<Option<String>, TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        self.open_routes.lock().unwrap().insert(id.to_string());
        Ok(None)
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(envelope.clone());

        let id = envelope.correlation_id.to_string();
        match (self.responder)(envelope) {
            Scripted::Reply(frame) => {
                self.dispatcher.dispatch_frame(Some(id), frame);
            }
            Scripted::After(delay, frame) => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    dispatcher.dispatch_frame(Some(id), frame);
                });
            }
            Scripted::Silence => {}
        }
        Ok(())
    }

    async fn close_reply(&self, id: &CorrelationId) -> Result<(), TransportError> {
        self.open_routes.lock().unwrap().remove(id.as_str());
        Ok(())
    }
}
