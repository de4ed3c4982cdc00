//! Routes unsolicited pushes (e.g. `QUARANTINE`) to registered handlers.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use wvkeys_types::OpCode;

/// Handles one kind of server-pushed message.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn handle(&self, op: OpCode, payload: Value) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<OpCode, Arc<dyn InboundHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `op`, replacing any previous one.
    pub fn register<H: InboundHandler>(&self, op: OpCode, handler: H) {
        self.handlers.write().unwrap().insert(op, Arc::new(handler));
        debug!(op = %op, "Registered inbound handler");
    }

    pub fn handles(&self, op: OpCode) -> bool {
        self.handlers.read().unwrap().contains_key(&op)
    }

    /// Run the handler for `op` on its own task.
    ///
    /// Errors and panics are logged and end with that invocation. Returns
    /// `None` when no handler is registered.
    pub fn route(&self, op: OpCode, payload: Value) -> Option<JoinHandle<()>> {
        let handler = self.handlers.read().unwrap().get(&op).cloned()?;
        Some(tokio::spawn(async move {
            match AssertUnwindSafe(handler.handle(op, payload))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => debug!(op = %op, "Inbound handler finished"),
                Ok(Err(e)) => error!(op = %op, error = %e, "Inbound handler failed"),
                Err(_) => error!(op = %op, "Inbound handler panicked"),
            }
        }))
    }
}
