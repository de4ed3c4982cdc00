use serde_json::Value;
use wvkeys_types::{OpCode, RequestFrame};

use crate::registry::CorrelationId;

/// One outgoing call, as handed to a transport.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub operation: OpCode,
    pub payload: Value,
    pub correlation_id: CorrelationId,
    /// Where the reply should go, when the binding needs to say so on the
    /// wire (a pub/sub channel or queue name).
    pub reply_target: Option<String>,
}

impl RequestEnvelope {
    /// The wire frame, carrying `reply_to` when a reply target is set.
    pub fn frame(&self) -> RequestFrame {
        let frame = RequestFrame::new(self.operation, self.payload.clone());
        match &self.reply_target {
            Some(target) => frame.with_reply_to(target.clone()),
            None => frame,
        }
    }
}
