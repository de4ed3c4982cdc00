//! JSON frames exchanged with the account service.
//!
//! ```text
//! Request:  { "op": <int>, "d": <payload>, "reply_to"?: <string>, "req_id"?: <string> }
//! Reply:    { "op": 8 | -1, "d": { "error": bool, "message": any }, "req_id"?: <string> }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::opcode::OpCode;

/// Outbound request frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestFrame {
    pub op: OpCode,
    #[serde(default = "empty_object")]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

impl RequestFrame {
    pub fn new(op: OpCode, d: Value) -> Self {
        Self {
            op,
            d,
            reply_to: None,
            req_id: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }
}

/// Any frame arriving on an inbound channel: a reply or an unsolicited push.
///
/// `op` stays a raw integer so that frames carrying codes this build does
/// not know can still be logged before they are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundFrame {
    pub op: i64,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

impl InboundFrame {
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_wire(self.op)
    }

    /// Build a successful reply frame.
    pub fn reply(message: Value) -> Self {
        Self {
            op: OpCode::Reply.wire(),
            d: serde_json::json!({ "error": false, "message": message }),
            req_id: None,
        }
    }

    /// Build an error reply frame.
    pub fn error(message: impl Into<Value>) -> Self {
        Self {
            op: OpCode::Error.wire(),
            d: serde_json::json!({ "error": true, "message": message.into() }),
            req_id: None,
        }
    }

    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }

    /// Interpret `d` as a reply body.
    pub fn reply_body(&self) -> Result<ReplyBody, serde_json::Error> {
        ReplyBody::deserialize(&self.d)
    }
}

/// Body of a reply frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyBody {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
