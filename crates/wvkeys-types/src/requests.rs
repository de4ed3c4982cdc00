//! Typed request payloads, one schema per operation code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flags::{FlagAction, UserFlag};
use crate::opcode::OpCode;

/// Payload addressing one account by its Discord user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTarget {
    pub user_id: u64,
}

/// Payload addressing many accounts at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkUserTarget {
    pub user_ids: Vec<u64>,
}

/// Key search by KID or PSSH.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
}

/// Grant or revoke one permission bit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionUpdate {
    pub user_id: u64,
    pub permission_action: FlagAction,
    pub permissions: u32,
}

impl PermissionUpdate {
    pub fn new(user_id: u64, action: FlagAction, flag: UserFlag) -> Self {
        Self {
            user_id,
            permission_action: action,
            permissions: flag.bit(),
        }
    }
}

/// A request the bot can send to the account service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    DisableUser(UserTarget),
    DisableUserBulk(BulkUserTarget),
    EnableUser(UserTarget),
    KeyCount,
    UserCount,
    Search(SearchQuery),
    UpdatePermissions(PermissionUpdate),
    ResetApiKey(UserTarget),
}

impl Request {
    pub fn disable_user(user_id: u64) -> Self {
        Self::DisableUser(UserTarget { user_id })
    }

    pub fn disable_users(user_ids: Vec<u64>) -> Self {
        Self::DisableUserBulk(BulkUserTarget { user_ids })
    }

    pub fn enable_user(user_id: u64) -> Self {
        Self::EnableUser(UserTarget { user_id })
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self::Search(SearchQuery {
            query: query.into(),
        })
    }

    pub fn reset_api_key(user_id: u64) -> Self {
        Self::ResetApiKey(UserTarget { user_id })
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Self::DisableUser(_) => OpCode::DisableUser,
            Self::DisableUserBulk(_) => OpCode::DisableUserBulk,
            Self::EnableUser(_) => OpCode::EnableUser,
            Self::KeyCount => OpCode::KeyCount,
            Self::UserCount => OpCode::UserCount,
            Self::Search(_) => OpCode::Search,
            Self::UpdatePermissions(_) => OpCode::UpdatePermissions,
            Self::ResetApiKey(_) => OpCode::ResetApiKey,
        }
    }

    /// The `d` object for this request.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::DisableUser(t) | Self::EnableUser(t) | Self::ResetApiKey(t) => {
                serde_json::to_value(t)
            }
            Self::DisableUserBulk(t) => serde_json::to_value(t),
            Self::Search(q) => serde_json::to_value(q),
            Self::UpdatePermissions(p) => serde_json::to_value(p),
            Self::KeyCount | Self::UserCount => Ok(Value::Object(Default::default())),
        }
    }
}
