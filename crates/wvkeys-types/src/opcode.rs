//! Operation codes carried in the `op` field of every frame.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Operation requested from (or reported by) the account service.
///
/// `Error` is a distinct variant rather than a reserved integer so it can
/// never collide with a request code. Its wire value only exists in
/// [`OpCode::wire`] / [`OpCode::from_wire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    DisableUser,
    DisableUserBulk,
    EnableUser,
    KeyCount,
    UserCount,
    Search,
    UpdatePermissions,
    Quarantine,
    Reply,
    ResetApiKey,
    Error,
}

impl OpCode {
    /// Integer used on the wire for the error sentinel.
    pub const ERROR_WIRE: i64 = -1;

    /// Every code that may appear in an outbound request.
    pub const REQUESTS: [OpCode; 10] = [
        OpCode::DisableUser,
        OpCode::DisableUserBulk,
        OpCode::EnableUser,
        OpCode::KeyCount,
        OpCode::UserCount,
        OpCode::Search,
        OpCode::UpdatePermissions,
        OpCode::Quarantine,
        OpCode::Reply,
        OpCode::ResetApiKey,
    ];

    pub fn wire(self) -> i64 {
        match self {
            Self::DisableUser => 0,
            Self::DisableUserBulk => 1,
            Self::EnableUser => 2,
            Self::KeyCount => 3,
            Self::UserCount => 4,
            Self::Search => 5,
            Self::UpdatePermissions => 6,
            Self::Quarantine => 7,
            Self::Reply => 8,
            Self::ResetApiKey => 9,
            Self::Error => Self::ERROR_WIRE,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::DisableUser),
            1 => Some(Self::DisableUserBulk),
            2 => Some(Self::EnableUser),
            3 => Some(Self::KeyCount),
            4 => Some(Self::UserCount),
            5 => Some(Self::Search),
            6 => Some(Self::UpdatePermissions),
            7 => Some(Self::Quarantine),
            8 => Some(Self::Reply),
            9 => Some(Self::ResetApiKey),
            Self::ERROR_WIRE => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// True for codes the service sends back in answer to a request.
    pub fn is_reply(self) -> bool {
        matches!(self, Self::Reply | Self::Error)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DisableUser => "DISABLE_USER",
            Self::DisableUserBulk => "DISABLE_USER_BULK",
            Self::EnableUser => "ENABLE_USER",
            Self::KeyCount => "KEY_COUNT",
            Self::UserCount => "USER_COUNT",
            Self::Search => "SEARCH",
            Self::UpdatePermissions => "UPDATE_PERMISSIONS",
            Self::Quarantine => "QUARANTINE",
            Self::Reply => "REPLY",
            Self::ResetApiKey => "RESET_API_KEY",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.wire())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OpCodeVisitor;

        impl Visitor<'_> for OpCodeVisitor {
            type Value = OpCode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer operation code")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<OpCode, E> {
                OpCode::from_wire(v)
                    .ok_or_else(|| E::custom(format!("unknown operation code {}", v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<OpCode, E> {
                let v = i64::try_from(v)
                    .map_err(|_| E::custom(format!("unknown operation code {}", v)))?;
                self.visit_i64(v)
            }
        }

        deserializer.deserialize_i64(OpCodeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes_match_service_table() {
        let wire: Vec<i64> = OpCode::REQUESTS.iter().map(|op| op.wire()).collect();
        assert_eq!(wire, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_error_is_outside_request_range() {
        assert_eq!(OpCode::Error.wire(), -1);
        assert!(!OpCode::REQUESTS.contains(&OpCode::Error));
        assert!(OpCode::REQUESTS.iter().all(|op| op.wire() >= 0));
    }

    #[test]
    fn test_from_wire_rejects_unknown() {
        assert_eq!(OpCode::from_wire(10), None);
        assert_eq!(OpCode::from_wire(-2), None);
        assert_eq!(OpCode::from_wire(-1), Some(OpCode::Error));
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&OpCode::Search).unwrap(), "5");
        assert_eq!(serde_json::to_string(&OpCode::Error).unwrap(), "-1");
    }

    #[test]
    fn test_deserialize_unknown_code_fails() {
        let err = serde_json::from_str::<OpCode>("42").unwrap_err();
        assert!(err.to_string().contains("unknown operation code 42"));
    }

    #[test]
    fn test_reply_classification() {
        assert!(OpCode::Reply.is_reply());
        assert!(OpCode::Error.is_reply());
        assert!(!OpCode::Quarantine.is_reply());
        assert!(OpCode::Error.is_error());
        assert!(!OpCode::Reply.is_error());
    }

    #[test]
    fn test_display_uses_service_names() {
        assert_eq!(OpCode::DisableUserBulk.to_string(), "DISABLE_USER_BULK");
        assert_eq!(OpCode::ResetApiKey.to_string(), "RESET_API_KEY");
    }
}
