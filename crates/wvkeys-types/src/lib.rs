//! Shared wire types for the GetWVKeys moderation bridge

pub mod events;
pub mod flags;
pub mod frames;
pub mod opcode;
pub mod replies;
pub mod requests;

pub use events::QuarantineDirective;
pub use flags::{FlagAction, UserFlag};
pub use frames::{InboundFrame, ReplyBody, RequestFrame};
pub use opcode::OpCode;
pub use replies::{KeyEntry, SearchResults};
pub use requests::{BulkUserTarget, PermissionUpdate, Request, SearchQuery, UserTarget};
