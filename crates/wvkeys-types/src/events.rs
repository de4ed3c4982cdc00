//! Unsolicited pushes from the account service.

use serde::{Deserialize, Serialize};

/// `QUARANTINE` directive: the service flagged an account for review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuarantineDirective {
    pub user_id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub buildinfo: String,
    #[serde(default)]
    pub pssh: String,
    #[serde(default)]
    pub reason: String,
}
