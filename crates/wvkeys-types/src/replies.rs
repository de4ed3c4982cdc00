//! Reply schemas for the operations that return data.

use serde::{Deserialize, Serialize};

/// One cached key returned by a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
}

/// Result of a `SEARCH` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
