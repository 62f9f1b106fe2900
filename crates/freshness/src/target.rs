//! Resolved fetch targets handed to the render supervisor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where to fetch freshly published upstream data from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTarget {
    /// URL of the payload
    pub url: String,
    /// Value recorded in the feed cursor (object key or resolved URL)
    pub identifier: String,
    /// Byte offset of each requested message inside a multi-message payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub offsets: BTreeMap<String, u64>,
    pub detected_at: DateTime<Utc>,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identifier: identifier.into(),
            offsets: BTreeMap::new(),
            detected_at: Utc::now(),
        }
    }

    pub fn with_offsets(mut self, offsets: BTreeMap<String, u64>) -> Self {
        self.offsets = offsets;
        self
    }

    /// Offset of `product`, 0 when the payload holds a single message.
    pub fn offset_for(&self, product: Option<&str>) -> u64 {
        product
            .and_then(|p| self.offsets.get(p).copied())
            .unwrap_or(0)
    }
}
