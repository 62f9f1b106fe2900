//! Per-feed cursor recording the last upstream item seen.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a feed discovers new upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Object listing scoped by an exclusive start-after key.
    CursorListing,
    /// Object listing plus a companion byte-offset index.
    IndexOffset,
    /// Expected URL computed from the clock, confirmed by a directory listing.
    DateProbe,
    /// Fixed URL regenerated on every poll.
    Periodic,
}

impl SourceKind {
    /// Whether `candidate` is newer than `current` under this kind's ordering.
    ///
    /// Listing kinds order by object key, matching S3 `StartAfter` semantics.
    /// Date-probe URLs derive from the clock, so any different URL is newer.
    pub fn is_newer(&self, current: &str, candidate: &str) -> bool {
        match self {
            SourceKind::CursorListing | SourceKind::IndexOffset => candidate > current,
            SourceKind::DateProbe => candidate != current,
            SourceKind::Periodic => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CursorListing => "cursor_listing",
            SourceKind::IndexOffset => "index_offset",
            SourceKind::DateProbe => "date_probe",
            SourceKind::Periodic => "periodic",
        }
    }
}

/// Last-seen identifier for one feed input.
///
/// Owned by the feed's polling loop and handed to each poll by `&mut`.
#[derive(Debug, Clone)]
pub struct FeedCursor {
    kind: SourceKind,
    last_seen: Option<String>,
    interval: Duration,
    advances: u64,
}

impl FeedCursor {
    pub fn new(kind: SourceKind, interval: Duration) -> Self {
        Self {
            kind,
            last_seen: None,
            interval,
            advances: 0,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of times the cursor has moved since startup.
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Record `candidate` if it is newer than the current value.
    ///
    /// Returns false, leaving the cursor untouched, otherwise.
    pub fn advance(&mut self, candidate: &str) -> bool {
        let newer = match &self.last_seen {
            None => true,
            Some(current) => self.kind.is_newer(current, candidate),
        };

        if newer {
            debug!(
                kind = self.kind.as_str(),
                from = ?self.last_seen,
                to = candidate,
                "Cursor advanced"
            );
            self.last_seen = Some(candidate.to_string());
            self.advances += 1;
        }
        newer
    }
}
