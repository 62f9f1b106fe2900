//! Single polling interface over every source kind.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use grib2pf_common::{PfError, PfResult};

use crate::cursor::{FeedCursor, SourceKind};
use crate::cursor_listing::CursorListingTracker;
use crate::date_probe::DateProbeTracker;
use crate::index_offset::IndexOffsetTracker;
use crate::target::FetchTarget;

pub enum FreshnessTracker {
    CursorListing(CursorListingTracker),
    IndexOffset(IndexOffsetTracker),
    DateProbe(DateProbeTracker),
    Periodic { url: String },
}

impl FreshnessTracker {
    pub fn kind(&self) -> SourceKind {
        match self {
            FreshnessTracker::CursorListing(_) => SourceKind::CursorListing,
            FreshnessTracker::IndexOffset(_) => SourceKind::IndexOffset,
            FreshnessTracker::DateProbe(_) => SourceKind::DateProbe,
            FreshnessTracker::Periodic { .. } => SourceKind::Periodic,
        }
    }

    /// A cursor matching this tracker's source kind.
    pub fn new_cursor(&self, interval: Duration) -> FeedCursor {
        FeedCursor::new(self.kind(), interval)
    }

    /// Check for newer upstream data, bounded by `timeout`.
    ///
    /// A timed-out poll leaves the cursor as it was: every tracker only
    /// advances the cursor after its last network call.
    pub async fn poll(
        &self,
        cursor: &mut FeedCursor,
        timeout: Duration,
    ) -> PfResult<Option<FetchTarget>> {
        let now = Utc::now();
        match tokio::time::timeout(timeout, self.poll_at(cursor, now)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    kind = self.kind().as_str(),
                    timeout_secs = timeout.as_secs(),
                    "Freshness check timed out"
                );
                Err(PfError::Timeout(timeout.as_secs()))
            }
        }
    }

    pub async fn poll_at(
        &self,
        cursor: &mut FeedCursor,
        now: DateTime<Utc>,
    ) -> PfResult<Option<FetchTarget>> {
        match self {
            FreshnessTracker::CursorListing(tracker) => tracker.poll_at(cursor, now).await,
            FreshnessTracker::IndexOffset(tracker) => tracker.poll_at(cursor, now).await,
            FreshnessTracker::DateProbe(tracker) => tracker.poll_at(cursor, now).await,
            FreshnessTracker::Periodic { url } => {
                cursor.advance(url);
                Ok(Some(FetchTarget::new(url.clone(), url.clone())))
            }
        }
    }
}
