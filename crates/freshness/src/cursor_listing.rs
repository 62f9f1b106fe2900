//! Cursor-scoped object listing for single-file feeds (MRMS products).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use grib2pf_common::PfResult;

use crate::cursor::FeedCursor;
use crate::listing::{scan_most_recent, ListRequest, ObjectLister};
use crate::target::FetchTarget;

/// Lists `{product}/{YYYYMMDD}/` and reports the newest object after the cursor.
///
/// MRMS keys look like
/// `CONUS/MergedBaseReflectivity_00.50/20250101/MRMS_MergedBaseReflectivity_00.50_20250101-000440.grib2.gz`.
pub struct CursorListingTracker {
    lister: Arc<dyn ObjectLister>,
    bucket: String,
    product: String,
}

impl CursorListingTracker {
    pub fn new(lister: Arc<dyn ObjectLister>, bucket: &str, product: &str) -> Self {
        let product = if product.ends_with('/') {
            product.to_string()
        } else {
            format!("{}/", product)
        };

        Self {
            lister,
            bucket: bucket.to_string(),
            product,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Listing prefix for the UTC day containing `now`.
    pub fn prefix_for(&self, now: DateTime<Utc>) -> String {
        format!("{}{}/", self.product, now.format("%Y%m%d"))
    }

    #[instrument(skip(self, cursor), fields(product = %self.product))]
    pub async fn poll_at(
        &self,
        cursor: &mut FeedCursor,
        now: DateTime<Utc>,
    ) -> PfResult<Option<FetchTarget>> {
        let prefix = self.prefix_for(now);
        let request = ListRequest::new(&self.bucket, &prefix, cursor.last_seen());

        let newest = scan_most_recent(self.lister.as_ref(), request, |_| true).await?;

        let Some(entry) = newest else {
            debug!(prefix = %prefix, "No new objects");
            return Ok(None);
        };

        if !cursor.advance(&entry.key) {
            debug!(key = %entry.key, "Newest object is not past the cursor");
            return Ok(None);
        }

        info!(
            key = %entry.key,
            modified = %entry.last_modified,
            "New object found"
        );

        let url = self.lister.object_url(&self.bucket, &entry.key);
        Ok(Some(FetchTarget::new(url, entry.key)))
    }
}
