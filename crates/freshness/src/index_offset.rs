//! Listing plus companion-index lookup for multi-message payloads (HRRR).

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use grib2pf_common::{render_time_template, PfResult};

use crate::cursor::FeedCursor;
use crate::fetch::TextFetcher;
use crate::index::IndexOffsetMap;
use crate::listing::{scan_most_recent, ListRequest, ObjectEntry, ObjectLister};
use crate::target::FetchTarget;

fn default_extension() -> String {
    ".grib2".to_string()
}

/// Acceptable payload keys, e.g. `hrrr.20250101/conus/hrrr.t12z.wrfsfcf00.grib2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShape {
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Token that must appear in the file name (e.g. `wrfsfc`)
    pub file_token: String,
}

impl KeyShape {
    pub fn new(file_token: &str) -> Self {
        Self {
            extension: default_extension(),
            file_token: file_token.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    /// Exactly three `/`-separated segments, the extension and the token.
    pub fn matches(&self, key: &str) -> bool {
        let segments: Vec<&str> = key.split('/').collect();
        if segments.len() != 3 {
            return false;
        }
        let file = segments[2];
        file.ends_with(&self.extension) && file.contains(&self.file_token)
    }
}

pub struct IndexOffsetTracker {
    lister: Arc<dyn ObjectLister>,
    fetcher: Arc<dyn TextFetcher>,
    bucket: String,
    prefix_template: String,
    lookback: ChronoDuration,
    shape: KeyShape,
    index_suffix: String,
    products: Vec<String>,
}

impl IndexOffsetTracker {
    pub fn new(
        lister: Arc<dyn ObjectLister>,
        fetcher: Arc<dyn TextFetcher>,
        bucket: &str,
        prefix_template: &str,
        shape: KeyShape,
        products: Vec<String>,
    ) -> Self {
        Self {
            lister,
            fetcher,
            bucket: bucket.to_string(),
            prefix_template: prefix_template.to_string(),
            lookback: ChronoDuration::hours(1),
            shape,
            index_suffix: ".idx".to_string(),
            products,
        }
    }

    pub fn with_lookback_hours(mut self, hours: i64) -> Self {
        self.lookback = ChronoDuration::hours(hours);
        self
    }

    pub fn with_index_suffix(mut self, suffix: &str) -> Self {
        self.index_suffix = suffix.to_string();
        self
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    /// Listing prefix for the hour window ending `lookback` before `now`.
    pub fn prefix_for(&self, now: DateTime<Utc>) -> PfResult<String> {
        render_time_template(&self.prefix_template, now - self.lookback)
    }

    #[instrument(skip(self, cursor), fields(bucket = %self.bucket))]
    pub async fn poll_at(
        &self,
        cursor: &mut FeedCursor,
        now: DateTime<Utc>,
    ) -> PfResult<Option<FetchTarget>> {
        let prefix = self.prefix_for(now)?;
        let request = ListRequest::new(&self.bucket, &prefix, cursor.last_seen());

        let shape = &self.shape;
        let newest = scan_most_recent(self.lister.as_ref(), request, |entry: &ObjectEntry| {
            shape.matches(&entry.key)
        })
        .await?;

        let Some(entry) = newest else {
            debug!(prefix = %prefix, "No new payloads");
            return Ok(None);
        };

        let is_newer = cursor
            .last_seen()
            .map_or(true, |seen| cursor.kind().is_newer(seen, &entry.key));
        if !is_newer {
            return Ok(None);
        }

        // The cursor moves only once the index has been fetched and parsed.
        let url = self.lister.object_url(&self.bucket, &entry.key);
        let index_url = format!("{}{}", url, self.index_suffix);
        let index_text = self.fetcher.fetch_text(&index_url).await?;
        let index = IndexOffsetMap::parse(&index_text, &self.products, &index_url)?;
        let offsets = index.resolve(&self.products);

        cursor.advance(&entry.key);

        info!(
            key = %entry.key,
            modified = %entry.last_modified,
            products = offsets.len(),
            "New payload found"
        );

        Ok(Some(FetchTarget::new(url, entry.key).with_offsets(offsets)))
    }
}
