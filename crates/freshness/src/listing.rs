//! Object storage listing.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, instrument};

use grib2pf_common::{PfError, PfResult};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Token for the next page, if the listing was truncated
    pub next_token: Option<String>,
}

/// Parameters for a single list call.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    /// Exclusive lower bound on keys; only sent with the first page
    pub start_after: Option<String>,
    pub continuation: Option<String>,
}

impl ListRequest {
    pub fn new(bucket: &str, prefix: &str, start_after: Option<&str>) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            start_after: start_after.map(str::to_string),
            continuation: None,
        }
    }
}

/// Source of object listings (S3 in production, canned pages in tests).
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn list_page(&self, request: &ListRequest) -> PfResult<ListPage>;

    /// URL from which `key` can be fetched.
    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", bucket, key)
    }
}

/// Walk every page of a listing and return the most recently modified entry
/// accepted by `filter`.
///
/// The running maximum is carried across pages; on equal timestamps the entry
/// listed later wins.
pub async fn scan_most_recent<F>(
    lister: &dyn ObjectLister,
    mut request: ListRequest,
    filter: F,
) -> PfResult<Option<ObjectEntry>>
where
    F: Fn(&ObjectEntry) -> bool + Send + Sync,
{
    let mut most_recent: Option<ObjectEntry> = None;
    let mut pages = 0usize;

    loop {
        let page = lister.list_page(&request).await?;
        pages += 1;

        for entry in page.entries {
            if !filter(&entry) {
                continue;
            }
            let newer = most_recent
                .as_ref()
                .map_or(true, |best| entry.last_modified >= best.last_modified);
            if newer {
                most_recent = Some(entry);
            }
        }

        match page.next_token {
            Some(token) => {
                request.continuation = Some(token);
                request.start_after = None;
            }
            None => break,
        }
    }

    debug!(
        prefix = %request.prefix,
        pages = pages,
        found = most_recent.is_some(),
        "Listing scanned"
    );
    Ok(most_recent)
}

/// S3 listing via the AWS SDK.
pub struct S3Lister {
    client: aws_sdk_s3::Client,
}

impl S3Lister {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Anonymous client for the public NOAA buckets.
    pub async fn anonymous(region: &str) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&aws_config))
    }
}

#[async_trait]
impl ObjectLister for S3Lister {
    #[instrument(skip(self), fields(bucket = %request.bucket, prefix = %request.prefix))]
    async fn list_page(&self, request: &ListRequest) -> PfResult<ListPage> {
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .max_keys(1000);

        if let Some(token) = &request.continuation {
            call = call.continuation_token(token);
        } else if let Some(start) = &request.start_after {
            call = call.start_after(start);
        }

        let response = call.send().await.map_err(|e| PfError::Listing {
            prefix: request.prefix.clone(),
            message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
        })?;

        let entries = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                let modified = object.last_modified()?;
                let last_modified = Utc
                    .timestamp_opt(modified.secs(), modified.subsec_nanos())
                    .single()?;
                Some(ObjectEntry::new(key, last_modified))
            })
            .collect();

        let next_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }
}
