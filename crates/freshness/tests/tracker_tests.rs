//! Freshness tracker behaviour against synthetic listings and HTTP responses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use freshness::{
    Cadence, CursorListingTracker, DateProbeTracker, FeedCursor, FreshnessTracker,
    IndexOffsetTracker, KeyShape, ListPage, ListRequest, ObjectEntry, ObjectLister, SourceKind,
    TextFetcher,
};
use grib2pf_common::{PfError, PfResult};

// ============================================================================
// Fakes
// ============================================================================

/// Serves canned pages; page `n` is reached with continuation token `"n"`.
struct FakeLister {
    pages: Vec<Vec<ObjectEntry>>,
    requests: Mutex<Vec<ListRequest>>,
}

impl FakeLister {
    fn new(pages: Vec<Vec<ObjectEntry>>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ListRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectLister for FakeLister {
    async fn list_page(&self, request: &ListRequest) -> PfResult<ListPage> {
        self.requests.lock().unwrap().push(request.clone());

        let index: usize = request
            .continuation
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);

        let entries = self
            .pages
            .get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|e| {
                e.key.starts_with(&request.prefix)
                    && request
                        .start_after
                        .as_deref()
                        .map_or(true, |after| e.key.as_str() > after)
            })
            .collect();

        let next_token = if index + 1 < self.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }
}

struct FailingLister;

#[async_trait]
impl ObjectLister for FailingLister {
    async fn list_page(&self, request: &ListRequest) -> PfResult<ListPage> {
        Err(PfError::Listing {
            prefix: request.prefix.clone(),
            message: "connection reset".to_string(),
        })
    }
}

#[derive(Default)]
struct FakeFetcher {
    responses: HashMap<String, Result<String, u16>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn with(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> PfResult<String> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(PfError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(PfError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap()
}

fn mrms(key_time: &str, modified: DateTime<Utc>) -> ObjectEntry {
    ObjectEntry::new(
        format!(
            "CONUS/MergedBaseReflectivity_00.50/20250101/MRMS_MergedBaseReflectivity_00.50_20250101-{}.grib2.gz",
            key_time
        ),
        modified,
    )
}

const MRMS_PRODUCT: &str = "CONUS/MergedBaseReflectivity_00.50";

// ============================================================================
// Cursor listing
// ============================================================================

#[tokio::test]
async fn test_cursor_listing_picks_max_across_pages() {
    let lister = FakeLister::new(vec![
        vec![mrms("000040", at(0, 1, 0)), mrms("000240", at(0, 9, 0))],
        vec![],
        vec![mrms("000440", at(0, 5, 0))],
    ]);
    let tracker = CursorListingTracker::new(lister.clone(), "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));

    let target = tracker.poll_at(&mut cursor, at(0, 10, 0)).await.unwrap().unwrap();

    assert!(target.identifier.ends_with("20250101-000240.grib2.gz"));
    assert_eq!(
        target.url,
        format!("https://noaa-mrms-pds.s3.amazonaws.com/{}", target.identifier)
    );
    assert_eq!(cursor.last_seen(), Some(target.identifier.as_str()));
    assert_eq!(lister.requests().len(), 3);
}

#[tokio::test]
async fn test_cursor_listing_equal_times_later_entry_wins() {
    let same = at(0, 5, 0);

    let within_page = FakeLister::new(vec![vec![mrms("000040", same), mrms("000240", same)]]);
    let tracker = CursorListingTracker::new(within_page, "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));
    let target = tracker.poll_at(&mut cursor, at(0, 6, 0)).await.unwrap().unwrap();
    assert!(target.identifier.ends_with("-000240.grib2.gz"));

    let across_pages = FakeLister::new(vec![vec![mrms("000040", same)], vec![mrms("000240", same)]]);
    let tracker = CursorListingTracker::new(across_pages, "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));
    let target = tracker.poll_at(&mut cursor, at(0, 6, 0)).await.unwrap().unwrap();
    assert!(target.identifier.ends_with("-000240.grib2.gz"));
}

#[tokio::test]
async fn test_cursor_listing_prefix_and_start_after() {
    let lister = FakeLister::new(vec![vec![
        mrms("000040", at(0, 1, 0)),
        mrms("000240", at(0, 3, 0)),
    ]]);
    let tracker = CursorListingTracker::new(lister.clone(), "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));

    tracker.poll_at(&mut cursor, at(0, 4, 0)).await.unwrap();
    tracker.poll_at(&mut cursor, at(0, 5, 0)).await.unwrap();

    let requests = lister.requests();
    assert_eq!(requests[0].prefix, "CONUS/MergedBaseReflectivity_00.50/20250101/");
    assert_eq!(requests[0].start_after, None);
    assert_eq!(requests[1].start_after.as_deref(), cursor.last_seen());
}

#[tokio::test]
async fn test_cursor_listing_repoll_without_new_objects() {
    let lister = FakeLister::new(vec![vec![mrms("000040", at(0, 1, 0))]]);
    let tracker = CursorListingTracker::new(lister, "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));

    assert!(tracker.poll_at(&mut cursor, at(0, 2, 0)).await.unwrap().is_some());
    let seen = cursor.last_seen().map(str::to_string);

    for _ in 0..3 {
        assert!(tracker.poll_at(&mut cursor, at(0, 3, 0)).await.unwrap().is_none());
    }
    assert_eq!(cursor.last_seen().map(str::to_string), seen);
    assert_eq!(cursor.advances(), 1);
}

#[tokio::test]
async fn test_cursor_listing_empty_is_not_an_error() {
    let lister = FakeLister::new(vec![vec![], vec![]]);
    let tracker = CursorListingTracker::new(lister, "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));

    assert!(tracker.poll_at(&mut cursor, at(0, 2, 0)).await.unwrap().is_none());
    assert_eq!(cursor.last_seen(), None);
}

#[tokio::test]
async fn test_listing_failure_leaves_cursor_unchanged() {
    let tracker = CursorListingTracker::new(Arc::new(FailingLister), "noaa-mrms-pds", MRMS_PRODUCT);
    let mut cursor = FeedCursor::new(SourceKind::CursorListing, Duration::from_secs(10));
    cursor.advance("CONUS/MergedBaseReflectivity_00.50/20250101/a");

    let err = tracker.poll_at(&mut cursor, at(0, 2, 0)).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(
        cursor.last_seen(),
        Some("CONUS/MergedBaseReflectivity_00.50/20250101/a")
    );
}

// ============================================================================
// Index offset
// ============================================================================

const HRRR_KEY: &str = "hrrr.20250101/conus/hrrr.t11z.wrfsfcf00.grib2";
const HRRR_URL: &str =
    "https://noaa-hrrr-bdp-pds.s3.amazonaws.com/hrrr.20250101/conus/hrrr.t11z.wrfsfcf00.grib2";

const HRRR_IDX: &str = "\
1:0:d=2025010111:REFC:entire atmosphere:anl:
2:405627:d=2025010111:RETOP:cloud top:anl:
3:611046:d=2025010111:VIL:entire atmosphere:anl:
";

fn hrrr_tracker(lister: Arc<FakeLister>, fetcher: Arc<FakeFetcher>) -> IndexOffsetTracker {
    IndexOffsetTracker::new(
        lister,
        fetcher,
        "noaa-hrrr-bdp-pds",
        "hrrr.%Y%m%d/conus/hrrr.t%Hz.",
        KeyShape::new("wrfsfc"),
        vec!["REFC".to_string(), "VIL".to_string()],
    )
}

#[tokio::test]
async fn test_index_offset_resolves_products() {
    let lister = FakeLister::new(vec![vec![
        ObjectEntry::new(HRRR_KEY, at(11, 50, 0)),
        ObjectEntry::new(format!("{}.idx", HRRR_KEY), at(11, 51, 0)),
        ObjectEntry::new(
            "hrrr.20250101/conus/hrrr.t11z.wrfprsf00.grib2",
            at(11, 52, 0),
        ),
    ]]);
    let fetcher = Arc::new(FakeFetcher::default().with(&format!("{}.idx", HRRR_URL), HRRR_IDX));
    let tracker = hrrr_tracker(lister.clone(), fetcher.clone());
    let mut cursor = FeedCursor::new(SourceKind::IndexOffset, Duration::from_secs(60));

    let target = tracker.poll_at(&mut cursor, at(12, 5, 0)).await.unwrap().unwrap();

    assert_eq!(lister.requests()[0].prefix, "hrrr.20250101/conus/hrrr.t11z.");
    assert_eq!(target.url, HRRR_URL);
    assert_eq!(target.offset_for(Some("REFC")), 0);
    assert_eq!(target.offset_for(Some("VIL")), 611046);
    assert_eq!(cursor.last_seen(), Some(HRRR_KEY));
}

#[tokio::test]
async fn test_index_fetch_failure_leaves_cursor_unchanged() {
    let lister = FakeLister::new(vec![vec![ObjectEntry::new(HRRR_KEY, at(11, 50, 0))]]);
    let fetcher = Arc::new(FakeFetcher::default().with_status(&format!("{}.idx", HRRR_URL), 503));
    let tracker = hrrr_tracker(lister, fetcher);
    let mut cursor = FeedCursor::new(SourceKind::IndexOffset, Duration::from_secs(60));

    let err = tracker.poll_at(&mut cursor, at(12, 5, 0)).await.unwrap_err();
    assert!(matches!(err, PfError::Status { status: 503, .. }));
    assert_eq!(cursor.last_seen(), None);
}

#[tokio::test]
async fn test_malformed_index_fails_poll() {
    let lister = FakeLister::new(vec![vec![ObjectEntry::new(HRRR_KEY, at(11, 50, 0))]]);
    let fetcher = Arc::new(FakeFetcher::default().with(
        &format!("{}.idx", HRRR_URL),
        "1:zero:d=2025010111:REFC:entire atmosphere:anl:\n",
    ));
    let tracker = hrrr_tracker(lister, fetcher);
    let mut cursor = FeedCursor::new(SourceKind::IndexOffset, Duration::from_secs(60));

    let err = tracker.poll_at(&mut cursor, at(12, 5, 0)).await.unwrap_err();
    assert!(matches!(err, PfError::IndexParse { .. }));
    assert_eq!(cursor.last_seen(), None);
}

// ============================================================================
// Date probe
// ============================================================================

const RTMA_TEMPLATE: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/rtma/prod/rtma2p5_ru.%Y%m%d/rtma2p5_ru.t%H%Mz.2dvaranl_ndfd.grb2";
const RTMA_DIR: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/rtma/prod/rtma2p5_ru.20250101/";

fn rtma_listing(files: &[&str]) -> String {
    files
        .iter()
        .map(|f| format!("<a href=\"{f}\">{f}</a>   01-Jan-2025 12:00  11M\n"))
        .collect()
}

#[tokio::test]
async fn test_date_probe_expected_url() {
    let tracker = DateProbeTracker::new(
        Arc::new(FakeFetcher::default()),
        RTMA_TEMPLATE,
        Cadence::Minutes(15),
        17,
    );
    // 12:10 - 17min = 11:53 -> 11:45
    assert_eq!(
        tracker.expected_url(at(12, 10, 0)).unwrap(),
        format!("{}rtma2p5_ru.t1145z.2dvaranl_ndfd.grb2", RTMA_DIR)
    );
}

#[tokio::test]
async fn test_date_probe_present_then_repeated() {
    let fetcher = Arc::new(
        FakeFetcher::default().with(
            RTMA_DIR,
            &rtma_listing(&[
                "rtma2p5_ru.t1145z.2dvaranl_ndfd.grb2",
                "rtma2p5_ru.t1145z.2dvaranl_ndfd.grb2.idx",
            ]),
        ),
    );
    let tracker = DateProbeTracker::new(fetcher.clone(), RTMA_TEMPLATE, Cadence::Minutes(15), 17);
    let mut cursor = FeedCursor::new(SourceKind::DateProbe, Duration::from_secs(60));

    let target = tracker.poll_at(&mut cursor, at(12, 10, 0)).await.unwrap().unwrap();
    assert!(target.url.ends_with("rtma2p5_ru.t1145z.2dvaranl_ndfd.grb2"));
    assert_eq!(cursor.last_seen(), Some(target.url.as_str()));

    assert!(tracker.poll_at(&mut cursor, at(12, 12, 0)).await.unwrap().is_none());
    // The repeated URL is recognised before any request is made
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_date_probe_absent_file() {
    let fetcher = Arc::new(FakeFetcher::default().with(
        RTMA_DIR,
        &rtma_listing(&["rtma2p5_ru.t1130z.2dvaranl_ndfd.grb2"]),
    ));
    let tracker = DateProbeTracker::new(fetcher, RTMA_TEMPLATE, Cadence::Minutes(15), 17);
    let mut cursor = FeedCursor::new(SourceKind::DateProbe, Duration::from_secs(60));

    assert!(tracker.poll_at(&mut cursor, at(12, 10, 0)).await.unwrap().is_none());
    assert_eq!(cursor.last_seen(), None);
}

#[tokio::test]
async fn test_date_probe_missing_directory_is_no_change() {
    let tracker = DateProbeTracker::new(
        Arc::new(FakeFetcher::default()),
        RTMA_TEMPLATE,
        Cadence::Minutes(15),
        17,
    );
    let mut cursor = FeedCursor::new(SourceKind::DateProbe, Duration::from_secs(60));
    assert!(tracker.poll_at(&mut cursor, at(12, 10, 0)).await.unwrap().is_none());
}

// ============================================================================
// Enum dispatch
// ============================================================================

#[tokio::test]
async fn test_periodic_always_changes() {
    let tracker = FreshnessTracker::Periodic {
        url: "https://example.com/latest.grib2".to_string(),
    };
    let mut cursor = tracker.new_cursor(Duration::from_secs(120));
    assert_eq!(cursor.kind(), SourceKind::Periodic);

    for _ in 0..2 {
        let target = tracker
            .poll(&mut cursor, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.url, "https://example.com/latest.grib2");
    }
    assert_eq!(cursor.advances(), 2);
}

struct StalledLister;

#[async_trait]
impl ObjectLister for StalledLister {
    async fn list_page(&self, _request: &ListRequest) -> PfResult<ListPage> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ListPage::default())
    }
}

#[tokio::test]
async fn test_poll_times_out() {
    let tracker = FreshnessTracker::CursorListing(CursorListingTracker::new(
        Arc::new(StalledLister),
        "noaa-mrms-pds",
        MRMS_PRODUCT,
    ));
    let mut cursor = tracker.new_cursor(Duration::from_secs(10));

    let err = tracker
        .poll(&mut cursor, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PfError::Timeout(_)));
    assert_eq!(cursor.last_seen(), None);
}
