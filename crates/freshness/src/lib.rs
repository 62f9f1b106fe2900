//! Freshness detection for upstream GRIB feeds.
//!
//! Each tracker answers one question per poll: is there newer upstream data
//! than the feed's cursor records, and if so, where is it? Listing and HTTP
//! access go through the [`ObjectLister`] and [`TextFetcher`] traits so the
//! selection logic runs against synthetic responses in tests.

pub mod cursor;
pub mod cursor_listing;
pub mod date_probe;
pub mod fetch;
pub mod index;
pub mod index_offset;
pub mod listing;
pub mod target;
pub mod tracker;

pub use cursor::{FeedCursor, SourceKind};
pub use cursor_listing::CursorListingTracker;
pub use date_probe::{Cadence, DateProbeTracker};
pub use fetch::{HttpFetcher, TextFetcher};
pub use index::IndexOffsetMap;
pub use index_offset::{IndexOffsetTracker, KeyShape};
pub use listing::{ListPage, ListRequest, ObjectEntry, ObjectLister, S3Lister};
pub use target::FetchTarget;
pub use tracker::FreshnessTracker;
