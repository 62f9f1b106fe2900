//! Republishes GRIB-derived imagery and Supercell-Wx placefiles.
//!
//! Each configured feed polls its upstream source for new data, and on
//! every change runs the external render engine, publishes the images it
//! wrote and rewrites the feed's placefiles:
//!
//! ```text
//! FreshnessTracker --FetchTarget--> CompositeGate --> FeedSupervisor --> RenderEngine
//!                                                          |
//!                                                          +--> images + placefile
//! ```

pub mod composite;
pub mod config;
pub mod engine;
pub mod feed;
pub mod metrics;
pub mod plan;
pub mod supervisor;

pub use composite::CompositeGate;
pub use config::{load_feed_configs, FeedConfig, OutputConfig, SourceConfig};
pub use engine::{
    MessageRequest, ProcessRenderEngine, RenderEngine, RenderRequest, RenderResponse, RenderSource,
};
pub use feed::{FeedInput, FeedRunner, SourceShape};
pub use plan::{FeedPlan, OutputPlan};
pub use supervisor::{FeedSupervisor, JobOutcome, JobStatus};
