//! Common types and utilities shared across the grib2pf crates and service.

pub mod area;
pub mod error;
pub mod mode;
pub mod time;

pub use area::{normalize_longitude, round_coord, ImageArea, Quadrant, TILE_THRESHOLD};
pub use error::{PfError, PfResult};
pub use mode::RenderMode;
pub use time::render_time_template;
