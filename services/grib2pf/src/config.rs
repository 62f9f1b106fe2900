//! Configuration loading for feeds.
//!
//! Loads one feed per YAML file from config/feeds/

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use freshness::Cadence;
use grib2pf_common::{ImageArea, RenderMode};

/// Root configuration loaded from a feed YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Bound on every network call of a poll, and passed to the render engine
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Whether the payload is gzip-compressed (MRMS `.grib2.gz`)
    #[serde(default = "default_gzipped")]
    pub gzipped: bool,
    /// `RefreshSeconds` written into placefiles
    #[serde(default = "default_refresh")]
    pub refresh_secs: u32,
    #[serde(default)]
    pub threshold: Option<u32>,
    pub source: SourceConfig,
    pub outputs: Vec<OutputConfig>,
}

fn default_title() -> String {
    "GRIB Placefile".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_gzipped() -> bool {
    true
}

fn default_refresh() -> u32 {
    15
}

/// Where a feed's upstream data comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Newest object under `{product}/{YYYYMMDD}/` (MRMS)
    CursorListing {
        #[serde(default = "default_mrms_bucket")]
        bucket: String,
        product: String,
        #[serde(default = "default_region")]
        region: String,
    },
    /// Newest multi-message payload plus its `.idx` inventory (HRRR)
    IndexOffset {
        #[serde(default = "default_hrrr_bucket")]
        bucket: String,
        /// strftime template, e.g. `hrrr.%Y%m%d/conus/hrrr.t%Hz.`
        prefix_template: String,
        file_token: String,
        #[serde(default = "default_extension")]
        extension: String,
        #[serde(default = "default_index_suffix")]
        index_suffix: String,
        #[serde(default = "default_lookback_hours")]
        lookback_hours: i64,
        #[serde(default = "default_region")]
        region: String,
    },
    /// URL computed from the clock, confirmed by a directory listing (NOMADS)
    DateProbe {
        url_template: String,
        cadence: Cadence,
        #[serde(default)]
        latency_minutes: i64,
    },
    /// Fixed URL regenerated every poll interval
    Periodic { url: String },
    /// Precipitation-type flag combined with reflectivity (MRMS)
    TypedReflectivity {
        #[serde(default = "default_mrms_bucket")]
        bucket: String,
        #[serde(default = "default_type_product")]
        type_product: String,
        #[serde(default = "default_refl_product")]
        refl_product: String,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default)]
        snow_palette: Option<PathBuf>,
        #[serde(default)]
        hail_palette: Option<PathBuf>,
    },
}

fn default_mrms_bucket() -> String {
    "noaa-mrms-pds".to_string()
}

fn default_hrrr_bucket() -> String {
    "noaa-hrrr-bdp-pds".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_extension() -> String {
    ".grib2".to_string()
}

fn default_index_suffix() -> String {
    ".idx".to_string()
}

fn default_lookback_hours() -> i64 {
    1
}

fn default_type_product() -> String {
    "CONUS/PrecipFlag_00.00".to_string()
}

fn default_refl_product() -> String {
    "CONUS/MergedBaseReflectivity_00.50".to_string()
}

impl SourceConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceConfig::CursorListing { .. } => "cursor_listing",
            SourceConfig::IndexOffset { .. } => "index_offset",
            SourceConfig::DateProbe { .. } => "date_probe",
            SourceConfig::Periodic { .. } => "periodic",
            SourceConfig::TypedReflectivity { .. } => "typed_reflectivity",
        }
    }
}

/// One rendered image (or quadrant set) and the placefile that shows it.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub image_file: PathBuf,
    pub place_file: PathBuf,
    /// URL the viewer fetches the image from; defaults to the image path
    #[serde(default)]
    pub image_url: Option<String>,
    /// Color table path; the built-in reflectivity gradient when absent
    #[serde(default)]
    pub palette: Option<PathBuf>,
    /// Message to render from a multi-message payload (index-offset feeds)
    #[serde(default)]
    pub product: Option<String>,
    /// Overrides the feed title in this output's placefile
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub mode: RenderMode,
    /// Values below this are left transparent
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub contour: bool,
    /// Crop box; the full grid when absent
    #[serde(default)]
    pub area: Option<ImageArea>,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

impl FeedConfig {
    /// Load a feed configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FeedConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!(feed = %config.id, path = %path.display(), "Loaded feed config");
        Ok(config)
    }

    /// Checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("feed id must not be empty");
        }
        if self.outputs.is_empty() {
            bail!("feed '{}' has no outputs", self.id);
        }
        if self.poll_interval_secs == 0 {
            bail!("feed '{}' has a zero poll interval", self.id);
        }

        for output in &self.outputs {
            if output.width == 0 || output.height == 0 {
                bail!(
                    "feed '{}' output {} has a zero image dimension",
                    self.id,
                    output.image_file.display()
                );
            }
        }

        match &self.source {
            SourceConfig::IndexOffset { .. } => {
                if let Some(output) = self.outputs.iter().find(|o| o.product.is_none()) {
                    bail!(
                        "feed '{}' output {} needs a product for an index_offset source",
                        self.id,
                        output.image_file.display()
                    );
                }
            }
            SourceConfig::DateProbe {
                cadence: Cadence::Minutes(0),
                ..
            } => bail!("feed '{}' has a zero-minute cadence", self.id),
            SourceConfig::DateProbe {
                cadence: Cadence::DailyRuns(runs),
                ..
            } => {
                if runs.is_empty() || runs.iter().any(|h| *h > 23) {
                    bail!("feed '{}' run hours must be within 0-23", self.id);
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Products requested from multi-message payloads, in output order.
    pub fn products(&self) -> Vec<String> {
        let mut products: Vec<String> = Vec::new();
        for product in self.outputs.iter().filter_map(|o| o.product.as_ref()) {
            if !products.contains(product) {
                products.push(product.clone());
            }
        }
        products
    }
}

/// Load all enabled feed configurations from a directory.
pub fn load_feed_configs(config_dir: &Path) -> Result<Vec<FeedConfig>> {
    let feeds_dir = config_dir.join("feeds");

    if !feeds_dir.exists() {
        warn!(path = %feeds_dir.display(), "Feeds config directory not found");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&feeds_dir)
        .with_context(|| format!("Failed to read {}", feeds_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    paths.sort();

    let mut configs: Vec<FeedConfig> = Vec::new();

    for path in paths {
        match FeedConfig::load(&path) {
            Ok(config) => {
                if !config.enabled {
                    debug!(feed = %config.id, "Skipping disabled feed");
                    continue;
                }
                if configs.iter().any(|c| c.id == config.id) {
                    warn!(feed = %config.id, path = %path.display(), "Duplicate feed id, skipping");
                    continue;
                }
                info!(
                    feed = %config.id,
                    source = config.source.type_name(),
                    outputs = config.outputs.len(),
                    "Loaded feed configuration"
                );
                configs.push(config);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "Failed to load feed config");
            }
        }
    }

    info!(count = configs.len(), "Loaded feed configurations");
    Ok(configs)
}
