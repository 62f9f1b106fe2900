//! Resolved per-feed render settings, built once when a feed starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use grib2pf_common::{ImageArea, Quadrant, RenderMode};
use palette::PaletteTable;

use crate::config::{FeedConfig, OutputConfig, SourceConfig};

#[derive(Debug, Clone)]
pub struct OutputPlan {
    pub image_file: PathBuf,
    pub place_file: PathBuf,
    pub image_ref: String,
    pub title: String,
    pub product: Option<String>,
    pub palette: Arc<PaletteTable>,
    pub snow_palette: Option<Arc<PaletteTable>>,
    pub hail_palette: Option<Arc<PaletteTable>>,
    pub width: u32,
    pub height: u32,
    pub mode: RenderMode,
    pub minimum: Option<f64>,
    pub contour: bool,
    pub area: Option<ImageArea>,
}

impl OutputPlan {
    pub fn new(image_file: impl Into<PathBuf>, place_file: impl Into<PathBuf>) -> Self {
        let image_file = image_file.into();
        Self {
            image_ref: image_file.display().to_string(),
            image_file,
            place_file: place_file.into(),
            title: "GRIB Placefile".to_string(),
            product: None,
            palette: Arc::new(PaletteTable::default()),
            snow_palette: None,
            hail_palette: None,
            width: 1920,
            height: 1080,
            mode: RenderMode::default(),
            minimum: None,
            contour: false,
            area: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_image_ref(mut self, image_ref: &str) -> Self {
        self.image_ref = image_ref.to_string();
        self
    }

    pub fn with_product(mut self, product: &str) -> Self {
        self.product = Some(product.to_string());
        self
    }

    pub fn is_tiled(&self) -> bool {
        Quadrant::needs_tiling(self.width, self.height)
    }

    /// Final image paths, one per quadrant when tiled.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        if !self.is_tiled() {
            return vec![self.image_file.clone()];
        }
        Quadrant::ALL
            .iter()
            .map(|q| tiled_path(&self.image_file, *q))
            .collect()
    }

    /// Image references written into the placefile, parallel to [`image_paths`](Self::image_paths).
    pub fn image_refs(&self) -> Vec<String> {
        if !self.is_tiled() {
            return vec![self.image_ref.clone()];
        }
        Quadrant::ALL
            .iter()
            .map(|q| tiled_name(&self.image_ref, *q))
            .collect()
    }
}

/// Insert `_{quadrant}` before the extension of the last path component:
/// `https://host/mrms.png` becomes `https://host/mrms_top_left.png`.
pub fn tiled_name(name: &str, quadrant: Quadrant) -> String {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = file_start + dot;
            format!("{}_{}{}", &name[..dot], quadrant.suffix(), &name[dot..])
        }
        _ => format!("{}_{}", name, quadrant.suffix()),
    }
}

pub fn tiled_path(path: &Path, quadrant: Quadrant) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, quadrant.suffix(), ext.to_string_lossy()),
        None => format!("{}_{}", stem, quadrant.suffix()),
    };
    path.with_file_name(name)
}

/// Everything a feed needs to generate outputs.
#[derive(Debug, Clone)]
pub struct FeedPlan {
    pub id: String,
    pub refresh_secs: u32,
    pub threshold: Option<u32>,
    pub gzipped: bool,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub outputs: Vec<OutputPlan>,
}

impl FeedPlan {
    pub fn new(id: &str, outputs: Vec<OutputPlan>) -> Self {
        Self {
            id: id.to_string(),
            refresh_secs: 15,
            threshold: None,
            gzipped: true,
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            outputs,
        }
    }

    /// Resolve a feed configuration, loading every color table it names.
    ///
    /// A color table that fails to load stops this feed from starting.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let (snow, hail) = match &config.source {
            SourceConfig::TypedReflectivity {
                snow_palette,
                hail_palette,
                ..
            } => (
                load_optional_palette(snow_palette.as_deref())?,
                load_optional_palette(hail_palette.as_deref())?,
            ),
            _ => (None, None),
        };

        let outputs = config
            .outputs
            .iter()
            .map(|output| output_plan(config, output, snow.clone(), hail.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: config.id.clone(),
            refresh_secs: config.refresh_secs,
            threshold: config.threshold,
            gzipped: config.gzipped,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            outputs,
        })
    }
}

fn load_optional_palette(path: Option<&Path>) -> Result<Option<Arc<PaletteTable>>> {
    match path {
        Some(path) => {
            let table = PaletteTable::from_file(path)
                .with_context(|| format!("Failed to load color table {}", path.display()))?;
            Ok(Some(Arc::new(table)))
        }
        None => Ok(None),
    }
}

fn output_plan(
    config: &FeedConfig,
    output: &OutputConfig,
    snow_palette: Option<Arc<PaletteTable>>,
    hail_palette: Option<Arc<PaletteTable>>,
) -> Result<OutputPlan> {
    let palette = PaletteTable::load_or_default(output.palette.as_deref()).with_context(|| {
        format!(
            "Failed to load color table for {}",
            output.image_file.display()
        )
    })?;

    Ok(OutputPlan {
        image_file: output.image_file.clone(),
        place_file: output.place_file.clone(),
        image_ref: output
            .image_url
            .clone()
            .unwrap_or_else(|| output.image_file.display().to_string()),
        title: output.title.clone().unwrap_or_else(|| config.title.clone()),
        product: output.product.clone(),
        palette: Arc::new(palette),
        snow_palette,
        hail_palette,
        width: output.width,
        height: output.height,
        mode: output.mode,
        minimum: output.minimum,
        contour: output.contour,
        area: output.area,
    })
}
