//! Palette table and color lookup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::color::Rgba;
use crate::error::{PaletteError, PaletteResult};
use crate::parse;

/// A (value, color) anchor point.
///
/// A breakpoint with a `secondary` band is dual-band: interpolation out of it
/// heads toward the secondary color instead of the next breakpoint's color,
/// which renders a discontinuity at the next breakpoint (e.g. rain/snow).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub value: f64,
    pub color: Rgba,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Rgba>,
}

impl Breakpoint {
    pub fn new(value: f64, color: Rgba) -> Self {
        Self {
            value,
            color,
            secondary: None,
        }
    }

    pub fn dual(value: f64, color: Rgba, secondary: Rgba) -> Self {
        Self {
            value,
            color,
            secondary: Some(secondary),
        }
    }
}

/// Immutable palette: sorted breakpoints plus the linear input transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteTable {
    breakpoints: Vec<Breakpoint>,
    scale: f64,
    offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback: Option<Rgba>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,
}

/// Built-in reflectivity gradient (dBZ), used when a feed names no color table.
const REFLECTIVITY_DEFAULT: [(f64, [u8; 3]); 20] = [
    (75.0, [235, 235, 235]),
    (70.0, [153, 85, 201]),
    (65.0, [255, 0, 255]),
    (60.0, [192, 0, 0]),
    (55.0, [214, 0, 0]),
    (50.0, [255, 0, 0]),
    (45.0, [255, 144, 0]),
    (40.0, [231, 192, 0]),
    (35.0, [255, 255, 0]),
    (30.0, [0, 144, 0]),
    (25.0, [0, 200, 0]),
    (20.0, [0, 255, 0]),
    (15.0, [0, 0, 246]),
    (10.0, [1, 160, 246]),
    (5.0, [0, 236, 236]),
    (0.0, [187, 255, 255]),
    (-5.0, [174, 238, 238]),
    (-10.0, [150, 205, 205]),
    (-15.0, [102, 139, 139]),
    (-20.0, [50, 79, 79]),
];

impl PaletteTable {
    /// Build a table from unsorted breakpoints with identity scale/offset.
    pub fn new(breakpoints: Vec<Breakpoint>) -> Self {
        Self::with_transform(breakpoints, 1.0, 0.0)
    }

    /// Build a table applying `value * scale + offset` before lookup.
    ///
    /// Breakpoints are sorted ascending; when two share a value the later one wins.
    pub fn with_transform(mut breakpoints: Vec<Breakpoint>, scale: f64, offset: f64) -> Self {
        breakpoints.retain(|b| b.value.is_finite());
        // Stable sort keeps file order among equal values, so dedup can keep the last.
        breakpoints.sort_by(|a, b| a.value.total_cmp(&b.value));

        let mut deduped: Vec<Breakpoint> = Vec::with_capacity(breakpoints.len());
        for bp in breakpoints {
            match deduped.last_mut() {
                Some(last) if last.value == bp.value => {
                    warn!(value = bp.value, "Duplicate color table value, keeping the later entry");
                    *last = bp;
                }
                _ => deduped.push(bp),
            }
        }

        Self {
            breakpoints: deduped,
            scale,
            offset,
            step: None,
            fallback: None,
            product: None,
            units: None,
        }
    }

    /// The fixed 20-step reflectivity gradient.
    pub fn builtin_reflectivity() -> Self {
        let breakpoints = REFLECTIVITY_DEFAULT
            .iter()
            .map(|&(value, [r, g, b])| Breakpoint::new(value, Rgba::opaque(r, g, b)))
            .collect();
        Self::new(breakpoints)
    }

    /// Parse color table text. `source_name` is only used in error messages.
    pub fn parse(text: &str, source_name: &str) -> PaletteResult<Self> {
        parse::parse_color_table(text, source_name)
    }

    /// Read and parse a color table file.
    pub fn from_file(path: &Path) -> PaletteResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PaletteError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Load `path` if given, otherwise the built-in reflectivity gradient.
    pub fn load_or_default(path: Option<&Path>) -> PaletteResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin_reflectivity()),
        }
    }

    pub(crate) fn set_metadata(
        &mut self,
        step: Option<f64>,
        fallback: Option<Rgba>,
        product: Option<String>,
        units: Option<String>,
    ) {
        self.step = step;
        self.fallback = fallback;
        self.product = product;
        self.units = units;
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Advisory `Step:` value; lookup does not use it.
    pub fn step(&self) -> Option<f64> {
        self.step
    }

    /// Reflectivity-fallback (`RF:`) color.
    pub fn fallback(&self) -> Option<Rgba> {
        self.fallback
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Color for a raw measurement.
    pub fn color_at(&self, measurement: f64) -> Rgba {
        let v = measurement * self.scale + self.offset;

        let (first, last) = match (self.breakpoints.first(), self.breakpoints.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Rgba::TRANSPARENT,
        };

        if v.is_nan() || v < first.value {
            return Rgba::TRANSPARENT;
        }
        if v >= last.value {
            return last.secondary.unwrap_or(last.color);
        }

        // First breakpoint strictly above v; always in 1..len here.
        let idx = self.breakpoints.partition_point(|b| b.value <= v);
        let lower = &self.breakpoints[idx - 1];
        let upper = &self.breakpoints[idx];

        let pos = (v - lower.value) / (upper.value - lower.value);
        let toward = lower.secondary.unwrap_or(upper.color);
        lower.color.lerp(toward, pos)
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::builtin_reflectivity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sorted() {
        let table = PaletteTable::builtin_reflectivity();
        assert_eq!(table.breakpoints().len(), 20);
        assert_eq!(table.breakpoints()[0].value, -20.0);
        assert_eq!(table.breakpoints()[19].value, 75.0);
        assert!(table
            .breakpoints()
            .windows(2)
            .all(|w| w[0].value < w[1].value));
    }

    #[test]
    fn test_duplicate_values_keep_later() {
        let table = PaletteTable::new(vec![
            Breakpoint::new(10.0, Rgba::opaque(1, 1, 1)),
            Breakpoint::new(0.0, Rgba::opaque(0, 0, 0)),
            Breakpoint::new(10.0, Rgba::opaque(2, 2, 2)),
        ]);
        assert_eq!(table.breakpoints().len(), 2);
        assert_eq!(table.breakpoints()[1].color, Rgba::opaque(2, 2, 2));
    }

    #[test]
    fn test_empty_table_transparent() {
        let table = PaletteTable::new(Vec::new());
        assert_eq!(table.color_at(10.0), Rgba::TRANSPARENT);
    }

    #[test]
    fn test_nan_transparent() {
        let table = PaletteTable::builtin_reflectivity();
        assert_eq!(table.color_at(f64::NAN), Rgba::TRANSPARENT);
    }
}
