//! Geographic image areas and output quadrants.

use serde::{Deserialize, Serialize};

/// Output dimension (on either axis) above which an image is split into quadrants.
pub const TILE_THRESHOLD: u32 = 2048;

/// The geographic area covered by one rendered image, in degrees.
///
/// Field aliases accept the `top`/`bottom`/`left`/`right` keys used by
/// feed configuration crop boxes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageArea {
    #[serde(alias = "top")]
    pub lat_top: f64,
    #[serde(alias = "bottom")]
    pub lat_bottom: f64,
    #[serde(alias = "left")]
    pub lon_left: f64,
    #[serde(alias = "right")]
    pub lon_right: f64,
}

impl ImageArea {
    pub fn new(lat_top: f64, lat_bottom: f64, lon_left: f64, lon_right: f64) -> Self {
        Self {
            lat_top,
            lat_bottom,
            lon_left,
            lon_right,
        }
    }

    /// Longitudes wrapped into [-180, 180), every corner rounded to 3 decimals.
    pub fn normalized(&self) -> Self {
        Self {
            lat_top: round_coord(self.lat_top),
            lat_bottom: round_coord(self.lat_bottom),
            lon_left: round_coord(normalize_longitude(self.lon_left)),
            lon_right: round_coord(normalize_longitude(self.lon_right)),
        }
    }

    /// True when every corner matches `other` to 3 decimal places.
    pub fn approx_eq(&self, other: &ImageArea) -> bool {
        const EPS: f64 = 0.0005;
        (self.lat_top - other.lat_top).abs() < EPS
            && (self.lat_bottom - other.lat_bottom).abs() < EPS
            && (self.lon_left - other.lon_left).abs() < EPS
            && (self.lon_right - other.lon_right).abs() < EPS
    }
}

/// Wrap a longitude into [-180, 180).
///
/// Grids delivered in 0..360 (MRMS, HRRR) come back from the render engine
/// in that convention.
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon - 180.0).rem_euclid(360.0) - 180.0
}

/// Round a coordinate to 3 decimal places.
pub fn round_coord(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// One quadrant of a tiled output, in the order the render engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopLeft,
        Quadrant::TopRight,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    /// Suffix appended to the file stem of a tiled image.
    pub fn suffix(&self) -> &'static str {
        match self {
            Quadrant::TopLeft => "top_left",
            Quadrant::TopRight => "top_right",
            Quadrant::BottomLeft => "bottom_left",
            Quadrant::BottomRight => "bottom_right",
        }
    }

    /// Whether output of the given dimensions must be split into quadrants.
    pub fn needs_tiling(width: u32, height: u32) -> bool {
        width > TILE_THRESHOLD || height > TILE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_longitude_from_0_360() {
        assert_eq!(normalize_longitude(230.0), -130.0);
        assert!((normalize_longitude(300.005) - -59.995).abs() < 1e-9);
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(0.0), 0.0);
    }

    #[test]
    fn test_normalize_longitude_already_signed() {
        assert_eq!(normalize_longitude(-130.0), -130.0);
        assert_eq!(normalize_longitude(-180.0), -180.0);
        assert_eq!(normalize_longitude(179.5), 179.5);
    }

    #[test]
    fn test_round_coord() {
        assert_eq!(round_coord(54.99499999), 54.995);
        assert_eq!(round_coord(-129.99951), -130.0);
        assert_eq!(round_coord(20.0051), 20.005);
    }

    #[test]
    fn test_area_normalized() {
        let raw = ImageArea::new(54.9950001, 20.0049999, 230.0050001, 299.9949999);
        let area = raw.normalized();
        assert_eq!(area.lat_top, 54.995);
        assert_eq!(area.lat_bottom, 20.005);
        assert_eq!(area.lon_left, -129.995);
        assert_eq!(area.lon_right, -60.005);
    }

    #[test]
    fn test_area_crop_aliases() {
        let yaml = "top: 50.0\nbottom: 20.0\nleft: -130.0\nright: -60.0\n";
        let area: ImageArea = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(area, ImageArea::new(50.0, 20.0, -130.0, -60.0));
    }

    #[test]
    fn test_needs_tiling() {
        assert!(!Quadrant::needs_tiling(1920, 1080));
        assert!(!Quadrant::needs_tiling(2048, 2048));
        assert!(Quadrant::needs_tiling(2049, 1080));
        assert!(Quadrant::needs_tiling(1920, 4096));
    }
}
