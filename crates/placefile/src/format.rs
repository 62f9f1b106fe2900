//! Placefile text rendering and parsing.

use grib2pf_common::ImageArea;

use crate::error::{PlacefileError, PlacefileResult};

/// One image pinned to a geographic area.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacefileImage {
    /// URL or path the viewer loads the image from
    pub image_ref: String,
    pub area: ImageArea,
}

impl PlacefileImage {
    pub fn new(image_ref: impl Into<String>, area: ImageArea) -> Self {
        Self {
            image_ref: image_ref.into(),
            area,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placefile {
    pub title: String,
    pub refresh_secs: u32,
    /// Zoom threshold beyond which the viewer hides the overlay
    pub threshold: Option<u32>,
    pub images: Vec<PlacefileImage>,
}

impl Placefile {
    pub fn new(title: impl Into<String>, refresh_secs: u32) -> Self {
        Self {
            title: title.into(),
            refresh_secs,
            threshold: None,
            images: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: Option<u32>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_image(mut self, image: PlacefileImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from("\n");
        out.push_str(&format!("Title: {}\n", self.title));
        out.push_str(&format!("RefreshSeconds: {}\n", self.refresh_secs));
        if let Some(threshold) = self.threshold {
            out.push_str(&format!("Threshold: {}\n", threshold));
        }

        for image in &self.images {
            let a = &image.area;
            out.push('\n');
            out.push_str(&format!("Image: \"{}\"\n", image.image_ref));
            out.push_str(&vertex(a.lat_top, a.lon_left, 0, 0));
            out.push_str(&vertex(a.lat_top, a.lon_right, 1, 0));
            out.push_str(&vertex(a.lat_bottom, a.lon_right, 1, 1));
            out.push_str(&vertex(a.lat_top, a.lon_left, 0, 0));
            out.push_str(&vertex(a.lat_bottom, a.lon_right, 1, 1));
            out.push_str(&vertex(a.lat_bottom, a.lon_left, 0, 1));
            out.push_str("End:\n");
        }

        out
    }

    /// Parse placefile text, recovering each image's area from its
    /// `(0, 0)` and `(1, 1)` texture corners. Unknown directives are skipped.
    pub fn parse(text: &str) -> PlacefileResult<Self> {
        let mut placefile = Placefile::new("", 0);
        let mut open: Option<OpenImage> = None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if line == "End:" {
                if let Some(image) = open.take() {
                    placefile.images.push(image.finish(line_no)?);
                }
                continue;
            }
            if let Some(image) = open.as_mut() {
                image.add_vertex(line, line_no)?;
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match name.trim() {
                "Title" => placefile.title = value.to_string(),
                "RefreshSeconds" => placefile.refresh_secs = parse_number(value, line_no)?,
                "Threshold" => placefile.threshold = Some(parse_number(value, line_no)?),
                "Image" => {
                    let image_ref = value.trim_matches('"').to_string();
                    open = Some(OpenImage::new(image_ref));
                }
                _ => {}
            }
        }

        if open.is_some() {
            return Err(PlacefileError::Parse {
                line: text.lines().count(),
                message: "Image block without End:".to_string(),
            });
        }

        Ok(placefile)
    }
}

fn vertex(lat: f64, lon: f64, u: u8, v: u8) -> String {
    format!("    {:?}, {:?}, {}, {}\n", lat, lon, u, v)
}

fn parse_number(value: &str, line: usize) -> PlacefileResult<u32> {
    value.parse().map_err(|_| PlacefileError::Parse {
        line,
        message: format!("Expected an integer, found '{}'", value),
    })
}

struct OpenImage {
    image_ref: String,
    top_left: Option<(f64, f64)>,
    bottom_right: Option<(f64, f64)>,
}

impl OpenImage {
    fn new(image_ref: String) -> Self {
        Self {
            image_ref,
            top_left: None,
            bottom_right: None,
        }
    }

    fn add_vertex(&mut self, line: &str, line_no: usize) -> PlacefileResult<()> {
        let bad = || PlacefileError::Parse {
            line: line_no,
            message: format!("Malformed image vertex '{}'", line),
        };

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(bad());
        }

        let lat: f64 = fields[0].parse().map_err(|_| bad())?;
        let lon: f64 = fields[1].parse().map_err(|_| bad())?;
        match (fields[2], fields[3]) {
            ("0", "0") => self.top_left = Some((lat, lon)),
            ("1", "1") => self.bottom_right = Some((lat, lon)),
            _ => {}
        }
        Ok(())
    }

    fn finish(self, line_no: usize) -> PlacefileResult<PlacefileImage> {
        match (self.top_left, self.bottom_right) {
            (Some((lat_top, lon_left)), Some((lat_bottom, lon_right))) => Ok(PlacefileImage::new(
                self.image_ref,
                ImageArea::new(lat_top, lat_bottom, lon_left, lon_right),
            )),
            _ => Err(PlacefileError::Parse {
                line: line_no,
                message: format!("Image '{}' is missing a corner vertex", self.image_ref),
            }),
        }
    }
}
