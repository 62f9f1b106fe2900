//! Color interpolation modes understood by the render engine.

use serde::{Deserialize, Serialize};

/// How the render engine combines grid cells that fall into one pixel.
///
/// Serialized names match the ones used by existing settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    #[serde(rename = "Average_Data", alias = "average")]
    Average,
    #[default]
    #[serde(rename = "Nearest_Data", alias = "nearest")]
    Nearest,
    #[serde(rename = "Nearest_Fast_Data", alias = "nearest_fast")]
    NearestFast,
    #[serde(rename = "Max_Data", alias = "max")]
    Max,
    #[serde(rename = "Min_Data", alias = "min")]
    Min,
}

impl RenderMode {
    /// Numeric code passed through to the engine.
    pub fn code(&self) -> i32 {
        match self {
            RenderMode::Average => 0,
            RenderMode::Nearest => 1,
            RenderMode::NearestFast => 2,
            RenderMode::Max => 3,
            RenderMode::Min => 4,
        }
    }
}
