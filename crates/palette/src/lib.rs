//! Palette engine: parses color tables and maps measurements to RGBA.
//!
//! Color tables are the line-oriented `name: value` format used by
//! GRLevelX/Supercell-Wx palettes (`Color:`, `Color4:`, `SolidColor:`, ...).

pub mod color;
pub mod error;
pub mod parse;
pub mod table;

pub use color::Rgba;
pub use error::{PaletteError, PaletteResult};
pub use table::{Breakpoint, PaletteTable};
