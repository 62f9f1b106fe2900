//! Supercell-Wx placefiles that overlay rendered images on a map.
//!
//! A placefile names each image and pins its corners to latitude/longitude
//! pairs as two textured triangles:
//!
//! ```text
//!
//! Title: MRMS Base Reflectivity
//! RefreshSeconds: 15
//!
//! Image: "https://example.com/mrms.png"
//!     55.0, -130.0, 0, 0
//!     55.0, -60.0, 1, 0
//!     20.0, -60.0, 1, 1
//!     55.0, -130.0, 0, 0
//!     20.0, -60.0, 1, 1
//!     20.0, -130.0, 0, 1
//! End:
//! ```

pub mod error;
pub mod format;
pub mod write;

pub use error::{PlacefileError, PlacefileResult};
pub use format::{Placefile, PlacefileImage};
pub use write::write_atomic;
