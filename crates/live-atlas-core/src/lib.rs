//! Growable runtime texture atlas.
//!
//! A single pixel surface into which independently-arriving images are
//! trimmed, shelf-packed and drawn on demand:
//! - `trim`: minimal bounding box of non-transparent content
//! - `packer`: shelf bin packing with reference-counted release and reuse
//! - `surface`: the live pixel surface with preserve-resize-restore growth
//! - `atlas`: the engine tying the three together behind a region table,
//!   with removal, lossless repack and round-trip serialization
//!
//! Quick example:
//! ```ignore
//! use image::RgbaImage;
//! use live_atlas_core::{AtlasConfig, DynamicAtlas};
//! # fn main() -> live_atlas_core::Result<()> {
//! let atlas = DynamicAtlas::new(AtlasConfig::default())?;
//! atlas.insert_pixels("hero", &RgbaImage::new(32, 32), false)?;
//! let data = atlas.serialize()?;
//! println!("{} regions", data.frames.len());
//! # Ok(()) }
//! ```

pub mod atlas;
pub mod config;
pub mod error;
pub mod model;
pub mod packer;
pub mod source;
pub mod spritesheet;
pub mod surface;
pub mod trim;

pub use atlas::DynamicAtlas;
pub use config::{AtlasConfig, AtlasConfigBuilder};
pub use error::{AtlasError, Result};
pub use model::{AtlasStats, Rect, Region, SerializedAtlas, SerializedFrame, TrimInfo};
pub use packer::{Bin, PackRequest, PackerState, Shelf, ShelfPacker};
pub use source::{DecodeLoader, ImageSource, ResourceLoader};
pub use spritesheet::SheetSpec;
pub use surface::Surface;
pub use trim::trim_rgba;

/// Convenience prelude for common types and functions.
pub mod prelude {
    pub use crate::atlas::DynamicAtlas;
    pub use crate::config::{AtlasConfig, AtlasConfigBuilder};
    pub use crate::error::{AtlasError, Result};
    pub use crate::model::{AtlasStats, Rect, Region, SerializedAtlas, SerializedFrame, TrimInfo};
    pub use crate::packer::{Bin, PackRequest, PackerState, ShelfPacker};
    pub use crate::source::{DecodeLoader, ImageSource, ResourceLoader};
    pub use crate::spritesheet::SheetSpec;
    pub use crate::surface::Surface;
    pub use crate::trim::trim_rgba;
}
