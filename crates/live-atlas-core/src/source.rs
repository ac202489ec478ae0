use crate::error::{AtlasError, Result};
use image::RgbaImage;
use std::path::PathBuf;

/// Where region pixels come from.
///
/// An explicit tagged union instead of runtime type sniffing: `Surface`
/// carries pre-rendered surface content, which is never trimmed (the content
/// was composed deliberately, transparent margins included).
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Already-decoded raster pixels.
    Raster(RgbaImage),
    /// Encoded image bytes embedded in memory.
    Bytes(Vec<u8>),
    /// External file reference, decoded on load.
    Path(PathBuf),
    /// Pixels captured from a render surface; inserted untrimmed.
    Surface(RgbaImage),
}

impl ImageSource {
    /// Whether transparent margins of this source may be trimmed away.
    pub fn trimmable(&self) -> bool {
        !matches!(self, ImageSource::Surface(_))
    }
}

/// Fetch-and-decode seam the atlas engine consumes. Host adapters implement
/// this; failures surface as [`AtlasError::Load`] and leave the affected
/// key's placeholder in place.
pub trait ResourceLoader {
    async fn load(&self, key: &str, source: &ImageSource) -> Result<RgbaImage>;
}

/// Built-in loader: selects the decode path by source variant. Raster and
/// surface content passes through; byte and path sources are decoded with
/// the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeLoader;

impl DecodeLoader {
    fn load_error(key: &str, reason: impl ToString) -> AtlasError {
        AtlasError::Load {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ResourceLoader for DecodeLoader {
    async fn load(&self, key: &str, source: &ImageSource) -> Result<RgbaImage> {
        match source {
            ImageSource::Raster(img) | ImageSource::Surface(img) => Ok(img.clone()),
            ImageSource::Bytes(bytes) => Ok(image::load_from_memory(bytes)
                .map_err(|e| Self::load_error(key, e))?
                .to_rgba8()),
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| Self::load_error(key, e))?;
                Ok(image::load_from_memory(&bytes)
                    .map_err(|e| Self::load_error(key, e))?
                    .to_rgba8())
            }
        }
    }
}
