use crate::error::{AtlasError, Result};
use crate::packer::PackerState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    pub fn area(&self) -> u64 {
        (self.w as u64) * (self.h as u64)
    }
    /// Returns true if `r` lies fully inside `self`.
    pub fn contains(&self, r: &Rect) -> bool {
        r.x >= self.x
            && r.y >= self.y
            && r.x + r.w <= self.x + self.w
            && r.y + r.h <= self.y + self.h
    }
    /// Returns true if the two rectangles share any pixel.
    pub fn intersects(&self, r: &Rect) -> bool {
        !(self.x >= r.x + r.w || r.x >= self.x + self.w || self.y >= r.y + r.h || r.y >= self.y + self.h)
    }
}

/// Content bounding box found by transparency trimming: offset of the
/// content within the original source plus both sets of dimensions.
///
/// `trimmed_width == trimmed_height == 0` is the fully-transparent sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrimInfo {
    pub x: u32,
    pub y: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub trimmed_width: u32,
    pub trimmed_height: u32,
}

impl TrimInfo {
    /// True for the fully-transparent sentinel.
    pub fn is_empty(&self) -> bool {
        self.trimmed_width == 0 || self.trimmed_height == 0
    }
}

/// A named, addressable rectangle on the atlas surface.
///
/// `width`/`height` are content dimensions (trim-adjusted, padding excluded).
/// `trim` is `None` for untrimmed insertions and placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub key: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub trim: Option<TrimInfo>,
}

impl Region {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// One region as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SerializedFrame {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub trim: Option<TrimInfo>,
}

/// Stable wire/file shape produced by `DynamicAtlas::serialize` and consumed
/// by `DynamicAtlas::restore`. The `image` payload is PNG-encoded surface
/// pixels; `packer_data` is the versioned packer snapshot that lets a
/// restored atlas resume packing without a forced repack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedAtlas {
    pub frames: BTreeMap<String, SerializedFrame>,
    pub image: Vec<u8>,
    pub packer_data: PackerState,
}

impl SerializedAtlas {
    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AtlasError::Encode(e.to_string()))
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| AtlasError::MalformedData(e.to_string()))
    }
}

/// Statistics about the current atlas occupancy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtlasStats {
    /// Total region table entries, placeholders included.
    pub num_regions: usize,
    /// Entries still at their degenerate 1x1 placeholder rect.
    pub num_placeholders: usize,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Total content area of packed regions.
    pub used_area: u64,
    /// used_area / surface area (0.0 to 1.0).
    pub occupancy: f64,
}

impl AtlasStats {
    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Regions: {} ({} placeholders), Surface: {}x{}, Occupancy: {:.2}%",
            self.num_regions,
            self.num_placeholders,
            self.surface_width,
            self.surface_height,
            self.occupancy * 100.0,
        )
    }
}
