use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Current `PackerState` schema version.
pub const PACKER_STATE_VERSION: u32 = 1;

/// One reference-counted allocation. `w`/`h` are the requested size of the
/// current occupant; `max_w`/`max_h` are the full extent the slot can hold
/// (the shelf height for shelf allocations), which is what free-bin reuse
/// matches against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub max_w: u32,
    pub max_h: u32,
    pub refcount: u32,
}

/// One horizontal strip of the packed surface. `x` is the next free
/// x-coordinate; `free` is the remaining run length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Shelf {
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub free: u32,
}

impl Shelf {
    fn new(y: u32, width: u32, height: u32) -> Self {
        Self {
            y,
            width,
            height,
            x: 0,
            free: width,
        }
    }
}

/// A size request for batch packing.
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub id: String,
    pub w: u32,
    pub h: u32,
}

/// Versioned snapshot of packer internals, sufficient to resume packing
/// after a round trip without a forced repack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackerState {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub shelves: Vec<Shelf>,
    pub bins: Vec<Bin>,
    pub free_bins: Vec<Bin>,
}

/// Stateful shelf bin packer with reference-counted release and reuse.
///
/// Placement order for a fresh id: exact-size free bin, minimal-waste free
/// bin, existing shelf (exact height preferred, else minimal vertical waste),
/// new shelf, and finally auto-resize with recursive retry. All waste
/// comparisons use strict `<`, so the first candidate found wins ties and
/// results are deterministic for a fixed insertion order.
#[derive(Debug, Clone)]
pub struct ShelfPacker {
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
    auto_resize: bool,
    growth_factor: f32,
    shelves: Vec<Shelf>,
    bins: HashMap<String, Bin>,
    free_bins: Vec<Bin>,
}

impl ShelfPacker {
    pub fn new(cfg: &AtlasConfig) -> Self {
        Self {
            width: cfg.initial_width.max(1),
            height: cfg.initial_height.max(1),
            max_width: cfg.max_width,
            max_height: cfg.max_height,
            auto_resize: cfg.auto_resize,
            growth_factor: cfg.growth_factor,
            shelves: Vec::new(),
            bins: HashMap::new(),
            free_bins: Vec::new(),
        }
    }

    /// Reconstructs a packer from a serialized snapshot. Policy fields come
    /// from `cfg`; geometry comes from the snapshot.
    pub fn from_state(state: &PackerState, cfg: &AtlasConfig) -> Result<Self> {
        if state.version != PACKER_STATE_VERSION {
            return Err(AtlasError::MalformedData(format!(
                "unsupported packer state version {}",
                state.version
            )));
        }
        if state.width == 0 || state.height == 0 {
            return Err(AtlasError::MalformedData(format!(
                "packer dimensions must be non-zero, got {}x{}",
                state.width, state.height
            )));
        }
        let inside = |x: u32, y: u32, w: u32, h: u32| {
            x.checked_add(w).is_some_and(|r| r <= state.width)
                && y.checked_add(h).is_some_and(|b| b <= state.height)
        };
        for shelf in &state.shelves {
            if !inside(0, shelf.y, 0, shelf.height)
                || shelf.x > shelf.width
                || shelf.width > state.width
                || shelf.free != shelf.width - shelf.x
            {
                return Err(AtlasError::MalformedData(format!(
                    "shelf at y={} exceeds packer bounds",
                    shelf.y
                )));
            }
        }
        for bin in state.bins.iter().chain(state.free_bins.iter()) {
            if !inside(bin.x, bin.y, bin.max_w, bin.max_h) {
                return Err(AtlasError::MalformedData(format!(
                    "bin `{}` exceeds packer bounds",
                    bin.id
                )));
            }
        }
        Ok(Self {
            width: state.width,
            height: state.height,
            max_width: cfg.max_width.max(state.width),
            max_height: cfg.max_height.max(state.height),
            auto_resize: cfg.auto_resize,
            growth_factor: cfg.growth_factor,
            shelves: state.shelves.clone(),
            bins: state
                .bins
                .iter()
                .map(|b| (b.id.clone(), b.clone()))
                .collect(),
            free_bins: state.free_bins.clone(),
        })
    }

    /// Snapshot of the packer internals for serialization. Bins are emitted
    /// in id order so the output is deterministic.
    pub fn state(&self) -> PackerState {
        let mut bins: Vec<Bin> = self.bins.values().cloned().collect();
        bins.sort_by(|a, b| a.id.cmp(&b.id));
        PackerState {
            version: PACKER_STATE_VERSION,
            width: self.width,
            height: self.height,
            shelves: self.shelves.clone(),
            bins,
            free_bins: self.free_bins.clone(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }
    pub fn num_free_bins(&self) -> usize {
        self.free_bins.len()
    }
    pub fn bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins.values()
    }

    pub fn get_bin(&self, id: &str) -> Option<&Bin> {
        self.bins.get(id)
    }

    /// Allocates a `w`x`h` slot for `id`. Re-requesting a live id increments
    /// its refcount and returns the existing bin unchanged. Returns `None`
    /// only when auto-resize is off or the configured maxima are exhausted.
    pub fn pack_one(&mut self, w: u32, h: u32, id: &str) -> Option<Bin> {
        if w == 0 || h == 0 {
            return None;
        }
        if let Some(bin) = self.bins.get_mut(id) {
            bin.refcount += 1;
            return Some(bin.clone());
        }

        // free bins: exact size beats everything, else minimal wasted area
        let mut exact: Option<usize> = None;
        let mut best_free: Option<usize> = None;
        let mut best_waste = u64::MAX;
        for (i, fb) in self.free_bins.iter().enumerate() {
            if w == fb.max_w && h == fb.max_h {
                exact = Some(i);
                break;
            }
            if w <= fb.max_w && h <= fb.max_h {
                let waste = (fb.max_w as u64) * (fb.max_h as u64) - (w as u64) * (h as u64);
                if waste < best_waste {
                    best_waste = waste;
                    best_free = Some(i);
                }
            }
        }
        if let Some(i) = exact.or(best_free) {
            return Some(self.alloc_freebin(i, w, h, id));
        }

        // shelves: exact height preferred, else minimal vertical waste
        let mut best_shelf: Option<usize> = None;
        let mut best_shelf_waste = u32::MAX;
        for (i, shelf) in self.shelves.iter().enumerate() {
            if h <= shelf.height && w <= shelf.free {
                let waste = shelf.height - h;
                if waste == 0 {
                    best_shelf = Some(i);
                    break;
                }
                if waste < best_shelf_waste {
                    best_shelf_waste = waste;
                    best_shelf = Some(i);
                }
            }
        }
        if let Some(i) = best_shelf {
            return Some(self.alloc_on_shelf(i, w, h, id));
        }

        // new shelf if vertical room remains
        let next_y = self.shelves.last().map(|s| s.y + s.height).unwrap_or(0);
        if w <= self.width && next_y + h <= self.height {
            self.shelves.push(Shelf::new(next_y, self.width, h));
            let i = self.shelves.len() - 1;
            return Some(self.alloc_on_shelf(i, w, h, id));
        }

        if self.auto_resize {
            if let Some((nw, nh)) = self.grown_dimensions(w, h) {
                debug!(width = nw, height = nh, "growing packer bounds");
                self.resize(nw, nh);
                return self.pack_one(w, h, id);
            }
        }
        None
    }

    /// Batch allocation: sorts descending by height (ties by width, then id
    /// for determinism), packs each item, then shrinks to the used extent.
    pub fn pack(&mut self, mut items: Vec<PackRequest>) -> Vec<(String, Option<Bin>)> {
        items.sort_by(|a, b| {
            b.h.cmp(&a.h)
                .then_with(|| b.w.cmp(&a.w))
                .then_with(|| a.id.cmp(&b.id))
        });
        let out = items
            .iter()
            .map(|r| (r.id.clone(), self.pack_one(r.w, r.h, &r.id)))
            .collect();
        self.shrink();
        out
    }

    /// Increments the refcount of a live bin.
    pub fn ref_bin(&mut self, id: &str) -> Option<u32> {
        let bin = self.bins.get_mut(id)?;
        bin.refcount += 1;
        Some(bin.refcount)
    }

    /// Decrements the refcount; at zero the bin moves to the free list and
    /// leaves the id lookup.
    pub fn unref_bin(&mut self, id: &str) -> Option<u32> {
        let bin = self.bins.get_mut(id)?;
        bin.refcount = bin.refcount.saturating_sub(1);
        let refcount = bin.refcount;
        if refcount == 0 {
            if let Some(freed) = self.bins.remove(id) {
                debug!(id, x = freed.x, y = freed.y, "bin released for reuse");
                self.free_bins.push(freed);
            }
        }
        Some(refcount)
    }

    /// Shrinks the packer bounds to the minimal box covering all shelves and
    /// trims every shelf's free run accordingly.
    pub fn shrink(&mut self) {
        let used_w = self.shelves.iter().map(|s| s.x).max().unwrap_or(0).max(1);
        let used_h = self
            .shelves
            .last()
            .map(|s| s.y + s.height)
            .unwrap_or(0)
            .max(1);
        self.width = used_w;
        self.height = used_h;
        for shelf in &mut self.shelves {
            shelf.width = used_w;
            shelf.free = used_w - shelf.x;
        }
    }

    /// Grows the packer bounds. Widening extends every shelf's free run.
    /// Shrinking is not supported; returns false if either dimension would
    /// shrink.
    pub fn resize(&mut self, w: u32, h: u32) -> bool {
        if w < self.width || h < self.height {
            return false;
        }
        let dw = w - self.width;
        if dw > 0 {
            for shelf in &mut self.shelves {
                shelf.width = w;
                shelf.free += dw;
            }
        }
        self.width = w;
        self.height = h;
        true
    }

    pub fn clear(&mut self) {
        self.shelves.clear();
        self.bins.clear();
        self.free_bins.clear();
    }

    fn alloc_freebin(&mut self, index: usize, w: u32, h: u32, id: &str) -> Bin {
        let mut bin = self.free_bins.swap_remove(index);
        bin.id = id.to_string();
        bin.w = w;
        bin.h = h;
        bin.refcount = 1;
        self.bins.insert(id.to_string(), bin.clone());
        bin
    }

    fn alloc_on_shelf(&mut self, index: usize, w: u32, h: u32, id: &str) -> Bin {
        let shelf = &mut self.shelves[index];
        let bin = Bin {
            id: id.to_string(),
            x: shelf.x,
            y: shelf.y,
            w,
            h,
            max_w: w,
            max_h: shelf.height,
            refcount: 1,
        };
        shelf.x += w;
        shelf.free -= w;
        self.bins.insert(id.to_string(), bin.clone());
        bin
    }

    /// Next bounds when a `w`x`h` request does not fit: grow the narrower
    /// dimension by `growth_factor` (ties grow width first), always enough to
    /// accommodate an oversized request, clamped to the configured maxima.
    /// `None` when both dimensions are already maxed out.
    fn grown_dimensions(&self, w: u32, h: u32) -> Option<(u32, u32)> {
        let stepped = |dim: u32, need: u32, max: u32| {
            (((dim as f32) * self.growth_factor).ceil() as u32)
                .max(need)
                .min(max)
        };
        let grown_w = stepped(self.width, w, self.max_width);
        let grown_h = stepped(self.height, h, self.max_height);

        let prefer_width = if w > self.width {
            true
        } else if h > self.height {
            false
        } else {
            self.width <= self.height
        };

        let (first, second) = if prefer_width {
            ((grown_w, self.height), (self.width, grown_h))
        } else {
            ((self.width, grown_h), (grown_w, self.height))
        };
        if first != (self.width, self.height) {
            return Some(first);
        }
        if second != (self.width, self.height) {
            return Some(second);
        }
        None
    }
}
