use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::model::{AtlasStats, Rect, Region, SerializedAtlas, SerializedFrame};
use crate::packer::{PackRequest, ShelfPacker};
use crate::source::{DecodeLoader, ImageSource, ResourceLoader};
use crate::spritesheet::SheetSpec;
use crate::surface::Surface;
use crate::trim::trim_rgba;
use image::{RgbaImage, imageops};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, instrument, warn};

/// Everything the engine mutates, behind one `RefCell` so that concurrent
/// async insertions can interleave at yield points through a shared
/// reference. No borrow is ever held across an `await`.
struct AtlasState {
    packer: ShelfPacker,
    surface: Surface,
    regions: HashMap<String, Region>,
    groups: HashMap<String, Vec<String>>,
    pending: HashSet<String>,
    dirty: bool,
}

impl AtlasState {
    /// Degenerate 1x1 entry registered before a load resolves, so consumers
    /// referencing the key never hit a missing region.
    fn register_placeholder(&mut self, key: &str) {
        self.regions.insert(
            key.to_string(),
            Region {
                key: key.to_string(),
                x: 0,
                y: 0,
                width: 1,
                height: 1,
                trim: None,
            },
        );
    }

    fn remove_one(&mut self, key: &str, immediate: bool) {
        let Some(_region) = self.regions.remove(key) else {
            return;
        };
        if immediate {
            if let Some(bin) = self.packer.get_bin(key).cloned() {
                self.surface.erase(Rect::new(bin.x, bin.y, bin.w, bin.h));
                self.packer.unref_bin(key);
            }
        }
        debug!(key, immediate, "region removed");
    }
}

/// The atlas engine: orchestrates trimming, shelf packing and the pixel
/// surface behind a single region table.
///
/// All mutation runs on one logical thread; async operations suspend via
/// cooperative yielding only. At most one load pipeline runs per key: a
/// second `add_image` for a key whose load is still in flight observes the
/// placeholder and does not start another pipeline.
pub struct DynamicAtlas<L = DecodeLoader> {
    cfg: AtlasConfig,
    loader: L,
    state: RefCell<AtlasState>,
}

impl DynamicAtlas<DecodeLoader> {
    pub fn new(cfg: AtlasConfig) -> Result<Self> {
        Self::with_loader(cfg, DecodeLoader)
    }
}

impl<L: ResourceLoader> DynamicAtlas<L> {
    pub fn with_loader(cfg: AtlasConfig, loader: L) -> Result<Self> {
        cfg.validate()?;
        let surface = Surface::new(cfg.initial_width, cfg.initial_height);
        Ok(Self::assemble(cfg, loader, surface))
    }

    /// Geometry-only atlas over a backing with no CPU-readable pixels.
    /// Insertions and repacks track regions; serialization fails with
    /// [`AtlasError::ReadbackUnsupported`].
    pub fn with_external_surface(cfg: AtlasConfig, loader: L) -> Result<Self> {
        cfg.validate()?;
        let surface = Surface::external(cfg.initial_width, cfg.initial_height);
        Ok(Self::assemble(cfg, loader, surface))
    }

    fn assemble(cfg: AtlasConfig, loader: L, surface: Surface) -> Self {
        let state = AtlasState {
            packer: ShelfPacker::new(&cfg),
            surface,
            regions: HashMap::new(),
            groups: HashMap::new(),
            pending: HashSet::new(),
            dirty: false,
        };
        Self {
            cfg,
            loader,
            state: RefCell::new(state),
        }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.cfg
    }

    pub fn has_region(&self, key: &str) -> bool {
        self.state.borrow().regions.contains_key(key)
    }

    pub fn region(&self, key: &str) -> Option<Region> {
        self.state.borrow().regions.get(key).cloned()
    }

    /// All region keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.borrow().regions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.state.borrow().regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().regions.is_empty()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        let st = self.state.borrow();
        (st.surface.width(), st.surface.height())
    }

    /// Copy of the pixels currently under `key`'s content rect, or `None`
    /// for unknown keys and non-readable backings.
    pub fn region_pixels(&self, key: &str) -> Option<RgbaImage> {
        let st = self.state.borrow();
        let region = st.regions.get(key)?;
        st.surface.region_pixels(region.rect())
    }

    /// Like [`Self::region_pixels`], but re-inflated to the source's
    /// untrimmed dimensions: the content sits at its trim offset on a
    /// transparent canvas of the original size.
    pub fn region_pixels_untrimmed(&self, key: &str) -> Option<RgbaImage> {
        let content = self.region_pixels(key)?;
        match self.region(key)?.trim {
            Some(t) => {
                let mut full = RgbaImage::new(t.original_width, t.original_height);
                imageops::replace(&mut full, &content, t.x as i64, t.y as i64);
                Some(full)
            }
            None => Some(content),
        }
    }

    pub fn stats(&self) -> AtlasStats {
        let st = self.state.borrow();
        let mut used_area = 0u64;
        let mut num_placeholders = 0usize;
        for (key, region) in &st.regions {
            if st.packer.get_bin(key).is_some() {
                used_area += region.rect().area();
            } else {
                num_placeholders += 1;
            }
        }
        let surface_area = (st.surface.width() as u64) * (st.surface.height() as u64);
        AtlasStats {
            num_regions: st.regions.len(),
            num_placeholders,
            surface_width: st.surface.width(),
            surface_height: st.surface.height(),
            used_area,
            occupancy: if surface_area > 0 {
                used_area as f64 / surface_area as f64
            } else {
                0.0
            },
        }
    }

    /// Synchronous insertion of already-decoded pixels. No-op if `key`
    /// exists and `force` is off; `force` removes the existing region first.
    pub fn insert_pixels(&self, key: &str, pixels: &RgbaImage, force: bool) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.regions.contains_key(key) {
            if !force {
                return Ok(());
            }
            st.remove_one(key, true);
        }
        st.register_placeholder(key);
        self.complete_insert(&mut st, key, pixels, None, true)?;
        Ok(())
    }

    /// Registers a placeholder for `key` immediately, then loads `source`,
    /// trims it and packs/draws the content. A fully transparent or failed
    /// load leaves the placeholder in place.
    pub async fn add_image(&self, key: &str, source: ImageSource, force: bool) -> Result<()> {
        let trimmable = source.trimmable();
        {
            let mut st = self.state.borrow_mut();
            if st.pending.contains(key) {
                debug!(key, "load already in flight, observing placeholder");
                return Ok(());
            }
            if st.regions.contains_key(key) {
                if !force {
                    return Ok(());
                }
                st.remove_one(key, true);
                st.dirty = true;
            }
            st.register_placeholder(key);
            st.pending.insert(key.to_string());
        }

        let loaded = self.loader.load(key, &source).await;

        let mut st = self.state.borrow_mut();
        st.pending.remove(key);
        match loaded {
            Ok(pixels) => {
                self.complete_insert(&mut st, key, &pixels, None, trimmable)?;
                Ok(())
            }
            Err(e) => {
                warn!(key, error = %e, "image load failed, leaving placeholder");
                Err(e)
            }
        }
    }

    /// Loads one source image and registers every cell of `spec` as an
    /// independently trimmed region keyed `"{key}-{name}"`. Yields control
    /// every other cell so a large sheet does not starve other insertions.
    /// Per-cell failures are logged and skipped; sibling cells proceed.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn add_spritesheet(&self, key: &str, source: ImageSource, spec: SheetSpec) -> Result<()> {
        let trimmable = source.trimmable();
        {
            let mut st = self.state.borrow_mut();
            if st.groups.contains_key(key) || st.pending.contains(key) {
                return Ok(());
            }
            st.pending.insert(key.to_string());
        }

        let pixels = match self.loader.load(key, &source).await {
            Ok(p) => p,
            Err(e) => {
                self.state.borrow_mut().pending.remove(key);
                warn!(key, error = %e, "spritesheet load failed");
                return Err(e);
            }
        };

        let (sw, sh) = pixels.dimensions();
        let cells = spec.cells(sw, sh);
        let mut derived: Vec<String> = Vec::with_capacity(cells.len());
        for (i, (name, cell)) in cells.iter().enumerate() {
            let cell_key = format!("{key}-{name}");
            {
                let mut st = self.state.borrow_mut();
                if !st.regions.contains_key(&cell_key) {
                    match self.complete_insert(&mut st, &cell_key, &pixels, Some(*cell), trimmable)
                    {
                        Ok(true) => derived.push(cell_key.clone()),
                        // fully transparent cell: nothing addressable to record
                        Ok(false) => {}
                        Err(e) => {
                            warn!(cell = %cell_key, error = %e, "cell insertion failed, continuing");
                        }
                    }
                }
            }
            if i % 2 == 1 {
                yield_now().await;
            }
        }

        let mut st = self.state.borrow_mut();
        st.pending.remove(key);
        if !derived.is_empty() {
            st.groups.insert(key.to_string(), derived);
        }
        Ok(())
    }

    /// Removes `key` (cascading to a spritesheet's derived regions when
    /// `key` names a sheet). `immediate` erases pixels and releases packer
    /// bins now; otherwise the space is reclaimed by the next `repack`.
    pub fn remove(&self, key: &str, immediate: bool) {
        self.remove_many(&[key], immediate);
    }

    pub fn remove_many(&self, keys: &[&str], immediate: bool) {
        let mut st = self.state.borrow_mut();
        let mut resolved: Vec<String> = Vec::new();
        for key in keys {
            match st.groups.remove(*key) {
                Some(children) => resolved.extend(children),
                None => resolved.push((*key).to_string()),
            }
        }
        for key in &resolved {
            st.remove_one(key, immediate);
        }
        st.dirty = true;
    }

    /// Re-packs every live region into a fresh packer and redraws the
    /// preserved pixel content at the new locations, reapplying each
    /// region's original trim metadata. No-op unless `force` or a prior
    /// removal marked the atlas dirty.
    #[instrument(skip_all)]
    pub fn repack(&self, force: bool) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if !force && !st.dirty {
            return Ok(());
        }
        let st = &mut *st;

        let pad = self.cfg.padding;
        let mut requests = Vec::new();
        for (key, region) in &st.regions {
            // placeholders have no bin and keep their degenerate rect
            if st.packer.get_bin(key).is_some() {
                requests.push(PackRequest {
                    id: key.clone(),
                    w: region.width + pad,
                    h: region.height + pad,
                });
            }
        }

        let mut packer = ShelfPacker::new(&self.cfg);
        let placed = packer.pack(requests);
        for (id, bin) in &placed {
            if bin.is_none() {
                let (width, height) = st
                    .regions
                    .get(id)
                    .map(|r| (r.width + pad, r.height + pad))
                    .unwrap_or((0, 0));
                return Err(AtlasError::OutOfSpace { width, height });
            }
        }

        let snapshot = st.surface.snapshot();
        st.surface.resize_discard(packer.width(), packer.height());
        for (id, bin) in placed {
            let Some(bin) = bin else { continue };
            let Some(region) = st.regions.get_mut(&id) else {
                continue;
            };
            let old = region.rect();
            if let Some(snap) = &snapshot {
                st.surface.blit(snap, bin.x, bin.y, old);
            }
            region.x = bin.x;
            region.y = bin.y;
        }
        st.packer = packer;
        st.dirty = false;
        debug!(
            width = st.surface.width(),
            height = st.surface.height(),
            regions = st.regions.len(),
            "atlas repacked"
        );
        Ok(())
    }

    /// Repacks to a dense layout, then emits the region table, the
    /// PNG-encoded surface and the packer snapshot. Fails with
    /// [`AtlasError::ReadbackUnsupported`] on a non-readable backing.
    pub fn serialize(&self) -> Result<SerializedAtlas> {
        self.repack(true)?;
        let st = self.state.borrow();
        let image = st.surface.encode_png()?;
        let frames = st
            .regions
            .values()
            .map(|r| {
                (
                    r.key.clone(),
                    SerializedFrame {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        trim: r.trim,
                    },
                )
            })
            .collect();
        Ok(SerializedAtlas {
            frames,
            image,
            packer_data: st.packer.state(),
        })
    }

    /// Replaces the whole atlas from serialized form. Everything is decoded
    /// and validated before any live state is touched, so a malformed input
    /// fails atomically and leaves the current atlas intact. A restored
    /// atlas is assumed already packed and is not marked dirty.
    pub fn restore(&self, data: &SerializedAtlas) -> Result<()> {
        let decoded = image::load_from_memory(&data.image)
            .map_err(|e| AtlasError::MalformedData(format!("image payload: {e}")))?
            .to_rgba8();
        let (iw, ih) = decoded.dimensions();

        let packer = ShelfPacker::from_state(&data.packer_data, &self.cfg)?;

        let mut regions = HashMap::with_capacity(data.frames.len());
        for (key, frame) in &data.frames {
            let in_bounds = frame.x.checked_add(frame.width).is_some_and(|r| r <= iw)
                && frame.y.checked_add(frame.height).is_some_and(|b| b <= ih);
            if !in_bounds {
                return Err(AtlasError::MalformedData(format!(
                    "frame `{key}` exceeds image bounds ({iw}x{ih})"
                )));
            }
            if let Some(t) = &frame.trim {
                let trim_ok = t
                    .x
                    .checked_add(t.trimmed_width)
                    .is_some_and(|r| r <= t.original_width)
                    && t.y
                        .checked_add(t.trimmed_height)
                        .is_some_and(|b| b <= t.original_height);
                if !trim_ok || t.trimmed_width != frame.width || t.trimmed_height != frame.height
                {
                    return Err(AtlasError::MalformedData(format!(
                        "frame `{key}` has inconsistent trim metadata"
                    )));
                }
            }
            regions.insert(
                key.clone(),
                Region {
                    key: key.clone(),
                    x: frame.x,
                    y: frame.y,
                    width: frame.width,
                    height: frame.height,
                    trim: frame.trim,
                },
            );
        }

        let mut st = self.state.borrow_mut();
        st.surface = Surface::from_image(decoded);
        st.packer = packer;
        st.regions = regions;
        st.groups.clear();
        st.pending.clear();
        st.dirty = false;
        debug!(regions = st.regions.len(), "atlas restored from serialized form");
        Ok(())
    }

    /// Trim, pack, grow, draw and record one region. Returns `Ok(true)` when
    /// visible content landed, `Ok(false)` when the source was fully
    /// transparent (the caller's placeholder, if any, stays).
    fn complete_insert(
        &self,
        st: &mut AtlasState,
        key: &str,
        pixels: &RgbaImage,
        bounds: Option<Rect>,
        trimmable: bool,
    ) -> Result<bool> {
        // a deferred removal leaves the old bin live with no region entry;
        // re-requesting its id would rebind the stale geometry, so release
        // it before packing fresh
        if let Some(stale) = st.packer.get_bin(key).cloned() {
            st.surface.erase(Rect::new(stale.x, stale.y, stale.w, stale.h));
            st.packer.unref_bin(key);
        }

        let (pw, ph) = pixels.dimensions();
        let full = bounds.unwrap_or(Rect::new(0, 0, pw, ph));

        let trim = if self.cfg.trim && trimmable {
            match trim_rgba(pixels, bounds, self.cfg.trim_threshold) {
                Some(t) => Some(t),
                None => {
                    debug!(key, "empty source buffer, nothing to insert");
                    return Ok(false);
                }
            }
        } else {
            None
        };
        if let Some(t) = &trim {
            if t.is_empty() {
                debug!(key, "fully transparent source, leaving placeholder");
                return Ok(false);
            }
        }
        let (content_w, content_h) = match &trim {
            Some(t) => (t.trimmed_width, t.trimmed_height),
            None => (full.w, full.h),
        };
        if content_w == 0 || content_h == 0 {
            return Ok(false);
        }

        let pad = self.cfg.padding;
        let Some(bin) = st.packer.pack_one(content_w + pad, content_h + pad, key) else {
            warn!(
                key,
                width = content_w + pad,
                height = content_h + pad,
                "packer has no space, skipping insertion"
            );
            return Err(AtlasError::OutOfSpace {
                width: content_w + pad,
                height: content_h + pad,
            });
        };
        st.surface
            .ensure_capacity(st.packer.width(), st.packer.height());

        let (off_x, off_y) = trim.as_ref().map(|t| (t.x, t.y)).unwrap_or((0, 0));
        let src = Rect::new(full.x + off_x, full.y + off_y, content_w, content_h);
        st.surface.blit(pixels, bin.x, bin.y, src);

        st.regions.insert(
            key.to_string(),
            Region {
                key: key.to_string(),
                x: bin.x,
                y: bin.y,
                width: content_w,
                height: content_h,
                trim,
            },
        );
        debug!(key, x = bin.x, y = bin.y, w = content_w, h = content_h, "region inserted");
        Ok(true)
    }
}

/// Suspends the current task once, letting sibling insertions run. The waker
/// is signalled before returning `Pending` so any executor resumes the task.
pub(crate) fn yield_now() -> impl Future<Output = ()> {
    struct YieldNow {
        yielded: bool,
    }
    impl Future for YieldNow {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
    YieldNow { yielded: false }
}
