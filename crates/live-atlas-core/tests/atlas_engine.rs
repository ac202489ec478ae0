use futures::executor::block_on;
use futures::task::noop_waker;
use image::{Rgba, RgbaImage};
use live_atlas_core::prelude::*;
use std::future::Future;
use std::task::{Context, Poll};

fn opaque(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

/// Resolves on the second poll, signalling its waker first.
fn suspend_once() -> impl Future<Output = ()> {
    let mut yielded = false;
    futures::future::poll_fn(move |cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
}

/// Loader that suspends once before handing back a fixed image, so tests can
/// observe the atlas mid-load.
struct SlowLoader {
    img: RgbaImage,
}

impl ResourceLoader for SlowLoader {
    async fn load(&self, _key: &str, _source: &ImageSource) -> Result<RgbaImage> {
        suspend_once().await;
        Ok(self.img.clone())
    }
}

struct FailLoader;

impl ResourceLoader for FailLoader {
    async fn load(&self, key: &str, _source: &ImageSource) -> Result<RgbaImage> {
        Err(AtlasError::Load {
            key: key.to_string(),
            reason: "synthetic failure".into(),
        })
    }
}

fn small_cfg() -> AtlasConfig {
    AtlasConfig::builder()
        .initial_size(64, 64)
        .max_size(1024, 1024)
        .padding(2)
        .build()
}

#[test]
fn placeholder_is_visible_before_load_resolves() {
    let atlas = DynamicAtlas::with_loader(
        small_cfg(),
        SlowLoader {
            img: opaque(8, 8, [255, 0, 0, 255]),
        },
    )
    .unwrap();

    let mut fut = Box::pin(atlas.add_image("k", ImageSource::Bytes(Vec::new()), false));
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    assert!(fut.as_mut().poll(&mut cx).is_pending());

    // load still in flight: key addressable as a degenerate 1x1 cell
    assert!(atlas.has_region("k"));
    let r = atlas.region("k").unwrap();
    assert_eq!((r.width, r.height), (1, 1));

    block_on(fut).unwrap();
    let r = atlas.region("k").unwrap();
    assert_eq!((r.width, r.height), (8, 8));
}

#[test]
fn concurrent_add_for_same_key_attaches_to_in_flight_load() {
    let atlas = DynamicAtlas::with_loader(
        small_cfg(),
        SlowLoader {
            img: opaque(8, 8, [0, 255, 0, 255]),
        },
    )
    .unwrap();

    let mut first = Box::pin(atlas.add_image("k", ImageSource::Bytes(Vec::new()), false));
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    assert!(first.as_mut().poll(&mut cx).is_pending());

    // second request for the pending key completes immediately as a no-op
    block_on(atlas.add_image("k", ImageSource::Bytes(Vec::new()), true)).unwrap();
    assert_eq!((atlas.region("k").unwrap().width, atlas.region("k").unwrap().height), (1, 1));

    block_on(first).unwrap();
    assert_eq!(atlas.len(), 1);
    assert_eq!(atlas.region("k").unwrap().width, 8);
}

#[test]
fn load_failure_leaves_the_placeholder() {
    let atlas = DynamicAtlas::with_loader(small_cfg(), FailLoader).unwrap();
    let err = block_on(atlas.add_image("broken", ImageSource::Bytes(Vec::new()), false));
    assert!(matches!(err, Err(AtlasError::Load { .. })));
    let r = atlas.region("broken").expect("placeholder survives the failure");
    assert_eq!((r.width, r.height), (1, 1));
}

#[test]
fn duplicate_insert_is_a_noop_without_force() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("k", &opaque(10, 10, [255, 0, 0, 255]), false).unwrap();
    atlas.insert_pixels("k", &opaque(20, 20, [0, 255, 0, 255]), false).unwrap();
    assert_eq!(atlas.region("k").unwrap().width, 10);

    atlas.insert_pixels("k", &opaque(20, 20, [0, 255, 0, 255]), true).unwrap();
    assert_eq!(atlas.region("k").unwrap().width, 20);
    assert_eq!(atlas.len(), 1);
}

#[test]
fn fully_transparent_insert_leaves_placeholder() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("ghost", &RgbaImage::new(16, 16), false).unwrap();
    let r = atlas.region("ghost").unwrap();
    assert_eq!((r.width, r.height), (1, 1));
    assert_eq!(atlas.stats().num_placeholders, 1);
}

#[test]
fn tiny_atlas_grows_to_fit_first_image() {
    let cfg = AtlasConfig::builder()
        .initial_size(1, 1)
        .max_size(1024, 1024)
        .padding(2)
        .build();
    let atlas = DynamicAtlas::new(cfg).unwrap();
    atlas.insert_pixels("big", &opaque(100, 100, [0, 0, 255, 255]), false).unwrap();

    let (sw, sh) = atlas.surface_size();
    assert!(sw >= 102 && sh >= 102);
    let r = atlas.region("big").unwrap();
    assert!(r.x + r.width <= sw && r.y + r.height <= sh);
    assert_eq!((r.width, r.height), (100, 100));
}

#[test]
fn spritesheet_removal_cascades_and_frees_space() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    // 3x2 grid of 10x10 opaque cells
    let sheet = opaque(30, 20, [200, 100, 50, 255]);
    block_on(atlas.add_spritesheet(
        "sheet",
        ImageSource::Raster(sheet),
        SheetSpec::Grid {
            cell_width: 10,
            cell_height: 10,
        },
    ))
    .unwrap();
    assert_eq!(atlas.len(), 6);
    for i in 0..6 {
        assert!(atlas.has_region(&format!("sheet-{i}")));
    }

    let before = atlas.surface_size();
    atlas.remove("sheet", true);
    assert!(atlas.keys().iter().all(|k| !k.starts_with("sheet-")));
    assert_eq!(atlas.len(), 0);

    // released bins satisfy an equal-size insert without growing the surface
    atlas.insert_pixels("reuse", &opaque(10, 10, [1, 2, 3, 255]), false).unwrap();
    assert_eq!(atlas.surface_size(), before);
}

#[test]
fn deferred_removal_is_reclaimed_by_repack() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("keep", &opaque(20, 20, [255, 0, 0, 255]), false).unwrap();
    atlas.insert_pixels("drop", &opaque(20, 20, [0, 255, 0, 255]), false).unwrap();

    atlas.remove("drop", false);
    assert!(!atlas.has_region("drop"));

    atlas.repack(false).unwrap();
    let stats = atlas.stats();
    assert_eq!(stats.num_regions, 1);
    assert_eq!(stats.used_area, 20 * 20);
    // the survivor still reads back intact
    let px = atlas.region_pixels("keep").unwrap();
    assert!(px.pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
}

#[test]
fn readding_after_deferred_removal_packs_fresh() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("a", &opaque(10, 10, [255, 0, 0, 255]), false).unwrap();
    atlas.insert_pixels("b", &opaque(10, 10, [0, 255, 0, 255]), false).unwrap();
    atlas.remove("a", false);

    // the old bin for "a" is still allocated; a larger re-add must not
    // rebind it and redraw over "b"
    atlas.insert_pixels("a", &opaque(30, 30, [0, 0, 255, 255]), false).unwrap();
    let a = atlas.region("a").unwrap().rect();
    let b = atlas.region("b").unwrap().rect();
    assert_eq!((a.w, a.h), (30, 30));
    assert!(!a.intersects(&b), "re-added region overlaps its neighbor");
    let px = atlas.region_pixels("b").unwrap();
    assert!(px.pixels().all(|p| *p == Rgba([0, 255, 0, 255])));
}

#[test]
fn untrimmed_readback_restores_original_margins() {
    let mut img = RgbaImage::new(10, 10);
    for y in 3..7 {
        for x in 3..7 {
            img.put_pixel(x, y, Rgba([9, 9, 9, 255]));
        }
    }
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("sprite", &img, false).unwrap();
    assert_eq!(atlas.region("sprite").unwrap().width, 4);

    let full = atlas.region_pixels_untrimmed("sprite").unwrap();
    assert_eq!(full.dimensions(), (10, 10));
    assert_eq!(*full.get_pixel(3, 3), Rgba([9, 9, 9, 255]));
    assert_eq!(*full.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    assert_eq!(*full.get_pixel(9, 9), Rgba([0, 0, 0, 0]));
}

#[test]
fn repack_without_dirty_flag_is_a_noop() {
    let atlas = DynamicAtlas::new(small_cfg()).unwrap();
    atlas.insert_pixels("a", &opaque(10, 10, [9, 9, 9, 255]), false).unwrap();
    let before = atlas.region("a").unwrap();
    atlas.repack(false).unwrap();
    assert_eq!(atlas.region("a").unwrap(), before);
}
