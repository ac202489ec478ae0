use image::{Rgba, RgbaImage};
use live_atlas_core::prelude::*;

fn opaque(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
}

#[test]
fn finds_content_bounding_box() {
    let mut img = RgbaImage::new(10, 10);
    for y in 4..6 {
        for x in 4..6 {
            img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    let t = trim_rgba(&img, None, 0).expect("non-empty buffer");
    assert_eq!(t.x, 4);
    assert_eq!(t.y, 4);
    assert_eq!(t.trimmed_width, 2);
    assert_eq!(t.trimmed_height, 2);
    assert_eq!(t.original_width, 10);
    assert_eq!(t.original_height, 10);
}

#[test]
fn trimming_trimmed_image_is_identity() {
    let img = opaque(5, 7);
    let t = trim_rgba(&img, None, 0).expect("non-empty buffer");
    assert_eq!((t.x, t.y), (0, 0));
    assert_eq!((t.trimmed_width, t.trimmed_height), (5, 7));
}

#[test]
fn fully_transparent_returns_sentinel() {
    let img = RgbaImage::new(8, 8);
    let t = trim_rgba(&img, None, 0).expect("non-empty buffer");
    assert!(t.is_empty());
    assert_eq!(t.trimmed_width, 0);
    assert_eq!(t.trimmed_height, 0);
    assert_eq!(t.original_width, 8);
    assert_eq!(t.original_height, 8);
}

#[test]
fn zero_length_buffer_returns_none() {
    let img = RgbaImage::new(0, 0);
    assert!(trim_rgba(&img, None, 0).is_none());
}

#[test]
fn bounds_restrict_the_scan_and_offsets_are_relative() {
    // content at (1,1)..(3,3); scan only the cell starting at (2,2)
    let mut img = RgbaImage::new(8, 8);
    for y in 1..4 {
        for x in 1..4 {
            img.put_pixel(x, y, Rgba([0, 255, 0, 255]));
        }
    }
    let t = trim_rgba(&img, Some(Rect::new(2, 2, 4, 4)), 0).expect("non-empty buffer");
    assert_eq!((t.x, t.y), (0, 0));
    assert_eq!((t.trimmed_width, t.trimmed_height), (2, 2));
    assert_eq!((t.original_width, t.original_height), (4, 4));
}

#[test]
fn bounds_with_no_content_yield_sentinel() {
    let mut img = RgbaImage::new(8, 8);
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    let t = trim_rgba(&img, Some(Rect::new(4, 4, 4, 4)), 0).expect("non-empty buffer");
    assert!(t.is_empty());
}

#[test]
fn bounds_past_the_image_edge_return_none() {
    let img = opaque(4, 4);
    assert!(trim_rgba(&img, Some(Rect::new(5, 0, 2, 2)), 0).is_none());
    assert!(trim_rgba(&img, Some(Rect::new(u32::MAX, 0, 2, 2)), 0).is_none());
    assert!(trim_rgba(&img, Some(Rect::new(0, 3, 1, u32::MAX)), 0).is_none());
}

#[test]
fn threshold_treats_faint_alpha_as_transparent() {
    let mut img = RgbaImage::new(4, 4);
    img.put_pixel(0, 0, Rgba([255, 255, 255, 10]));
    img.put_pixel(2, 2, Rgba([255, 255, 255, 200]));
    let t = trim_rgba(&img, None, 16).expect("non-empty buffer");
    assert_eq!((t.x, t.y), (2, 2));
    assert_eq!((t.trimmed_width, t.trimmed_height), (1, 1));
}
