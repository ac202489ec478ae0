use crate::model::{Rect, TrimInfo};
use image::RgbaImage;

/// Computes the tightest bounding box of non-transparent content within
/// `bounds` (the full image when omitted).
///
/// Offsets in the returned `TrimInfo` are relative to the bounds origin and
/// `original_width`/`original_height` are the bounds dimensions. A pixel is
/// transparent when its alpha is <= `threshold`. Returns `None` only for a
/// zero-area scan; a region that merely contains no content yields the
/// `trimmed_width == trimmed_height == 0` sentinel instead.
pub fn trim_rgba(rgba: &RgbaImage, bounds: Option<Rect>, threshold: u8) -> Option<TrimInfo> {
    let (iw, ih) = rgba.dimensions();
    if iw == 0 || ih == 0 {
        return None;
    }
    let b = bounds.unwrap_or(Rect::new(0, 0, iw, ih));
    let in_bounds = b.x.checked_add(b.w).is_some_and(|r| r <= iw)
        && b.y.checked_add(b.h).is_some_and(|bot| bot <= ih);
    if b.w == 0 || b.h == 0 || !in_bounds {
        return None;
    }

    let row_empty = |y: u32, x0: u32, x1: u32| (x0..=x1).all(|x| rgba.get_pixel(x, y)[3] <= threshold);
    let col_empty = |x: u32, y0: u32, y1: u32| (y0..=y1).all(|y| rgba.get_pixel(x, y)[3] <= threshold);

    // rows from the top
    let mut top = 0u32;
    while top < b.h && row_empty(b.y + top, b.x, b.x + b.w - 1) {
        top += 1;
    }
    if top == b.h {
        // no content at all
        return Some(TrimInfo {
            x: 0,
            y: 0,
            original_width: b.w,
            original_height: b.h,
            trimmed_width: 0,
            trimmed_height: 0,
        });
    }
    // rows from the bottom
    let mut bottom = b.h - 1;
    while bottom > top && row_empty(b.y + bottom, b.x, b.x + b.w - 1) {
        bottom -= 1;
    }
    // columns, restricted to the surviving rows
    let mut left = 0u32;
    while left < b.w && col_empty(b.x + left, b.y + top, b.y + bottom) {
        left += 1;
    }
    let mut right = b.w - 1;
    while right > left && col_empty(b.x + right, b.y + top, b.y + bottom) {
        right -= 1;
    }

    Some(TrimInfo {
        x: left,
        y: top,
        original_width: b.w,
        original_height: b.h,
        trimmed_width: right - left + 1,
        trimmed_height: bottom - top + 1,
    })
}
