use crate::error::{AtlasError, Result};
use crate::model::Rect;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage, imageops};
use tracing::debug;

/// What holds the atlas pixels.
///
/// `External` mirrors a surface whose pixels live somewhere the CPU cannot
/// read (a GPU texture the caller uploads to from the returned regions):
/// geometry is tracked, pixel operations are no-ops, and readback fails
/// explicitly instead of silently producing a wrong image.
#[derive(Debug, Clone)]
enum Backing {
    Cpu(RgbaImage),
    External { width: u32, height: u32 },
}

/// The single growable pixel surface backing the atlas.
#[derive(Debug, Clone)]
pub struct Surface {
    backing: Backing,
}

impl Surface {
    /// CPU-backed surface cleared to transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            backing: Backing::Cpu(RgbaImage::new(width.max(1), height.max(1))),
        }
    }

    /// Geometry-only surface with no CPU-readable pixels.
    pub fn external(width: u32, height: u32) -> Self {
        Self {
            backing: Backing::External {
                width: width.max(1),
                height: height.max(1),
            },
        }
    }

    /// Adopts an already-decoded image as the surface contents.
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            backing: Backing::Cpu(image),
        }
    }

    pub fn width(&self) -> u32 {
        match &self.backing {
            Backing::Cpu(c) => c.width(),
            Backing::External { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.backing {
            Backing::Cpu(c) => c.height(),
            Backing::External { height, .. } => *height,
        }
    }

    pub fn supports_readback(&self) -> bool {
        matches!(self.backing, Backing::Cpu(_))
    }

    /// Grows the surface to at least `width`x`height`, preserving content:
    /// the current canvas is kept as scratch, a cleared canvas of the new
    /// size replaces it, and the scratch is drawn back at the origin. Runs
    /// to completion synchronously; a half-resized surface is never
    /// observable.
    pub fn ensure_capacity(&mut self, width: u32, height: u32) {
        if width <= self.width() && height <= self.height() {
            return;
        }
        let nw = self.width().max(width);
        let nh = self.height().max(height);
        match &mut self.backing {
            Backing::Cpu(canvas) => {
                let scratch = std::mem::replace(canvas, RgbaImage::new(nw, nh));
                imageops::replace(canvas, &scratch, 0, 0);
            }
            Backing::External { width, height } => {
                *width = nw;
                *height = nh;
            }
        }
        debug!(width = nw, height = nh, "surface grown");
    }

    /// Resizes to exactly `width`x`height`, discarding all content.
    pub fn resize_discard(&mut self, width: u32, height: u32) {
        let (w, h) = (width.max(1), height.max(1));
        match &mut self.backing {
            Backing::Cpu(canvas) => *canvas = RgbaImage::new(w, h),
            Backing::External { width, height } => {
                *width = w;
                *height = h;
            }
        }
    }

    /// Draws the `src_rect` portion of `src` with its top-left corner at
    /// (`dst_x`, `dst_y`), clipped to the surface bounds.
    pub fn blit(&mut self, src: &RgbaImage, dst_x: u32, dst_y: u32, src_rect: Rect) {
        let Backing::Cpu(canvas) = &mut self.backing else {
            return;
        };
        let (cw, ch) = canvas.dimensions();
        let (sw, sh) = src.dimensions();
        for yy in 0..src_rect.h {
            for xx in 0..src_rect.w {
                let sx = src_rect.x + xx;
                let sy = src_rect.y + yy;
                if sx >= sw || sy >= sh {
                    continue;
                }
                let dx = dst_x + xx;
                let dy = dst_y + yy;
                if dx < cw && dy < ch {
                    canvas.put_pixel(dx, dy, *src.get_pixel(sx, sy));
                }
            }
        }
    }

    /// Paints `rect` fully transparent. Does not shrink the surface.
    pub fn erase(&mut self, rect: Rect) {
        let Backing::Cpu(canvas) = &mut self.backing else {
            return;
        };
        let (cw, ch) = canvas.dimensions();
        for y in rect.y..(rect.y + rect.h).min(ch) {
            for x in rect.x..(rect.x + rect.w).min(cw) {
                canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
    }

    /// Full copy of the surface pixels, or `None` for an external backing.
    pub fn snapshot(&self) -> Option<RgbaImage> {
        match &self.backing {
            Backing::Cpu(canvas) => Some(canvas.clone()),
            Backing::External { .. } => None,
        }
    }

    /// Copy of the pixels under `rect` (clipped to the surface), or `None`
    /// for an external backing.
    pub fn region_pixels(&self, rect: Rect) -> Option<RgbaImage> {
        let Backing::Cpu(canvas) = &self.backing else {
            return None;
        };
        let (cw, ch) = canvas.dimensions();
        let w = rect.w.min(cw.saturating_sub(rect.x));
        let h = rect.h.min(ch.saturating_sub(rect.y));
        let mut out = RgbaImage::new(w.max(1), h.max(1));
        for yy in 0..h {
            for xx in 0..w {
                out.put_pixel(xx, yy, *canvas.get_pixel(rect.x + xx, rect.y + yy));
            }
        }
        Some(out)
    }

    /// PNG-encodes the surface pixels. Fails with `ReadbackUnsupported` for
    /// an external backing.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let Backing::Cpu(canvas) = &self.backing else {
            return Err(AtlasError::ReadbackUnsupported);
        };
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(
                canvas.as_raw(),
                canvas.width(),
                canvas.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(AtlasError::Image)?;
        Ok(buf)
    }
}
