use crate::model::Rect;
use std::collections::BTreeMap;

/// How a spritesheet source image divides into independently addressable
/// cells. Each cell becomes a region keyed `"{sheet}-{name}"`.
#[derive(Debug, Clone)]
pub enum SheetSpec {
    /// Uniform grid. Cells are generated row-major, left-to-right,
    /// top-to-bottom, named by zero-based index. Partial cells at the right
    /// and bottom edges are dropped.
    Grid { cell_width: u32, cell_height: u32 },
    /// Explicit named sub-rectangles within the source.
    Frames(BTreeMap<String, Rect>),
}

impl SheetSpec {
    /// Expands to (name, cell rect) pairs for a source of the given size.
    pub fn cells(&self, width: u32, height: u32) -> Vec<(String, Rect)> {
        match self {
            SheetSpec::Grid {
                cell_width,
                cell_height,
            } => {
                let (cw, ch) = (*cell_width, *cell_height);
                if cw == 0 || ch == 0 {
                    return Vec::new();
                }
                let cols = width / cw;
                let rows = height / ch;
                let mut out = Vec::with_capacity((cols as u64 * rows as u64) as usize);
                let mut index = 0usize;
                for row in 0..rows {
                    for col in 0..cols {
                        out.push((index.to_string(), Rect::new(col * cw, row * ch, cw, ch)));
                        index += 1;
                    }
                }
                out
            }
            SheetSpec::Frames(map) => map.iter().map(|(name, r)| (name.clone(), *r)).collect(),
        }
    }
}
