//! Per-page geometry and metrics shared by every stage.

use crate::processors::{Rect, median};
use serde::{Deserialize, Serialize};

/// Size and typical glyph metrics of one rendered page, in page units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Typical line height.
    pub mean_height: f32,
    /// Typical character width.
    pub mean_width: f32,
}

impl PageGeometry {
    /// Derives metrics from character boxes when the page has any, falling
    /// back to line boxes for the height and a fixed width otherwise.
    pub fn measure(width: f32, height: f32, chars: &[Rect], lines: &[Rect]) -> Self {
        let heights: Vec<f32> = if chars.is_empty() {
            lines.iter().map(Rect::height).collect()
        } else {
            chars.iter().map(Rect::height).collect()
        };
        let mean_width = if chars.is_empty() {
            8.0
        } else {
            median(&chars.iter().map(Rect::width).collect::<Vec<_>>())
        };
        Self {
            width,
            height,
            mean_height: median(&heights),
            mean_width,
        }
    }
}

/// Geometry of every page in the rendered range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPages {
    pages: Vec<PageGeometry>,
    /// `offsets[i]` is the summed height of pages before page `i + 1`.
    offsets: Vec<f32>,
    /// Absolute index of the first rendered page.
    pub page_from: usize,
}

impl DocumentPages {
    pub fn new(pages: Vec<PageGeometry>, page_from: usize) -> Self {
        let mut offsets = Vec::with_capacity(pages.len() + 1);
        let mut acc = 0.0;
        offsets.push(acc);
        for page in &pages {
            acc += page.height;
            offsets.push(acc);
        }
        Self {
            pages,
            offsets,
            page_from,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Geometry of 1-based `page`.
    pub fn get(&self, page: usize) -> Option<&PageGeometry> {
        page.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageGeometry> {
        self.pages.iter()
    }

    /// Vertical offset of 1-based `page` in document-global units.
    pub fn offset(&self, page: usize) -> f32 {
        page.checked_sub(1)
            .and_then(|i| self.offsets.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Typical line height on `page`, never below 1.
    pub fn mean_height(&self, page: usize) -> f32 {
        self.get(page).map_or(1.0, |p| p.mean_height.max(1.0))
    }

    /// Typical character width on `page`, never below 1.
    pub fn mean_width(&self, page: usize) -> f32 {
        self.get(page).map_or(8.0, |p| p.mean_width.max(1.0))
    }

    pub fn width(&self, page: usize) -> f32 {
        self.get(page).map_or(0.0, |p| p.width)
    }

    pub fn height(&self, page: usize) -> f32 {
        self.get(page).map_or(0.0, |p| p.height)
    }

    /// Widest page, used where a box's own page width is unknown.
    pub fn max_width(&self) -> f32 {
        self.pages.iter().map(|p| p.width).fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(height: f32) -> PageGeometry {
        PageGeometry {
            width: 600.0,
            height,
            mean_height: 10.0,
            mean_width: 5.0,
        }
    }

    #[test]
    fn test_offsets_accumulate() {
        let doc = DocumentPages::new(vec![page(800.0), page(700.0), page(900.0)], 0);
        assert_eq!(doc.offset(1), 0.0);
        assert_eq!(doc.offset(2), 800.0);
        assert_eq!(doc.offset(3), 1500.0);
        assert_eq!(doc.height(2), 700.0);
        assert!(doc.get(0).is_none());
        assert!(doc.get(4).is_none());
    }

    #[test]
    fn test_measure_prefers_chars() {
        let chars = vec![Rect::new(0.0, 6.0, 0.0, 12.0), Rect::new(6.0, 12.0, 0.0, 12.0)];
        let lines = vec![Rect::new(0.0, 100.0, 0.0, 20.0)];
        let g = PageGeometry::measure(600.0, 800.0, &chars, &lines);
        assert_eq!(g.mean_height, 12.0);
        assert_eq!(g.mean_width, 6.0);

        let g = PageGeometry::measure(600.0, 800.0, &[], &lines);
        assert_eq!(g.mean_height, 20.0);
        assert_eq!(g.mean_width, 8.0);
    }

    #[test]
    fn test_mean_height_floor() {
        let mut p = page(800.0);
        p.mean_height = 0.0;
        let doc = DocumentPages::new(vec![p], 0);
        assert_eq!(doc.mean_height(1), 1.0);
    }
}
