//! Geometric utilities for box reconciliation.
//!
//! OCR, layout and table-structure detectors each produce their own noisy
//! rectangles. This module provides the axis-aligned [`Rect`] they share,
//! overlap measures, and the threshold-tolerant sorts that keep jittery
//! coordinates from reordering boxes that sit on the same visual row.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An axis-aligned rectangle in page units.
///
/// `x0 <= x1` and `top <= bottom` hold for every rectangle admitted into the
/// pipeline; see [`Rect::is_degenerate`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Rect {
    /// Creates a rectangle from its horizontal then vertical extents.
    #[inline]
    pub fn new(x0: f32, x1: f32, top: f32, bottom: f32) -> Self {
        Self {
            x0,
            x1,
            top,
            bottom,
        }
    }

    /// Creates a rectangle from `[x_min, y_min, x_max, y_max]` coordinates.
    #[inline]
    pub fn from_xyxy(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self::new(x_min, x_max, y_min, y_max)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// Inverted, zero-area or non-finite rectangles.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x0, self.x1, self.top, self.bottom]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.x1 <= self.x0 || self.bottom <= self.top
    }

    /// Divides every coordinate by `factor` (pixels to page units).
    pub fn scale_down(&self, factor: f32) -> Self {
        Self::new(
            self.x0 / factor,
            self.x1 / factor,
            self.top / factor,
            self.bottom / factor,
        )
    }

    /// Multiplies every coordinate by `factor` (page units to pixels).
    pub fn scale_up(&self, factor: f32) -> Self {
        Self::new(
            self.x0 * factor,
            self.x1 * factor,
            self.top * factor,
            self.bottom * factor,
        )
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x0 + dx, self.x1 + dx, self.top + dy, self.bottom + dy)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Self {
        Self::new(
            self.x0.min(other.x0),
            self.x1.max(other.x1),
            self.top.min(other.top),
            self.bottom.max(other.bottom),
        )
    }

    /// Whether the rectangles touch or overlap. Shared edges count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.x1 < other.x0
            || self.x0 > other.x1
            || self.bottom < other.top
            || self.top > other.bottom)
    }

    /// Whether the horizontal extents touch or overlap.
    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        !(self.x1 < other.x0 || self.x0 > other.x1)
    }

    /// Raw intersection area.
    pub fn intersection_area(&self, other: &Rect) -> f32 {
        if !self.overlaps(other) {
            return 0.0;
        }
        let w = self.x1.min(other.x1) - self.x0.max(other.x0);
        let h = self.bottom.min(other.bottom) - self.top.max(other.top);
        (w * h).max(0.0)
    }

    /// Intersection area as a fraction of `self`'s area; 0 for empty `self`.
    pub fn overlap_ratio(&self, other: &Rect) -> f32 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area
    }

    /// Signed vertical distance between the centres, positive when `other` is lower.
    pub fn y_distance(&self, other: &Rect) -> f32 {
        (other.top + other.bottom - self.top - self.bottom) / 2.0
    }

    /// Smallest of the edge-to-edge and half the centre-to-centre horizontal gaps.
    pub fn x_distance(&self, other: &Rect) -> f32 {
        (self.x1 - other.x0)
            .abs()
            .min((self.x0 - other.x1).abs())
            .min((self.x0 + self.x1 - other.x0 - other.x1).abs() / 2.0)
    }
}

/// Anything that occupies a rectangle and may carry table row/column indices.
pub trait Spatial {
    fn rect(&self) -> &Rect;

    /// Row band index, when the item was tagged by the table stage.
    fn row_index(&self) -> Option<usize> {
        None
    }

    /// Column band index, when the item was tagged by the table stage.
    fn column_index(&self) -> Option<usize> {
        None
    }
}

impl Spatial for Rect {
    fn rect(&self) -> &Rect {
        self
    }
}

impl<T: Spatial + ?Sized> Spatial for &T {
    fn rect(&self) -> &Rect {
        (**self).rect()
    }

    fn row_index(&self) -> Option<usize> {
        (**self).row_index()
    }

    fn column_index(&self) -> Option<usize> {
        (**self).column_index()
    }
}

/// A detector output that can be deduplicated by [`layouts_cleanup`].
pub trait Detection: Spatial {
    /// Items are only compared against items of the same kind.
    fn kind_key(&self) -> Option<&str>;
    fn score(&self) -> Option<f32>;
}

fn by_f32(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

/// Sorts by `(top, x0)`, then lets items whose tops differ by less than
/// `threshold` bubble into left-to-right order.
pub fn sort_rows_first<T: Spatial>(items: &mut [T], threshold: f32) {
    items.sort_by(|a, b| {
        by_f32(a.rect().top, b.rect().top).then_with(|| by_f32(a.rect().x0, b.rect().x0))
    });
    for i in 0..items.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (upper, lower) = (items[j].rect(), items[j + 1].rect());
            if (lower.top - upper.top).abs() < threshold && lower.x0 < upper.x0 {
                items.swap(j, j + 1);
            }
        }
    }
}

/// Sorts by `(x0, top)`, then lets items whose left edges differ by less than
/// `threshold` bubble into top-to-bottom order.
pub fn sort_columns_first<T: Spatial>(items: &mut [T], threshold: f32) {
    items.sort_by(|a, b| {
        by_f32(a.rect().x0, b.rect().x0).then_with(|| by_f32(a.rect().top, b.rect().top))
    });
    for i in 0..items.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (left, right) = (items[j].rect(), items[j + 1].rect());
            if (right.x0 - left.x0).abs() < threshold && right.top < left.top {
                items.swap(j, j + 1);
            }
        }
    }
}

/// [`sort_rows_first`], then orders neighbours that both carry a row index
/// by `(row, x0)`.
pub fn sort_by_row_index<T: Spatial>(items: &mut [T], threshold: f32) {
    sort_rows_first(items, threshold);
    for i in 0..items.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (Some(r_a), Some(r_b)) = (items[j].row_index(), items[j + 1].row_index()) else {
                continue;
            };
            if r_b < r_a || (r_b == r_a && items[j + 1].rect().x0 < items[j].rect().x0) {
                items.swap(j, j + 1);
            }
        }
    }
}

/// [`sort_columns_first`], then orders neighbours that both carry a column
/// index by `(column, top)`.
pub fn sort_by_column_index<T: Spatial>(items: &mut [T], threshold: f32) {
    sort_columns_first(items, threshold);
    for i in 0..items.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (Some(c_a), Some(c_b)) = (items[j].column_index(), items[j + 1].column_index())
            else {
                continue;
            };
            if c_b < c_a || (c_b == c_a && items[j + 1].rect().top < items[j].rect().top) {
                items.swap(j, j + 1);
            }
        }
    }
}

/// Index range of `sorted_by_top` that can vertically reach `rect`.
fn vertical_candidates<T: Spatial>(rect: &Rect, sorted_by_top: &[T]) -> std::ops::Range<usize> {
    let end = sorted_by_top.partition_point(|b| b.rect().top <= rect.bottom);
    0..end
}

/// The item covering the largest share of its own area with `rect`.
///
/// `sorted_by_top` must be ordered by `top`; with `naive` the whole slice is
/// scanned regardless of order.
pub fn find_overlapped<T: Spatial>(rect: &Rect, sorted_by_top: &[T], naive: bool) -> Option<usize> {
    let range = if naive {
        0..sorted_by_top.len()
    } else {
        vertical_candidates(rect, sorted_by_top)
    };

    let mut best: Option<(usize, f32)> = None;
    for i in range {
        let ov = sorted_by_top[i].rect().overlap_ratio(rect);
        if ov <= best.map_or(0.0, |(_, v)| v) {
            continue;
        }
        best = Some((i, ov));
    }
    best.map(|(i, _)| i)
}

/// The band that best covers `rect`, provided at least `threshold` of
/// `rect`'s area lies inside it.
///
/// Candidates are compared by `(share of rect covered, share of band covered)`;
/// later candidates win ties. `bands_sorted_by_top` must be ordered by `top`.
pub fn nearest_band_match<T: Spatial>(
    rect: &Rect,
    bands_sorted_by_top: &[T],
    threshold: f32,
) -> Option<usize> {
    best_covering(rect, bands_sorted_by_top, vertical_candidates(rect, bands_sorted_by_top), threshold)
}

/// Like [`nearest_band_match`] but scans every item, so `items` may be in any order.
pub fn find_overlapped_with_threshold<T: Spatial>(
    rect: &Rect,
    items: &[T],
    threshold: f32,
) -> Option<usize> {
    best_covering(rect, items, 0..items.len(), threshold)
}

fn best_covering<T: Spatial>(
    rect: &Rect,
    items: &[T],
    range: std::ops::Range<usize>,
    threshold: f32,
) -> Option<usize> {
    let mut best_idx = None;
    let mut best = (threshold, 0.0f32);
    for i in range {
        let band = items[i].rect();
        let ov = rect.overlap_ratio(band);
        let rev = band.overlap_ratio(rect);
        if ov <= 0.0 || ov < best.0 || (ov == best.0 && rev < best.1) {
            continue;
        }
        best_idx = Some(i);
        best = (ov, rev);
    }
    best_idx
}

/// The item whose left edge, right edge or centre lies horizontally closest
/// to `rect`, among items accepted by `eligible`.
pub fn find_horizontally_tightest_fit<T: Spatial>(
    rect: &Rect,
    items: &[T],
    eligible: impl Fn(&T) -> bool,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, item) in items.iter().enumerate() {
        if !eligible(item) {
            continue;
        }
        let b = item.rect();
        let dis = (rect.x0 - b.x0)
            .abs()
            .min((rect.x1 - b.x1).abs())
            .min((rect.x0 + rect.x1 - b.x0 - b.x1).abs() / 2.0);
        if best.is_none_or(|(_, d)| dis < d) {
            best = Some((i, dis));
        }
    }
    best.map(|(i, _)| i)
}

/// Removes redundant detections.
///
/// For each detection, the next same-kind overlapping detection within
/// `window` positions is examined. When either covers at least `threshold`
/// of the other, one of the pair is dropped: the lower-scoring one when both
/// carry scores, otherwise the one explaining less of the `boxes` area.
pub fn layouts_cleanup<T: Detection, B: Spatial>(
    boxes: &[B],
    layouts: &mut Vec<T>,
    window: usize,
    threshold: f32,
) {
    let mut i = 0;
    while i + 1 < layouts.len() {
        let limit = (i + window).min(layouts.len());
        let mut j = i + 1;
        while j < limit
            && (layouts[i].kind_key() != layouts[j].kind_key()
                || !layouts[i].rect().overlaps(layouts[j].rect()))
        {
            j += 1;
        }
        if j >= limit {
            i += 1;
            continue;
        }

        let (a, b) = (*layouts[i].rect(), *layouts[j].rect());
        if a.overlap_ratio(&b) < threshold && b.overlap_ratio(&a) < threshold {
            i += 1;
            continue;
        }

        let drop_later = match (layouts[i].score(), layouts[j].score()) {
            (Some(si), Some(sj)) if si > 0.0 && sj > 0.0 => si > sj,
            _ => {
                let explained = |region: &Rect| -> f32 {
                    boxes
                        .iter()
                        .filter(|bx| bx.rect().overlaps(region))
                        .map(|bx| bx.rect().intersection_area(region))
                        .sum()
                };
                explained(&a) > explained(&b)
            }
        };
        if drop_later {
            layouts.remove(j);
        } else {
            layouts.remove(i);
        }
    }
}

/// Median of `values`; 0 for an empty slice.
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Arithmetic mean of `values`; 0 for an empty slice.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
