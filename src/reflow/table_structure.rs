//! Table-structure bands and row/column tagging.
//!
//! # Stage definition
//!
//! - Input: rendered pages, the table [`LayoutRegion`]s and layout-tagged boxes
//! - Adapter call: one [`TableCrop`] per table region, sent in a single batch
//! - Output: every box inside a table region carries its row band, column band
//!   and, where detected, header band and spanning cell
//!
//! Bands come back in crop pixels. They are shifted by the crop origin,
//! divided by zoom and moved onto the document axis before matching.
//!
//! With auto-rotation on, each crop is first read in all four quarter turns
//! and kept in the orientation the recognizer reads best. The boxes of a
//! turned table are replaced by the lines read on the turned crop. Those
//! lines and the bands detected on it share the upright frame anchored at
//! the crop origin, so rows stay rows.

use super::StageContext;
use super::layout_tagger::regions_of;
use crate::core::{OcrPage, RegionDetection, TableCrop, TableRotation, TextRecognizer};
use crate::domain::{
    BandKind, ColumnBand, LayoutRegion, LayoutTag, LayoutType, RowBand, TableBand, TextBox,
};
use crate::processors::{
    Rect, find_horizontally_tightest_fit, find_overlapped_with_threshold, layouts_cleanup, mean,
    median, nearest_band_match, sort_rows_first,
};
use crate::utils::crop_pixels;
use image::RgbImage;
use itertools::Itertools;

/// Bands are aligned with their siblings' mean or median edge only when a
/// table has more than this many of them; otherwise the outermost edge wins.
const ALIGN_MIN_BANDS: usize = 4;
/// Lookahead window when deduplicating bands.
const BAND_CLEANUP_WINDOW: usize = 5;
/// Coverage threshold when deduplicating row, header and span bands.
const ROW_CLEANUP_THRESHOLD: f32 = 0.6;
/// Coverage threshold when deduplicating column bands.
const COLUMN_CLEANUP_THRESHOLD: f32 = 0.5;
/// Tolerance when first sorting row-like bands.
const ROW_SORT_TOLERANCE: f32 = 10.0;
/// A turned crop must beat the upright read by more than this.
const ROTATION_MIN_GAIN: f32 = 0.2;
/// Upright reads scoring at least this are never turned.
const UPRIGHT_CONFIDENT: f32 = 0.8;
/// Line count at which the line bonus of an orientation saturates.
const ROTATION_LINE_CAP: usize = 50;
/// Lines read on a turned crop below this confidence are dropped.
const TURNED_LINE_MIN_SCORE: f32 = 0.5;

/// Where a table crop was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct CropPlacement {
    /// 1-based page number.
    pub page: usize,
    /// Position of the table among the tables of its page.
    pub table_index: usize,
    /// Layout id of the table region, e.g. `"table-0"`.
    pub table_id: String,
    /// Top-left corner of the crop in page pixels.
    pub origin_x: f32,
    pub origin_y: f32,
}

/// Cuts every table region, widened by the configured margin, out of its page.
///
/// Crops and placements are index-aligned. Regions that clamp to an empty
/// crop are skipped.
pub fn table_crops(
    page_images: &[RgbImage],
    regions: &[LayoutRegion],
    ctx: &StageContext<'_>,
) -> (Vec<TableCrop>, Vec<CropPlacement>) {
    let zoom = ctx.config.zoom;
    let margin = ctx.config.table_crop_margin;
    let mut crops = Vec::new();
    let mut placements = Vec::new();

    for (page_index, image) in page_images.iter().enumerate() {
        let page = page_index + 1;
        let offset = ctx.pages.offset(page);
        for (k, region) in regions_of(regions, page, LayoutType::Table).enumerate() {
            let local = region.rect.translate(0.0, -offset);
            let px = Rect::new(
                ((local.x0 - margin) * zoom).max(0.0).floor(),
                ((local.x1 + margin) * zoom).min(image.width() as f32),
                ((local.top - margin) * zoom).max(0.0).floor(),
                ((local.bottom + margin) * zoom).min(image.height() as f32),
            );
            let Some(crop) = crop_pixels(image, &px) else {
                tracing::debug!(target: "table", page, table = k, "empty table crop skipped");
                continue;
            };
            crops.push(TableCrop {
                page_index,
                table_index: k,
                rotation: TableRotation::Upright,
                image: crop,
            });
            placements.push(CropPlacement {
                page,
                table_index: k,
                table_id: format!("{}-{}", LayoutType::Table.as_str(), k),
                origin_x: px.x0,
                origin_y: px.top,
            });
        }
    }
    (crops, placements)
}

/// How well the recognizer read one orientation of a crop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationScore {
    pub mean_confidence: f32,
    pub lines: usize,
}

impl OrientationScore {
    pub fn of(ocr: &OcrPage) -> Self {
        let scores: Vec<f32> = ocr.lines.iter().map(|l| l.score).collect();
        Self {
            mean_confidence: mean(&scores),
            lines: scores.len(),
        }
    }

    /// Mean confidence plus up to a tenth for the number of lines read.
    pub fn combined(&self) -> f32 {
        let lines = self.lines.min(ROTATION_LINE_CAP) as f32 / ROTATION_LINE_CAP as f32;
        self.mean_confidence * (1.0 + 0.1 * lines)
    }
}

/// Picks the orientation to keep.
///
/// The best turned read wins only when it beats the upright read by more
/// than [`ROTATION_MIN_GAIN`] and the upright read is below
/// [`UPRIGHT_CONFIDENT`]. Ties go to the earlier orientation.
pub fn choose_rotation(scores: &[(TableRotation, OrientationScore)]) -> TableRotation {
    let upright = scores
        .iter()
        .find(|(r, _)| *r == TableRotation::Upright)
        .map(|(_, s)| s.combined())
        .unwrap_or(0.0);
    let mut best: Option<(TableRotation, f32)> = None;
    for (rotation, score) in scores {
        let combined = score.combined();
        if best.is_none_or(|(_, b)| combined > b) {
            best = Some((*rotation, combined));
        }
    }
    match best {
        Some((rotation, combined))
            if rotation != TableRotation::Upright
                && combined - upright > ROTATION_MIN_GAIN
                && upright < UPRIGHT_CONFIDENT =>
        {
            rotation
        }
        _ => TableRotation::Upright,
    }
}

/// Turns every crop to the orientation the recognizer reads best.
///
/// Returns, index-aligned with `crops`, what was read on each crop that was
/// turned. A failed read counts as an empty one.
pub fn orient_table_crops(
    crops: &mut [TableCrop],
    recognizer: &dyn TextRecognizer,
) -> Vec<Option<OcrPage>> {
    crops
        .iter_mut()
        .map(|crop| {
            let mut reads: Vec<(TableCrop, OcrPage, OrientationScore)> =
                Vec::with_capacity(TableRotation::ALL.len());
            for rotation in TableRotation::ALL {
                let turned = TableCrop {
                    page_index: crop.page_index,
                    table_index: crop.table_index,
                    rotation,
                    image: rotation.apply(&crop.image),
                };
                let ocr = recognizer.ocr_table(&turned).unwrap_or_else(|e| {
                    tracing::warn!(
                        target: "table",
                        page = crop.page_index + 1,
                        table = crop.table_index,
                        degrees = rotation.degrees(),
                        error = %e,
                        "table OCR failed"
                    );
                    OcrPage::default()
                });
                let score = OrientationScore::of(&ocr);
                tracing::debug!(
                    target: "table",
                    page = crop.page_index + 1,
                    table = crop.table_index,
                    degrees = rotation.degrees(),
                    confidence = score.mean_confidence,
                    lines = score.lines,
                    combined = score.combined(),
                    "table orientation scored"
                );
                reads.push((turned, ocr, score));
            }
            let scores: Vec<(TableRotation, OrientationScore)> =
                reads.iter().map(|(t, _, s)| (t.rotation, *s)).collect();
            let chosen = choose_rotation(&scores);
            if chosen == TableRotation::Upright {
                return None;
            }
            let (turned, ocr, _) = reads.into_iter().find(|(t, _, _)| t.rotation == chosen)?;
            tracing::info!(
                target: "table",
                page = crop.page_index + 1,
                table = crop.table_index,
                degrees = chosen.degrees(),
                "table turned"
            );
            *crop = turned;
            Some(ocr)
        })
        .collect()
}

/// Replaces the boxes of turned tables with the lines read on their crops.
///
/// `reads` comes from [`orient_table_crops`]. New boxes take the place of the
/// first removed box. A table whose turned read keeps no line above
/// [`TURNED_LINE_MIN_SCORE`] keeps its original boxes.
pub fn replace_turned_table_boxes(
    boxes: &mut Vec<TextBox>,
    reads: &[Option<OcrPage>],
    placements: &[CropPlacement],
    ctx: &StageContext<'_>,
) {
    let zoom = ctx.config.zoom;
    for (read, place) in reads.iter().zip(placements) {
        let Some(ocr) = read else {
            continue;
        };
        let member = |b: &TextBox| b.page == place.page && b.layout_id() == Some(place.table_id.as_str());
        let tag = boxes
            .iter()
            .find(|&b| member(b))
            .and_then(|b| b.layout.clone())
            .unwrap_or_else(|| LayoutTag::new(LayoutType::Table, place.table_index, None));
        let offset = ctx.pages.offset(place.page);
        let fresh: Vec<TextBox> = ocr
            .lines
            .iter()
            .filter(|l| l.score >= TURNED_LINE_MIN_SCORE)
            .filter_map(|l| {
                let rect = l
                    .rect
                    .translate(place.origin_x, place.origin_y)
                    .scale_down(zoom)
                    .translate(0.0, offset);
                (!rect.is_degenerate())
                    .then(|| TextBox::new(place.page, rect, l.text.clone()).with_layout(tag.clone()))
            })
            .collect();
        if fresh.is_empty() {
            tracing::warn!(
                target: "table",
                page = place.page,
                table = %place.table_id,
                "turned table read nothing usable, keeping original boxes"
            );
            continue;
        }
        let insert_at = boxes.iter().take_while(|&b| !member(b)).count();
        let before = boxes.len();
        boxes.retain(|b| !member(b));
        tracing::debug!(
            target: "table",
            page = place.page,
            table = %place.table_id,
            removed = before - boxes.len(),
            added = fresh.len(),
            "turned table boxes replaced"
        );
        boxes.splice(insert_at..insert_at, fresh);
    }
}

/// Converts per-crop detections into document-global bands.
pub fn bands_from_detections(
    detections: &[Vec<RegionDetection>],
    placements: &[CropPlacement],
    ctx: &StageContext<'_>,
) -> Vec<TableBand> {
    let zoom = ctx.config.zoom;
    let mut bands = Vec::new();
    for (dets, place) in detections.iter().zip(placements) {
        let offset = ctx.pages.offset(place.page);
        for d in dets {
            let Some(kind) = BandKind::from_label(&d.label) else {
                tracing::debug!(target: "table", label = %d.label, "unknown band label");
                continue;
            };
            let rect = d
                .rect
                .translate(place.origin_x, place.origin_y)
                .scale_down(zoom)
                .translate(0.0, offset);
            if rect.is_degenerate() {
                continue;
            }
            bands.push(TableBand {
                kind,
                rect,
                score: d.score,
                page: place.page,
                table_id: place.table_id.clone(),
            });
        }
    }
    bands
}

/// Extends row-like bands to a common width and column bands to a common
/// height, table by table. Bands are only ever grown.
pub fn normalize_bands(bands: &mut [TableBand]) {
    let tables: Vec<(usize, String)> = bands
        .iter()
        .map(|b| (b.page, b.table_id.clone()))
        .unique()
        .collect();

    for (page, table_id) in tables {
        let member = |b: &TableBand| b.page == page && b.table_id == table_id;

        let (lefts, rights): (Vec<f32>, Vec<f32>) = bands
            .iter()
            .filter(|b| member(b) && b.kind.is_row_like())
            .map(|b| (b.rect.x0, b.rect.x1))
            .unzip();
        if !lefts.is_empty() {
            let (left, right) = if lefts.len() > ALIGN_MIN_BANDS {
                (mean(&lefts), mean(&rights))
            } else {
                (
                    lefts.iter().copied().fold(f32::INFINITY, f32::min),
                    rights.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                )
            };
            for b in bands.iter_mut().filter(|b| member(b) && b.kind.is_row_like()) {
                b.rect.x0 = b.rect.x0.min(left);
                b.rect.x1 = b.rect.x1.max(right);
            }
        }

        let (tops, bottoms): (Vec<f32>, Vec<f32>) = bands
            .iter()
            .filter(|b| member(b) && b.kind == BandKind::Column)
            .map(|b| (b.rect.top, b.rect.bottom))
            .unzip();
        if !tops.is_empty() {
            let (top, bottom) = if tops.len() > ALIGN_MIN_BANDS {
                (median(&tops), median(&bottoms))
            } else {
                (
                    tops.iter().copied().fold(f32::INFINITY, f32::min),
                    bottoms.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                )
            };
            for b in bands.iter_mut().filter(|b| member(b) && b.kind == BandKind::Column) {
                b.rect.top = b.rect.top.min(top);
                b.rect.bottom = b.rect.bottom.max(bottom);
            }
        }
    }
}

/// Deduplicated band lists. Row, header and span lists are sorted by `top`.
#[derive(Debug, Clone, Default)]
pub struct TableBands {
    pub rows: Vec<TableBand>,
    pub headers: Vec<TableBand>,
    pub spans: Vec<TableBand>,
    pub columns: Vec<TableBand>,
}

fn gather(
    bands: &[TableBand],
    boxes: &[TextBox],
    keep: impl Fn(&TableBand) -> bool,
) -> Vec<TableBand> {
    let mut picked: Vec<TableBand> = bands.iter().filter(|b| keep(b)).cloned().collect();
    sort_rows_first(&mut picked, ROW_SORT_TOLERANCE);
    layouts_cleanup(boxes, &mut picked, BAND_CLEANUP_WINDOW, ROW_CLEANUP_THRESHOLD);
    sort_rows_first(&mut picked, 0.0);
    picked
}

/// Splits normalized bands by role and removes duplicates.
pub fn gather_bands(bands: &[TableBand], boxes: &[TextBox]) -> TableBands {
    let mut columns: Vec<TableBand> = bands
        .iter()
        .filter(|b| b.kind == BandKind::Column)
        .cloned()
        .collect();
    columns.sort_by(|a, b| {
        (a.page, &a.table_id)
            .cmp(&(b.page, &b.table_id))
            .then_with(|| a.rect.x0.total_cmp(&b.rect.x0))
    });
    layouts_cleanup(boxes, &mut columns, BAND_CLEANUP_WINDOW, COLUMN_CLEANUP_THRESHOLD);

    TableBands {
        headers: gather(bands, boxes, |b| b.kind.is_header()),
        rows: gather(bands, boxes, |b| b.kind.is_row_like()),
        spans: gather(bands, boxes, |b| b.kind == BandKind::SpanningCell),
        columns,
    }
}

fn match_column(b: &TextBox, columns: &[TableBand], threshold: f32) -> Option<usize> {
    let table_id = b.layout_id()?;
    let same_table = |c: &TableBand| c.page == b.page && c.table_id == table_id;
    let candidates: Vec<usize> = (0..columns.len()).filter(|&i| same_table(&columns[i])).collect();
    let rects: Vec<Rect> = candidates.iter().map(|&i| columns[i].rect).collect();
    if let Some(k) = find_overlapped_with_threshold(&b.rect, &rects, threshold) {
        return Some(candidates[k]);
    }
    find_horizontally_tightest_fit(&b.rect, columns, same_table)
}

/// Tags every table box with its bands.
pub fn tag_table_boxes(boxes: &mut [TextBox], bands: &TableBands, ctx: &StageContext<'_>) {
    let threshold = ctx.config.table_band_threshold;
    let mut tagged = 0usize;
    for b in boxes.iter_mut().filter(|b| b.is_layout(LayoutType::Table)) {
        if let Some(i) = nearest_band_match(&b.rect, &bands.rows, threshold) {
            let r = &bands.rows[i].rect;
            b.table.row = Some(RowBand {
                index: i,
                top: r.top,
                bottom: r.bottom,
            });
        }
        if let Some(i) = nearest_band_match(&b.rect, &bands.headers, threshold) {
            b.table.header = Some(i);
            b.table.span_extent = Some(bands.headers[i].rect);
        }
        if let Some(i) = match_column(b, &bands.columns, threshold) {
            let c = &bands.columns[i].rect;
            b.table.column = Some(ColumnBand {
                index: i,
                left: c.x0,
                right: c.x1,
            });
        }
        if let Some(i) = nearest_band_match(&b.rect, &bands.spans, threshold) {
            b.table.span = Some(i);
            b.table.span_extent = Some(bands.spans[i].rect);
        }
        if !b.table.is_empty() {
            tagged += 1;
        }
    }
    tracing::debug!(
        target: "table",
        rows = bands.rows.len(),
        columns = bands.columns.len(),
        headers = bands.headers.len(),
        spans = bands.spans.len(),
        tagged,
        "table boxes tagged"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AdapterResult, OcrLine};
    use crate::reflow::testing::TestDocument;
    use image::Rgb;

    /// Reads confidently only when a crop is turned by `readable`.
    #[derive(Debug)]
    struct TurnedReader {
        readable: TableRotation,
        upright_score: f32,
    }

    impl TextRecognizer for TurnedReader {
        fn ocr(&self, _page_index: usize, _image: &RgbImage) -> AdapterResult<OcrPage> {
            Err("page OCR is not expected here".into())
        }

        fn ocr_table(&self, crop: &TableCrop) -> AdapterResult<OcrPage> {
            let score = if crop.rotation == self.readable {
                0.95
            } else if crop.rotation == TableRotation::Upright {
                self.upright_score
            } else {
                0.1
            };
            Ok(OcrPage {
                lines: vec![
                    OcrLine::new(Rect::new(5.0, 60.0, 5.0, 20.0), "Qty", score),
                    OcrLine::new(Rect::new(5.0, 60.0, 40.0, 55.0), "Price", score),
                ],
                chars: Vec::new(),
            })
        }
    }

    #[derive(Debug)]
    struct BrokenReader;

    impl TextRecognizer for BrokenReader {
        fn ocr(&self, _page_index: usize, _image: &RgbImage) -> AdapterResult<OcrPage> {
            Err("recognizer offline".into())
        }
    }

    fn read(mean_confidence: f32, lines: usize) -> OrientationScore {
        OrientationScore {
            mean_confidence,
            lines,
        }
    }

    fn band(kind: BandKind, x0: f32, x1: f32, top: f32, bottom: f32) -> TableBand {
        TableBand {
            kind,
            rect: Rect::new(x0, x1, top, bottom),
            score: 0.9,
            page: 1,
            table_id: "table-0".to_string(),
        }
    }

    fn cell(x0: f32, x1: f32, top: f32, text: &str) -> TextBox {
        TextBox::new(1, Rect::new(x0, x1, top, top + 10.0), text)
            .with_layout(LayoutTag::new(LayoutType::Table, 0, Some(0.9)))
    }

    #[test]
    fn test_crop_and_band_coordinates() {
        let doc = TestDocument::pages(2);
        let ctx = doc.context();
        let images = vec![RgbImage::from_pixel(1800, 2400, Rgb([255, 255, 255])); 2];
        let regions = vec![LayoutRegion::new(
            LayoutType::Table,
            Rect::new(100.0, 300.0, 1000.0, 1200.0),
            0.9,
            2,
        )];
        let (crops, placements) = table_crops(&images, &regions, &ctx);
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].page_index, 1);
        assert_eq!((crops[0].image.width(), crops[0].image.height()), (660, 660));
        assert_eq!(placements[0].table_id, "table-0");
        assert_eq!((placements[0].origin_x, placements[0].origin_y), (270.0, 570.0));

        let detections = vec![vec![
            RegionDetection::new("table row", Rect::new(0.0, 660.0, 30.0, 60.0), 0.9),
            RegionDetection::new("table column", Rect::new(30.0, 30.0, 0.0, 660.0), 0.9),
            RegionDetection::new("cell", Rect::new(0.0, 10.0, 0.0, 10.0), 0.9),
        ]];
        let bands = bands_from_detections(&detections, &placements, &ctx);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].kind, BandKind::Row);
        assert_eq!(bands[0].rect, Rect::new(90.0, 310.0, 1000.0, 1010.0));
        assert_eq!(bands[0].page, 2);
    }

    #[test]
    fn test_rotation_needs_clear_gain_over_upright() {
        let turned = [
            (TableRotation::Upright, read(0.5, 2)),
            (TableRotation::Cw90, read(0.95, 2)),
            (TableRotation::Cw180, read(0.1, 2)),
        ];
        assert_eq!(choose_rotation(&turned), TableRotation::Cw90);

        // Upright is already confident
        let confident = [
            (TableRotation::Upright, read(0.85, 2)),
            (TableRotation::Cw270, read(1.0, 50)),
        ];
        assert_eq!(choose_rotation(&confident), TableRotation::Upright);

        // Gain below the margin
        let close = [
            (TableRotation::Upright, read(0.7, 2)),
            (TableRotation::Cw90, read(0.85, 2)),
        ];
        assert_eq!(choose_rotation(&close), TableRotation::Upright);
        assert_eq!(choose_rotation(&[]), TableRotation::Upright);
    }

    #[test]
    fn test_line_bonus_saturates() {
        assert_eq!(read(0.5, 0).combined(), 0.5);
        assert!((read(0.5, 50).combined() - 0.55).abs() < 1e-6);
        assert_eq!(read(0.5, 500).combined(), read(0.5, 50).combined());
        assert_eq!(OrientationScore::of(&OcrPage::default()).combined(), 0.0);
    }

    #[test]
    fn test_turned_table_boxes_replace_originals() {
        let doc = TestDocument::pages(2);
        let ctx = doc.context();
        let images = vec![RgbImage::from_pixel(1800, 2400, Rgb([255, 255, 255])); 2];
        let regions = vec![LayoutRegion::new(
            LayoutType::Table,
            Rect::new(100.0, 300.0, 1000.0, 1200.0),
            0.9,
            2,
        )];
        let (mut crops, placements) = table_crops(&images, &regions, &ctx);
        let reader = TurnedReader {
            readable: TableRotation::Cw90,
            upright_score: 0.3,
        };
        let reads = orient_table_crops(&mut crops, &reader);
        assert_eq!(crops[0].rotation, TableRotation::Cw90);
        assert!(reads[0].is_some());

        let tag = LayoutTag::new(LayoutType::Table, 0, Some(0.9));
        let mut boxes = vec![
            TextBox::new(1, Rect::new(10.0, 200.0, 100.0, 110.0), "Before"),
            TextBox::new(2, Rect::new(110.0, 150.0, 1010.0, 1020.0), "ʎʇQ").with_layout(tag.clone()),
            TextBox::new(2, Rect::new(160.0, 200.0, 1010.0, 1020.0), "ǝɔᴉɹd").with_layout(tag),
            TextBox::new(2, Rect::new(10.0, 200.0, 1300.0, 1310.0), "After"),
        ];
        replace_turned_table_boxes(&mut boxes, &reads, &placements, &ctx);

        let texts: Vec<&str> = boxes.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Before", "Qty", "Price", "After"]);
        // Crop pixels shifted by the crop origin (270, 570), over zoom, on page 2
        let qty = &boxes[1];
        assert!((qty.rect.x0 - 275.0 / 3.0).abs() < 1e-3);
        assert!((qty.rect.top - (800.0 + 575.0 / 3.0)).abs() < 1e-3);
        assert_eq!(qty.layout_id(), Some("table-0"));
        assert_eq!(qty.page, 2);
    }

    #[test]
    fn test_unreadable_tables_stay_upright_with_their_boxes() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let images = vec![RgbImage::from_pixel(1800, 2400, Rgb([255, 255, 255]))];
        let regions = vec![LayoutRegion::new(
            LayoutType::Table,
            Rect::new(100.0, 300.0, 100.0, 200.0),
            0.9,
            1,
        )];
        let (mut crops, placements) = table_crops(&images, &regions, &ctx);
        let reads = orient_table_crops(&mut crops, &BrokenReader);
        assert_eq!(crops[0].rotation, TableRotation::Upright);
        assert!(reads[0].is_none());

        // A turned read whose lines are all doubtful keeps the original boxes
        let doubtful = vec![Some(OcrPage {
            lines: vec![OcrLine::new(Rect::new(5.0, 60.0, 5.0, 20.0), "Q7y", 0.3)],
            chars: Vec::new(),
        })];
        let mut boxes = vec![cell(110.0, 150.0, 110.0, "Qty")];
        replace_turned_table_boxes(&mut boxes, &doubtful, &placements, &ctx);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].text, "Qty");
    }

    #[test]
    fn test_normalize_few_bands_uses_outer_edges() {
        let mut bands = vec![
            band(BandKind::Row, 12.0, 200.0, 0.0, 10.0),
            band(BandKind::ColumnHeader, 10.0, 190.0, 0.0, 10.0),
            band(BandKind::Column, 10.0, 50.0, 2.0, 30.0),
            band(BandKind::Column, 50.0, 200.0, 0.0, 28.0),
        ];
        normalize_bands(&mut bands);
        assert_eq!((bands[0].rect.x0, bands[0].rect.x1), (10.0, 200.0));
        assert_eq!((bands[1].rect.x0, bands[1].rect.x1), (10.0, 200.0));
        assert_eq!((bands[2].rect.top, bands[2].rect.bottom), (0.0, 30.0));
        assert_eq!((bands[3].rect.top, bands[3].rect.bottom), (0.0, 30.0));
    }

    #[test]
    fn test_normalize_many_rows_uses_mean_and_only_grows() {
        let mut bands: Vec<TableBand> = (0..5)
            .map(|i| {
                let f = i as f32;
                band(BandKind::Row, 10.0 + f, 100.0 + f, f * 10.0, f * 10.0 + 10.0)
            })
            .collect();
        normalize_bands(&mut bands);
        // Mean edges are 12 and 102
        assert_eq!(bands[0].rect.x0, 10.0);
        assert_eq!(bands[4].rect.x0, 12.0);
        assert_eq!(bands[0].rect.x1, 102.0);
        assert_eq!(bands[4].rect.x1, 104.0);
    }

    #[test]
    fn test_boxes_get_row_column_header_and_span() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let raw = vec![
            band(BandKind::ColumnHeader, 0.0, 300.0, 100.0, 120.0),
            band(BandKind::Row, 0.0, 300.0, 100.0, 120.0),
            band(BandKind::Row, 0.0, 300.0, 120.0, 140.0),
            band(BandKind::Column, 0.0, 100.0, 100.0, 140.0),
            band(BandKind::Column, 100.0, 200.0, 100.0, 140.0),
            band(BandKind::Column, 200.0, 300.0, 100.0, 140.0),
            band(BandKind::SpanningCell, 0.0, 200.0, 100.0, 120.0),
        ];
        let mut boxes = vec![
            cell(10.0, 150.0, 105.0, "Merged header"),
            cell(210.0, 290.0, 105.0, "Total"),
            cell(10.0, 90.0, 125.0, "a"),
            cell(110.0, 190.0, 125.0, "b"),
            cell(210.0, 290.0, 125.0, "c"),
            TextBox::new(1, Rect::new(10.0, 90.0, 300.0, 310.0), "prose"),
        ];
        let bands = gather_bands(&raw, &boxes);
        // The header band duplicates the first row band and is folded into it
        assert_eq!(bands.rows.len(), 2);
        assert_eq!(bands.headers.len(), 1);
        assert_eq!(bands.columns.len(), 3);
        tag_table_boxes(&mut boxes, &bands, &ctx);

        assert_eq!(boxes[0].table.span, Some(0));
        assert_eq!(boxes[0].table.span_extent, Some(Rect::new(0.0, 200.0, 100.0, 120.0)));
        assert_eq!(boxes[1].table.header, Some(0));
        assert!(boxes[1].table.span.is_none());
        assert_eq!(boxes[2].table.column_index(), Some(0));
        assert_eq!(boxes[3].table.column_index(), Some(1));
        assert_eq!(boxes[4].table.column_index(), Some(2));
        assert_eq!(boxes[2].table.row_index(), boxes[4].table.row_index());
        assert_ne!(boxes[1].table.row_index(), boxes[2].table.row_index());
        assert!(boxes[5].table.is_empty());
    }

    #[test]
    fn test_column_falls_back_to_tightest_fit_within_table() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let mut other = band(BandKind::Column, 300.0, 320.0, 0.0, 200.0);
        other.table_id = "table-1".to_string();
        let raw = vec![band(BandKind::Column, 0.0, 100.0, 0.0, 200.0), other];
        let mut boxes = vec![cell(280.0, 330.0, 50.0, "stray")];
        let bands = gather_bands(&raw, &boxes);
        tag_table_boxes(&mut boxes, &bands, &ctx);
        let matched = boxes[0].table.column_index().map(|i| bands.columns[i].table_id.as_str());
        assert_eq!(matched, Some("table-0"));
    }
}
