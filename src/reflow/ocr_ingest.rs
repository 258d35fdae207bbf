//! Turns raw OCR output into page-local text boxes.
//!
//! # Stage definition
//!
//! - Input: one [`OcrPage`] per rendered page, in pixel coordinates
//! - Output: an [`IngestedPage`] holding row-sorted [`TextBox`]es in page units
//!   (pixels divided by zoom) together with the page's [`PageGeometry`]
//! - Degenerate rectangles are dropped here and never reach later stages
//!
//! When the recognizer also returns character boxes, each character is
//! attached to the line it overlaps most and the line text is rebuilt from
//! them. Lines without characters keep the recognized text.

use crate::core::{OcrLine, OcrPage};
use crate::domain::{PageGeometry, TextBox};
use crate::processors::{Rect, Spatial, find_overlapped, sort_rows_first};

/// Characters whose height differs from the line's by this fraction or more
/// are not attached to it.
const CHAR_HEIGHT_TOLERANCE: f32 = 0.7;

/// A scaled OCR line or character.
#[derive(Debug, Clone)]
struct Glyph<'a> {
    rect: Rect,
    text: &'a str,
}

impl Spatial for Glyph<'_> {
    fn rect(&self) -> &Rect {
        &self.rect
    }
}

/// One page after ingestion.
#[derive(Debug, Clone)]
pub struct IngestedPage {
    /// Boxes in page-local units; the engine shifts them onto the document axis.
    pub boxes: Vec<TextBox>,
    pub geometry: PageGeometry,
}

fn scaled(line: &OcrLine, zoom: f32) -> Option<Glyph<'_>> {
    let rect = line.rect.scale_down(zoom);
    if rect.is_degenerate() {
        tracing::debug!(
            target: "ingest",
            x0 = line.rect.x0,
            x1 = line.rect.x1,
            top = line.rect.top,
            bottom = line.rect.bottom,
            "dropping degenerate box"
        );
        return None;
    }
    Some(Glyph {
        rect,
        text: line.text.as_str(),
    })
}

/// A space survives only after a Latin letter, digit or ASCII punctuation.
fn keeps_space(prev: char) -> bool {
    prev.is_ascii_alphanumeric() || ",.?;:!%".contains(prev) || matches!(prev, 'а'..='я' | 'А'..='Я')
}

/// Ingests one page.
///
/// `page` is the 1-based page number within the rendered range; `width` and
/// `height` are the rendered image size in pixels.
pub fn ingest_page(page: usize, ocr: &OcrPage, width: u32, height: u32, zoom: f32) -> IngestedPage {
    let page_width = width as f32 / zoom;
    let page_height = height as f32 / zoom;

    let mut lines: Vec<(Rect, String)> = ocr
        .lines
        .iter()
        .filter_map(|l| scaled(l, zoom))
        .map(|g| (g.rect, g.text.to_string()))
        .collect();
    let mut chars: Vec<Glyph<'_>> = ocr.chars.iter().filter_map(|c| scaled(c, zoom)).collect();

    let line_rects: Vec<Rect> = lines.iter().map(|(r, _)| *r).collect();
    let char_rects: Vec<Rect> = chars.iter().map(|g| g.rect).collect();
    let geometry = PageGeometry::measure(page_width, page_height, &char_rects, &line_rects);

    if !chars.is_empty() {
        sort_rows_first(&mut chars, geometry.mean_height / 4.0);
        lines.sort_by(|a, b| a.0.top.total_cmp(&b.0.top));
        let sorted_rects: Vec<Rect> = lines.iter().map(|(r, _)| *r).collect();

        let mut attached: Vec<Vec<&str>> = vec![Vec::new(); lines.len()];
        for glyph in &chars {
            let Some(idx) = find_overlapped(&glyph.rect, &sorted_rects, false) else {
                continue;
            };
            let (ch, bh) = (glyph.rect.height(), sorted_rects[idx].height());
            if (ch - bh).abs() / ch.max(bh) >= CHAR_HEIGHT_TOLERANCE {
                continue;
            }
            attached[idx].push(glyph.text);
        }

        for ((_, line_text), glyphs) in lines.iter_mut().zip(attached) {
            if glyphs.iter().all(|g| g.trim().is_empty()) {
                continue;
            }
            let mut rebuilt = String::new();
            for glyph in glyphs {
                if glyph.trim().is_empty() {
                    if rebuilt.chars().last().is_some_and(keeps_space) {
                        rebuilt.push(' ');
                    }
                } else {
                    rebuilt.push_str(glyph);
                }
            }
            *line_text = rebuilt;
        }
    }

    let mut boxes: Vec<TextBox> = lines
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(rect, text)| TextBox::new(page, rect, text.trim().to_string()))
        .collect();
    sort_rows_first(&mut boxes, geometry.mean_height / 3.0);

    tracing::debug!(
        target: "ingest",
        page,
        boxes = boxes.len(),
        mean_height = geometry.mean_height,
        "page ingested"
    );
    IngestedPage { boxes, geometry }
}
