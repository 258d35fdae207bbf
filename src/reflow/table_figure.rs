//! Lifts tables and figures out of the text stream.
//!
//! # Stage definition
//!
//! - Input: boxes after concatenation and page filtering, the layout regions,
//!   and (optionally) the rendered pages
//! - Output: an [`Extracted`] holding the remaining text boxes and one
//!   [`PlacedVisual`] per figure and table, figures first
//!
//! Boxes are grouped by `(page, layout id)`. Table groups on consecutive pages
//! are joined when nothing caption-like separates them and the vertical gap
//! is small. Caption boxes still in the text are moved to the closest group.

use super::StageContext;
use super::layout_tagger::regions_of;
use super::table_builder::construct_table;
use crate::domain::{
    FigureChunk, LayoutRegion, LayoutType, PagePosition, TableChunk, TextBox, VisualChunk,
};
use crate::processors::{Rect, find_overlapped};
use crate::utils::{crop_region, stack_vertically};
use image::RgbImage;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Figure lines starting like an axis label or tick value are not kept as text.
static CHART_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-z.+%-]").expect("Invalid chart label regex"));

/// Figure lines shorter than this are treated as chart labels.
const MIN_FIGURE_LINE_CHARS: usize = 4;

/// A figure or table together with where it sat in the document.
#[derive(Debug, Clone)]
pub struct PlacedVisual {
    pub chunk: VisualChunk,
    /// 1-based page of the first box.
    pub page: usize,
    /// Document-global bounds of the boxes on the first page.
    pub rect: Rect,
}

/// Output of [`extract_tables_and_figures`].
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub boxes: Vec<TextBox>,
    pub visuals: Vec<PlacedVisual>,
}

impl Extracted {
    pub fn chunks(&self) -> impl Iterator<Item = &VisualChunk> {
        self.visuals.iter().map(|v| &v.chunk)
    }
}

#[derive(Debug)]
struct Group {
    key: String,
    boxes: Vec<TextBox>,
}

fn is_caption_box(b: &TextBox, ctx: &StageContext<'_>) -> bool {
    ctx.patterns.is_caption(&b.text) || b.layout_kind().is_some_and(|k| k.is_caption())
}

fn push_to_group(groups: &mut Vec<Group>, key: &str, b: TextBox) {
    match groups.iter_mut().find(|g| g.key == key) {
        Some(group) => group.boxes.push(b),
        None => groups.push(Group {
            key: key.to_string(),
            boxes: vec![b],
        }),
    }
}

/// Splits table and figure boxes from the text.
///
/// Returns `(text, tables, figures, keys after which no table may continue)`.
fn split_groups(
    boxes: Vec<TextBox>,
    ctx: &StageContext<'_>,
) -> (Vec<TextBox>, Vec<Group>, Vec<Group>, HashSet<String>) {
    let mut text = Vec::with_capacity(boxes.len());
    let mut tables: Vec<Group> = Vec::new();
    let mut figures: Vec<Group> = Vec::new();
    let mut no_merge = HashSet::new();
    let mut last_key = String::new();

    for b in boxes {
        let Some(id) = b.layout_id() else {
            text.push(b);
            continue;
        };
        let key = format!("{}-{}", b.page, id);
        let kind = b.layout_kind();
        if is_caption_box(&b, ctx)
            || matches!(
                kind,
                Some(LayoutType::Title | LayoutType::Reference | LayoutType::TableCaption | LayoutType::FigureCaption)
            )
        {
            no_merge.insert(last_key.clone());
        }
        let target = match kind {
            Some(LayoutType::Table) => &mut tables,
            Some(LayoutType::Figure) if ctx.config.need_image => &mut figures,
            _ => {
                text.push(b);
                continue;
            }
        };
        if ctx.patterns.is_source_line(&b.text) {
            tracing::debug!(target: "table_figure", text = %b.text, "dropping source line");
            continue;
        }
        push_to_group(target, &key, b);
        last_key = key;
    }
    (text, tables, figures, no_merge)
}

/// Joins tables continuing onto the next page, scanning bottom-up.
fn merge_cross_page(mut tables: Vec<Group>, no_merge: &HashSet<String>, ctx: &StageContext<'_>) -> Vec<Group> {
    tables.sort_by(|a, b| {
        let (ra, rb) = (&a.boxes[0].rect, &b.boxes[0].rect);
        ra.top.total_cmp(&rb.top).then(ra.x0.total_cmp(&rb.x0))
    });
    let mut i = tables.len();
    while i > 1 {
        i -= 1;
        let (prev, cur) = (&tables[i - 1], &tables[i]);
        if no_merge.contains(&prev.key) {
            continue;
        }
        let (prev_first, cur_first) = (&prev.boxes[0], &cur.boxes[0]);
        if cur_first.page != prev_first.page + 1 {
            continue;
        }
        let Some(prev_last) = prev.boxes.last() else {
            continue;
        };
        let mh = ctx.pages.mean_height(cur_first.page);
        if prev_last.rect.y_distance(&cur_first.rect) > mh * ctx.config.cross_page_table_gap {
            continue;
        }
        tracing::debug!(target: "table_figure", from = %cur.key, into = %prev.key, "joining cross-page table");
        let moved = tables.remove(i);
        tables[i - 1].boxes.extend(moved.boxes);
    }
    tables
}

/// Squared distance from a caption to the closest non-caption box of an
/// unclaimed group.
fn nearest_group(caption: &Rect, groups: &[Group], claimed: &HashSet<usize>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (gi, group) in groups.iter().enumerate().filter(|(gi, _)| !claimed.contains(gi)) {
        for b in group.boxes.iter().filter(|b| !b.layout_kind().is_some_and(|k| k.is_caption())) {
            let dy = caption.y_distance(&b.rect);
            let dx = if caption.overlaps_horizontally(&b.rect) {
                0.0
            } else {
                caption.x_distance(&b.rect)
            };
            let dis = dy * dy + dx * dx;
            if best.is_none_or(|(_, d)| dis < d) {
                best = Some((gi, dis));
            }
        }
    }
    best
}

/// Moves caption boxes to the nearest table or figure within range that has
/// no caption yet. Captions left without a group stay in the text.
fn attach_captions(text: &mut Vec<TextBox>, tables: &mut [Group], figures: &mut [Group], ctx: &StageContext<'_>) {
    let limit = ctx.config.caption_max_distance * ctx.config.caption_max_distance;
    let mut claimed_tables = HashSet::new();
    let mut claimed_figures = HashSet::new();
    let mut i = 0;
    while i < text.len() {
        if !is_caption_box(&text[i], ctx) {
            i += 1;
            continue;
        }
        let rect = text[i].rect;
        let table = nearest_group(&rect, tables, &claimed_tables).filter(|(_, d)| *d <= limit);
        let figure = nearest_group(&rect, figures, &claimed_figures).filter(|(_, d)| *d <= limit);
        let target = match (table, figure) {
            (Some((t, td)), Some((_, fd))) if td < fd => {
                claimed_tables.insert(t);
                &mut tables[t]
            }
            (Some((t, _)), None) => {
                claimed_tables.insert(t);
                &mut tables[t]
            }
            (_, Some((f, _))) => {
                claimed_figures.insert(f);
                &mut figures[f]
            }
            (None, None) => {
                i += 1;
                continue;
            }
        };
        let caption = text.remove(i);
        tracing::debug!(target: "table_figure", caption = %caption.text, group = %target.key, "caption attached");
        target.boxes.insert(0, caption);
    }
}

/// Crops a group's region(s) out of the rendered pages, one rectangle per
/// page, and returns the image with the page-local rectangles used.
///
/// On a single page the matching layout region is preferred over the
/// bounds of the boxes.
fn crop_group(
    boxes: &[TextBox],
    kind: LayoutType,
    regions: &[LayoutRegion],
    page_images: &[RgbImage],
    ctx: &StageContext<'_>,
) -> (Option<RgbImage>, Vec<PagePosition>) {
    let by_page = boxes.iter().into_group_map_by(|b| b.page);
    let single_page = by_page.len() == 1;
    let mut crops = Vec::new();
    let mut positions = Vec::new();
    for page in by_page.keys().copied().sorted() {
        let members = &by_page[&page];
        let mut bounds = members
            .iter()
            .skip(1)
            .fold(members[0].rect, |acc, b| acc.union(&b.rect));
        if single_page {
            let candidates: Vec<&LayoutRegion> = regions_of(regions, page, kind).collect();
            let rects: Vec<Rect> = candidates.iter().map(|r| r.rect).collect();
            match find_overlapped(&bounds, &rects, true) {
                Some(idx) => bounds = rects[idx],
                None => tracing::warn!(
                    target: "table_figure",
                    page,
                    layout = members[0].layout_id().unwrap_or_default(),
                    "no layout region matches the extracted boxes"
                ),
            }
        }
        let local = bounds.translate(0.0, -ctx.pages.offset(page));
        positions.push(PagePosition {
            page: page + ctx.pages.page_from,
            x0: local.x0,
            x1: local.x1.max(local.x0 + 1.0),
            top: local.top,
            bottom: local.bottom,
        });
        if let Some(img) = page_images
            .get(page.wrapping_sub(1))
            .and_then(|img| crop_region(img, &local, ctx.config.zoom))
        {
            crops.push(img);
        }
    }
    let image = match crops.len() {
        0 => None,
        1 => crops.pop(),
        _ => stack_vertically(&crops),
    };
    (image, positions)
}

fn anchor(boxes: &[TextBox]) -> (usize, Rect) {
    let page = boxes.iter().map(|b| b.page).min().unwrap_or(1);
    let rect = boxes
        .iter()
        .filter(|b| b.page == page)
        .map(|b| b.rect)
        .reduce(|acc, r| acc.union(&r))
        .unwrap_or_default();
    (page, rect)
}

/// Runs the stage.
pub fn extract_tables_and_figures(
    boxes: Vec<TextBox>,
    regions: &[LayoutRegion],
    page_images: &[RgbImage],
    ctx: &StageContext<'_>,
) -> Extracted {
    let (mut text, tables, mut figures, no_merge) = split_groups(boxes, ctx);
    let mut tables = merge_cross_page(tables, &no_merge, ctx);
    attach_captions(&mut text, &mut tables, &mut figures, ctx);

    let mut visuals = Vec::with_capacity(tables.len() + figures.len());
    for group in &figures {
        let lines: Vec<String> = group
            .boxes
            .iter()
            .map(|b| b.text.trim())
            .filter(|t| {
                t.chars().count() >= MIN_FIGURE_LINE_CHARS && !CHART_LABEL.is_match(t)
            })
            .map(str::to_string)
            .collect();
        let (image, positions) = crop_group(&group.boxes, LayoutType::Figure, regions, page_images, ctx);
        let (page, rect) = anchor(&group.boxes);
        visuals.push(PlacedVisual {
            chunk: VisualChunk::Figure(FigureChunk {
                text: lines,
                positions,
                image,
            }),
            page,
            rect,
        });
    }
    for group in tables {
        let (image, positions) = crop_group(&group.boxes, LayoutType::Table, regions, page_images, ctx);
        let (page, rect) = anchor(&group.boxes);
        let Some(content) = construct_table(group.boxes, ctx) else {
            continue;
        };
        visuals.push(PlacedVisual {
            chunk: VisualChunk::Table(TableChunk {
                content,
                positions,
                image,
            }),
            page,
            rect,
        });
    }

    tracing::debug!(
        target: "table_figure",
        tables = visuals.iter().filter(|v| matches!(v.chunk, VisualChunk::Table(_))).count(),
        figures = visuals.iter().filter(|v| matches!(v.chunk, VisualChunk::Figure(_))).count(),
        remaining = text.len(),
        "tables and figures extracted"
    );
    Extracted { boxes: text, visuals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnBand, LayoutTag, RowBand, TableContent};
    use crate::reflow::testing::{PAGE_HEIGHT, TestDocument};
    use image::Rgb;

    fn tagged(page: usize, kind: LayoutType, index: usize, rect: Rect, text: &str) -> TextBox {
        TextBox::new(page, rect, text).with_layout(LayoutTag::new(kind, index, Some(0.9)))
    }

    fn table_cell(page: usize, index: usize, row: usize, col: usize, top: f32, text: &str) -> TextBox {
        let left = 100.0 + col as f32 * 100.0;
        let mut b = tagged(
            page,
            LayoutType::Table,
            index,
            Rect::new(left + 10.0, left + 90.0, top, top + 10.0),
            text,
        );
        b.table.row = Some(RowBand {
            index: row,
            top: top - 5.0,
            bottom: top + 15.0,
        });
        b.table.column = Some(ColumnBand {
            index: col,
            left,
            right: left + 100.0,
        });
        b
    }

    fn html(visual: &PlacedVisual) -> &str {
        match &visual.chunk {
            VisualChunk::Table(TableChunk {
                content: TableContent::Html(html),
                ..
            }) => html,
            other => panic!("expected html table, got {:?}", other),
        }
    }

    #[test]
    fn test_table_extracted_with_caption_and_crop() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            TextBox::new(1, Rect::new(100.0, 400.0, 50.0, 60.0), "Intro paragraph"),
            tagged(1, LayoutType::TableCaption, 0, Rect::new(100.0, 300.0, 80.0, 90.0), "Table 1 Staff"),
            table_cell(1, 0, 0, 0, 100.0, "Name"),
            table_cell(1, 0, 0, 1, 100.0, "Role"),
            table_cell(1, 0, 1, 0, 120.0, "Ada"),
            table_cell(1, 0, 1, 1, 120.0, "Engineer"),
            TextBox::new(1, Rect::new(100.0, 400.0, 200.0, 210.0), "Closing paragraph"),
        ];
        let regions = vec![LayoutRegion::new(
            LayoutType::Table,
            Rect::new(95.0, 305.0, 95.0, 135.0),
            0.9,
            1,
        )];
        let page = RgbImage::from_pixel(1800, 2400, Rgb([255, 255, 255]));
        let out = extract_tables_and_figures(boxes, &regions, &[page], &doc.context());

        let texts: Vec<&str> = out.boxes.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Intro paragraph", "Closing paragraph"]);
        assert_eq!(out.visuals.len(), 1);
        let table = html(&out.visuals[0]);
        assert!(table.starts_with("<table><caption>Table 1 Staff</caption>"), "html: {}", table);
        assert!(table.contains("<td>Ada</td><td>Engineer</td>"));

        let positions = out.visuals[0].chunk.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!((positions[0].x0, positions[0].top), (95.0, 95.0));
        let image = out.visuals[0].chunk.image().unwrap();
        assert_eq!((image.width(), image.height()), (630, 120));
    }

    #[test]
    fn test_tables_join_across_pages() {
        let doc = TestDocument::pages(2);
        let next = PAGE_HEIGHT;
        let boxes = vec![
            table_cell(1, 0, 0, 0, 760.0, "a"),
            table_cell(1, 0, 0, 1, 760.0, "b"),
            table_cell(2, 0, 0, 0, next + 20.0, "c"),
            table_cell(2, 0, 0, 1, next + 20.0, "d"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert_eq!(out.visuals.len(), 1);
        assert_eq!(out.visuals[0].chunk.positions().len(), 2);
        assert_eq!(out.visuals[0].page, 1);
    }

    #[test]
    fn test_title_between_tables_blocks_join() {
        let doc = TestDocument::pages(2);
        let next = PAGE_HEIGHT;
        let boxes = vec![
            table_cell(1, 0, 0, 0, 760.0, "a"),
            table_cell(1, 0, 0, 1, 760.0, "b"),
            tagged(2, LayoutType::Title, 0, Rect::new(100.0, 300.0, next + 5.0, next + 15.0), "Next section"),
            table_cell(2, 0, 0, 0, next + 20.0, "c"),
            table_cell(2, 0, 0, 1, next + 20.0, "d"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert_eq!(out.visuals.len(), 2);
        assert_eq!(out.boxes.len(), 1);
    }

    #[test]
    fn test_distant_tables_stay_apart() {
        let doc = TestDocument::pages(2);
        let boxes = vec![
            table_cell(1, 0, 0, 0, 100.0, "a"),
            table_cell(1, 0, 0, 1, 100.0, "b"),
            table_cell(2, 0, 0, 0, PAGE_HEIGHT + 600.0, "c"),
            table_cell(2, 0, 0, 1, PAGE_HEIGHT + 600.0, "d"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert_eq!(out.visuals.len(), 2);
    }

    #[test]
    fn test_claimed_table_rejects_second_caption() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            TextBox::new(1, Rect::new(100.0, 300.0, 80.0, 90.0), "Table 1 Staff"),
            table_cell(1, 0, 0, 0, 100.0, "Name"),
            table_cell(1, 0, 0, 1, 100.0, "Role"),
            table_cell(1, 0, 1, 0, 120.0, "Ada"),
            table_cell(1, 0, 1, 1, 120.0, "Engineer"),
            TextBox::new(1, Rect::new(100.0, 300.0, 140.0, 150.0), "Table 2 Budget"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        let texts: Vec<&str> = out.boxes.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Table 2 Budget"]);
        let table = html(&out.visuals[0]);
        assert!(table.contains("<caption>Table 1 Staff</caption>"), "html: {}", table);
        assert!(!table.contains("Budget"), "html: {}", table);
    }

    #[test]
    fn test_second_caption_falls_to_unclaimed_figure() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            TextBox::new(1, Rect::new(100.0, 300.0, 80.0, 90.0), "Table 1 Staff"),
            table_cell(1, 0, 0, 0, 100.0, "Name"),
            table_cell(1, 0, 0, 1, 100.0, "Role"),
            TextBox::new(1, Rect::new(100.0, 300.0, 115.0, 125.0), "Figure 1 Org chart"),
            tagged(1, LayoutType::Figure, 0, Rect::new(100.0, 300.0, 140.0, 180.0), ""),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert!(out.boxes.is_empty(), "left in text: {:?}", out.boxes);
        let VisualChunk::Figure(figure) = &out.visuals[0].chunk else {
            panic!("expected figure first");
        };
        assert_eq!(figure.text, vec!["Figure 1 Org chart".to_string()]);
        assert!(html(&out.visuals[1]).contains("<caption>Table 1 Staff</caption>"));
    }

    #[test]
    fn test_caption_out_of_range_stays_in_text() {
        let boxes = || {
            vec![
                table_cell(1, 0, 0, 0, 100.0, "Name"),
                table_cell(1, 0, 0, 1, 100.0, "Role"),
                TextBox::new(1, Rect::new(100.0, 300.0, 190.0, 200.0), "Table 1 Staff"),
            ]
        };
        let mut doc = TestDocument::single_page();
        let out = extract_tables_and_figures(boxes(), &[], &[], &doc.context());
        assert_eq!(out.boxes.len(), 1, "caption 90 units away must stay in the text");

        doc.config.caption_max_distance = 120.0;
        let out = extract_tables_and_figures(boxes(), &[], &[], &doc.context());
        assert!(out.boxes.is_empty());
        assert!(html(&out.visuals[0]).contains("<caption>Table 1 Staff</caption>"));
    }

    #[test]
    fn test_figures_first_and_caption_goes_to_nearest() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            tagged(1, LayoutType::Figure, 0, Rect::new(100.0, 300.0, 100.0, 200.0), ""),
            tagged(1, LayoutType::Figure, 0, Rect::new(110.0, 130.0, 190.0, 198.0), "0.5"),
            TextBox::new(1, Rect::new(100.0, 250.0, 205.0, 215.0), "Figure 2 Growth"),
            table_cell(1, 0, 0, 0, 500.0, "x"),
            table_cell(1, 0, 0, 1, 500.0, "y"),
            TextBox::new(1, Rect::new(100.0, 250.0, 700.0, 710.0), "Figure 9 far away"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert_eq!(out.visuals.len(), 2);
        let VisualChunk::Figure(figure) = &out.visuals[0].chunk else {
            panic!("figures come first");
        };
        assert_eq!(figure.text, vec!["Figure 2 Growth".to_string()]);
        assert!(figure.image.is_none());
        assert!(matches!(out.visuals[1].chunk, VisualChunk::Table(_)));
        let texts: Vec<&str> = out.boxes.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Figure 9 far away"]);
    }

    #[test]
    fn test_figures_stay_in_text_without_images() {
        let mut doc = TestDocument::single_page();
        doc.config.need_image = false;
        let boxes = vec![
            tagged(1, LayoutType::Figure, 0, Rect::new(100.0, 300.0, 100.0, 200.0), "Chart legend"),
            table_cell(1, 0, 0, 0, 500.0, "Data source: survey"),
            table_cell(1, 0, 0, 1, 500.0, "y"),
        ];
        let out = extract_tables_and_figures(boxes, &[], &[], &doc.context());
        assert_eq!(out.boxes.len(), 1);
        assert_eq!(out.visuals.len(), 1);
        assert!(html(&out.visuals[0]).contains("<td>y</td>"));
        assert!(!html(&out.visuals[0]).contains("survey"));
    }
}
