//! Layout region reconciliation and box tagging.
//!
//! # Stage definition
//!
//! - Input: document-global [`TextBox`]es and per-page [`RegionDetection`]s
//! - Output: boxes carrying a [`LayoutTag`], garbage dropped, plus the
//!   deduplicated [`LayoutRegion`]s with their `visited` flags
//! - Region types are claimed in [`LayoutType::ASSIGNMENT_ORDER`]; a box keeps
//!   the first region type that covers at least the configured share of it
//!
//! Header, footer and reference boxes are not discarded on sight. Their texts
//! are counted over the whole document and only texts seen more than once are
//! removed, everywhere they occur.

use super::StageContext;
use crate::core::RegionDetection;
use crate::domain::{LayoutRegion, LayoutTag, LayoutType, TextBox};
use crate::processors::{find_overlapped_with_threshold, layouts_cleanup, mean, sort_rows_first};
use std::collections::{HashMap, HashSet};

/// Footer boxes above this fraction of the page height are body text.
const FOOTER_KEEP_RATIO: f32 = 0.9;
/// Header boxes below this fraction of the page height are body text.
const HEADER_KEEP_RATIO: f32 = 0.1;

/// Boxes after tagging, with the regions that produced the tags.
#[derive(Debug, Clone, Default)]
pub struct TaggedLayout {
    pub boxes: Vec<TextBox>,
    /// Deduplicated regions, grouped by page in row-first order.
    pub regions: Vec<LayoutRegion>,
}

/// Converts detector output for 1-based `page` into document-global regions.
///
/// Unknown labels and degenerate rectangles are skipped. Header, footer and
/// reference detections scoring below `min_score` are discarded.
pub fn regions_from_detections(
    page: usize,
    detections: &[RegionDetection],
    zoom: f32,
    offset: f32,
    min_score: f32,
) -> Vec<LayoutRegion> {
    detections
        .iter()
        .filter_map(|d| {
            let Some(kind) = LayoutType::from_label(&d.label) else {
                tracing::debug!(target: "layout", page, label = %d.label, "unknown layout label");
                return None;
            };
            if kind.is_page_furniture() && d.score < min_score {
                return None;
            }
            let rect = d.rect.scale_down(zoom).translate(0.0, offset);
            (!rect.is_degenerate()).then(|| LayoutRegion::new(kind, rect, d.score, page))
        })
        .collect()
}

/// Regions of `kind` on `page`, in the order that defines their layout ids.
pub fn regions_of<'r>(
    regions: &'r [LayoutRegion],
    page: usize,
    kind: LayoutType,
) -> impl Iterator<Item = &'r LayoutRegion> {
    regions
        .iter()
        .filter(move |r| r.page == page && r.kind == kind)
}

/// Whether a box inside a furniture region sits where body text lives.
fn keeps_as_content(b: &TextBox, kind: LayoutType, ctx: &StageContext<'_>) -> bool {
    let offset = ctx.pages.offset(b.page);
    let height = ctx.pages.height(b.page);
    match kind {
        LayoutType::Footer => b.rect.bottom - offset < height * FOOTER_KEEP_RATIO,
        LayoutType::Header => b.rect.top - offset > height * HEADER_KEEP_RATIO,
        _ => false,
    }
}

struct PageTagging {
    boxes: Vec<TextBox>,
    /// Indices into `boxes` that landed in header, footer or reference regions.
    furniture: Vec<usize>,
    regions: Vec<LayoutRegion>,
}

fn tag_page(
    page: usize,
    boxes: Vec<TextBox>,
    mut regions: Vec<LayoutRegion>,
    ctx: &StageContext<'_>,
) -> PageTagging {
    let heights: Vec<f32> = regions.iter().map(|r| r.rect.height()).collect();
    sort_rows_first(&mut regions, mean(&heights) / 2.0);
    layouts_cleanup(
        &boxes,
        &mut regions,
        ctx.config.layout_cleanup_window,
        ctx.config.layout_cleanup_threshold,
    );

    let mut boxes: Vec<TextBox> = boxes
        .into_iter()
        .filter(|b| {
            let garbage = ctx.patterns.is_garbage(&b.text);
            if garbage {
                tracing::debug!(target: "layout", page, text = %b.text, "dropping garbage text");
            }
            !garbage
        })
        .collect();
    let mut furniture = Vec::new();

    for kind in LayoutType::ASSIGNMENT_ORDER {
        let typed: Vec<usize> = (0..regions.len()).filter(|&i| regions[i].kind == kind).collect();
        if typed.is_empty() {
            continue;
        }
        let rects: Vec<_> = typed.iter().map(|&i| regions[i].rect).collect();
        for (bi, b) in boxes.iter_mut().enumerate() {
            if b.layout.is_some() {
                continue;
            }
            let Some(k) = find_overlapped_with_threshold(
                &b.rect,
                &rects,
                ctx.config.layout_overlap_threshold,
            ) else {
                continue;
            };
            let region = &mut regions[typed[k]];
            region.visited = true;
            b.layout = Some(LayoutTag::for_region(region, k));
            if kind.is_page_furniture() && !keeps_as_content(b, kind, ctx) {
                furniture.push(bi);
            }
        }
    }

    for kind in [LayoutType::Figure, LayoutType::Equation] {
        let unvisited: Vec<(usize, &LayoutRegion)> = regions
            .iter()
            .filter(|r| r.kind == kind)
            .enumerate()
            .filter(|(_, r)| !r.visited)
            .collect();
        for (k, region) in unvisited {
            boxes.push(
                TextBox::new(page, region.rect, "").with_layout(LayoutTag::for_region(region, k)),
            );
        }
    }

    PageTagging {
        boxes,
        furniture,
        regions,
    }
}

/// Tags every box and removes recurring page furniture.
pub fn tag_layouts(
    boxes: Vec<TextBox>,
    regions: Vec<LayoutRegion>,
    ctx: &StageContext<'_>,
) -> TaggedLayout {
    let mut boxes_by_page: Vec<Vec<TextBox>> = vec![Vec::new(); ctx.pages.len()];
    for b in boxes {
        if let Some(slot) = b.page.checked_sub(1).and_then(|i| boxes_by_page.get_mut(i)) {
            slot.push(b);
        }
    }
    let mut regions_by_page: Vec<Vec<LayoutRegion>> = vec![Vec::new(); ctx.pages.len()];
    for r in regions {
        if let Some(slot) = r.page.checked_sub(1).and_then(|i| regions_by_page.get_mut(i)) {
            slot.push(r);
        }
    }

    let mut tagged = TaggedLayout::default();
    let mut furniture_texts: Vec<String> = Vec::new();
    for (i, (page_boxes, page_regions)) in boxes_by_page.into_iter().zip(regions_by_page).enumerate() {
        let page = tag_page(i + 1, page_boxes, page_regions, ctx);
        furniture_texts.extend(page.furniture.iter().map(|&bi| page.boxes[bi].text.trim().to_string()));
        tagged.boxes.extend(page.boxes);
        tagged.regions.extend(page.regions);
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for text in &furniture_texts {
        *counts.entry(text.as_str()).or_default() += 1;
    }
    let recurring: HashSet<&str> = counts
        .into_iter()
        .filter(|&(text, count)| count > 1 && !text.is_empty())
        .map(|(text, _)| text)
        .collect();
    if !recurring.is_empty() {
        let before = tagged.boxes.len();
        tagged.boxes.retain(|b| !recurring.contains(b.text.trim()));
        tracing::debug!(
            target: "layout",
            texts = recurring.len(),
            removed = before - tagged.boxes.len(),
            "removed recurring page furniture"
        );
    }
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::Rect;
    use crate::reflow::testing::TestDocument;

    fn region(kind: LayoutType, page: usize, x0: f32, x1: f32, top: f32, bottom: f32) -> LayoutRegion {
        let offset = (page - 1) as f32 * 800.0;
        LayoutRegion::new(kind, Rect::new(x0, x1, offset + top, offset + bottom), 0.9, page)
    }

    fn text_box(page: usize, x0: f32, x1: f32, top: f32, text: &str) -> TextBox {
        let offset = (page - 1) as f32 * 800.0;
        TextBox::new(page, Rect::new(x0, x1, offset + top, offset + top + 10.0), text)
    }

    #[test]
    fn test_regions_from_detections() {
        let detections = vec![
            RegionDetection::new("text", Rect::new(30.0, 300.0, 60.0, 90.0), 0.95),
            RegionDetection::new("header", Rect::new(30.0, 300.0, 0.0, 30.0), 0.2),
            RegionDetection::new("figure", Rect::new(30.0, 300.0, 90.0, 300.0), 0.2),
            RegionDetection::new("seal", Rect::new(30.0, 300.0, 90.0, 300.0), 0.9),
            RegionDetection::new("table", Rect::new(30.0, 30.0, 90.0, 300.0), 0.9),
        ];
        let regions = regions_from_detections(2, &detections, 3.0, 800.0, 0.4);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].kind, LayoutType::Text);
        assert_eq!(regions[0].rect, Rect::new(10.0, 100.0, 820.0, 830.0));
        assert_eq!(regions[1].kind, LayoutType::Figure);
        assert_eq!(regions[1].page, 2);
    }

    #[test]
    fn test_boxes_take_matching_regions() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let regions = vec![
            region(LayoutType::Title, 1, 40.0, 400.0, 95.0, 115.0),
            region(LayoutType::Text, 1, 40.0, 560.0, 130.0, 300.0),
        ];
        let boxes = vec![
            text_box(1, 50.0, 300.0, 100.0, "Introduction"),
            text_box(1, 50.0, 500.0, 140.0, "Body text line"),
            text_box(1, 50.0, 500.0, 500.0, "Outside every region"),
            text_box(1, 50.0, 100.0, 600.0, "3 / 12"),
        ];
        let tagged = tag_layouts(boxes, regions, &ctx);
        assert_eq!(tagged.boxes.len(), 3);
        assert_eq!(tagged.boxes[0].layout_id(), Some("title-0"));
        assert_eq!(tagged.boxes[1].layout_id(), Some("text-0"));
        assert!(tagged.boxes[2].layout.is_none());
        assert!(tagged.regions.iter().all(|r| r.visited));
    }

    #[test]
    fn test_recurring_furniture_removed_and_one_offs_kept() {
        let doc = TestDocument::pages(3);
        let ctx = doc.context();
        let mut regions = Vec::new();
        let mut boxes = Vec::new();
        for page in 1..=3 {
            regions.push(region(LayoutType::Header, page, 40.0, 560.0, 10.0, 30.0));
            regions.push(region(LayoutType::Text, page, 40.0, 560.0, 100.0, 400.0));
            boxes.push(text_box(page, 50.0, 300.0, 15.0, "ACME Annual Report"));
            boxes.push(text_box(page, 50.0, 500.0, 120.0, &format!("Body of page {page}")));
        }
        boxes.push(text_box(2, 320.0, 550.0, 15.0, "Confidential draft"));

        let tagged = tag_layouts(boxes, regions, &ctx);
        let texts: Vec<&str> = tagged.boxes.iter().map(|b| b.text.as_str()).collect();
        assert!(!texts.contains(&"ACME Annual Report"), "texts: {:?}", texts);
        assert!(texts.contains(&"Confidential draft"));
        assert_eq!(texts.iter().filter(|t| t.starts_with("Body")).count(), 3);
        let one_off = tagged
            .boxes
            .iter()
            .find(|b| b.text == "Confidential draft")
            .map(|b| b.layout_kind());
        assert_eq!(one_off, Some(Some(LayoutType::Header)));
    }

    #[test]
    fn test_footer_region_mid_page_is_content() {
        let doc = TestDocument::pages(2);
        let ctx = doc.context();
        let mut regions = Vec::new();
        let mut boxes = Vec::new();
        for page in 1..=2 {
            regions.push(region(LayoutType::Footer, page, 40.0, 560.0, 390.0, 420.0));
            boxes.push(text_box(page, 50.0, 300.0, 400.0, "See appendix"));
        }
        let tagged = tag_layouts(boxes, regions, &ctx);
        assert_eq!(tagged.boxes.len(), 2);
    }

    #[test]
    fn test_unvisited_figures_become_boxes() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let regions = vec![
            region(LayoutType::Figure, 1, 40.0, 300.0, 100.0, 300.0),
            region(LayoutType::Equation, 1, 40.0, 300.0, 400.0, 430.0),
            region(LayoutType::Equation, 1, 40.0, 300.0, 500.0, 530.0),
        ];
        let boxes = vec![text_box(1, 50.0, 200.0, 505.0, "E = mc2")];
        let tagged = tag_layouts(boxes, regions, &ctx);

        assert_eq!(tagged.boxes[0].layout_id(), Some("equation-1"));
        assert_eq!(tagged.boxes[0].layout_kind(), Some(LayoutType::Figure));
        let empties: Vec<&str> = tagged
            .boxes
            .iter()
            .filter(|b| b.text.is_empty())
            .filter_map(|b| b.layout_id())
            .collect();
        assert_eq!(empties, vec!["figure-0", "equation-0"]);
    }

    #[test]
    fn test_overlapping_regions_deduplicated() {
        let doc = TestDocument::single_page();
        let ctx = doc.context();
        let mut low = region(LayoutType::Text, 1, 40.0, 560.0, 100.0, 300.0);
        low.score = 0.5;
        let high = region(LayoutType::Text, 1, 42.0, 560.0, 102.0, 300.0);
        let boxes = vec![text_box(1, 50.0, 500.0, 150.0, "Body")];
        let tagged = tag_layouts(boxes, vec![low, high], &ctx);
        assert_eq!(tagged.regions.len(), 1);
        assert_eq!(tagged.regions[0].score, 0.9);
        assert_eq!(tagged.boxes[0].layout_id(), Some("text-0"));
    }
}
