//! Final emission: stray fragments are dropped, the rest become tagged chunks.
//!
//! Starting from the first remaining box, a chain of following boxes on the
//! same page is collected: each link is the first useful box within the scan
//! window that lines up horizontally with the previous one (or any useful box,
//! when the previous one is a heading). The chain survives when it starts with
//! a heading or its mean width is large enough; otherwise it is logged and
//! discarded as a layout scrap.

use super::StageContext;
use crate::domain::{LayoutType, PositionTag, TextBox, TextChunk};
use crate::processors::mean;

/// A chain breaks when the next box is this many line heights further down...
const BREAK_GAP_LINES: f32 = 3.0;
/// ...and the current line is shorter than this many line heights.
const BREAK_LINE_HEIGHT: f32 = 1.5;
/// Boxes wider than `page width / USEFUL_WIDTH_DIVISOR` are always useful.
const USEFUL_WIDTH_DIVISOR: f32 = 3.0;
/// Linked boxes must lie within `page width / ALIGN_WIDTH_DIVISOR` horizontally.
const ALIGN_WIDTH_DIVISOR: f32 = 10.0;

fn is_heading(b: &TextBox, ctx: &StageContext<'_>) -> bool {
    b.is_layout(LayoutType::Title) || ctx.patterns.heading_level(b.text.trim()).is_some()
}

/// Tagged, wide or tall boxes are worth keeping.
fn is_useful(b: &TextBox, ctx: &StageContext<'_>) -> bool {
    b.layout.is_some()
        || b.rect.width() > ctx.pages.width(b.page) / USEFUL_WIDTH_DIVISOR
        || b.rect.height() > ctx.pages.mean_height(b.page)
}

/// Indices of the chain starting at `boxes[0]`.
fn collect_chain(boxes: &[TextBox], ctx: &StageContext<'_>) -> Vec<usize> {
    let first = &boxes[0];
    let page_width = ctx.pages.width(first.page);
    let mh = ctx.pages.mean_height(first.page);
    let mut chain = vec![0];
    let mut cur = 0;
    loop {
        let line = &boxes[cur];
        let heading = is_heading(line, ctx);
        let end = boxes.len().min(cur + ctx.config.scrap_window);
        let mut next = None;
        for i in cur + 1..end {
            let candidate = &boxes[i];
            if candidate.page > line.page {
                break;
            }
            if !heading
                && line.rect.y_distance(&candidate.rect) >= BREAK_GAP_LINES * mh
                && line.rect.height() < BREAK_LINE_HEIGHT * mh
            {
                break;
            }
            if !is_useful(candidate, ctx) {
                continue;
            }
            if heading || candidate.rect.x_distance(&line.rect) < page_width / ALIGN_WIDTH_DIVISOR {
                next = Some(i);
                break;
            }
        }
        let Some(i) = next else {
            break;
        };
        chain.push(i);
        cur = i;
    }
    chain
}

fn tagged_line(b: &TextBox, ctx: &StageContext<'_>) -> String {
    format!("{}{}", b.text, PositionTag::for_box(b, ctx.pages))
}

/// Runs the stage over the boxes left after table and figure extraction.
pub fn filter_scraps(boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Vec<TextChunk> {
    let mut boxes: Vec<TextBox> = boxes.into_iter().filter(|b| !b.text.trim().is_empty()).collect();
    let mut chunks = Vec::new();
    let mut dropped = 0usize;
    while !boxes.is_empty() {
        let first = &boxes[0];
        let starts_with_heading = is_heading(first, ctx);
        let page_width = ctx.pages.width(first.page);

        if !is_useful(first, ctx) {
            tracing::debug!(target: "scraps", text = %first.text, "waste");
            boxes.remove(0);
            dropped += 1;
            continue;
        }

        let chain = collect_chain(&boxes, ctx);
        let widths: Vec<f32> = chain.iter().map(|&i| boxes[i].rect.width()).collect();
        let mean_width = mean(&widths);
        let keep = starts_with_heading
            || mean_width / page_width >= ctx.config.scrap_min_width_ratio
            || mean_width > ctx.config.scrap_min_width;

        if keep {
            let text = chain
                .iter()
                .map(|&i| tagged_line(&boxes[i], ctx))
                .collect::<Vec<_>>()
                .join("\n");
            chunks.push(TextChunk::new(text));
        } else {
            tracing::debug!(
                target: "scraps",
                text = %chain.iter().map(|&i| boxes[i].text.as_str()).collect::<Vec<_>>().join("<<"),
                "removed"
            );
            dropped += chain.len();
        }
        for &i in chain.iter().rev() {
            boxes.remove(i);
        }
    }
    tracing::debug!(target: "scraps", chunks = chunks.len(), dropped, "text emitted");
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LayoutTag;
    use crate::processors::Rect;
    use crate::reflow::testing::{PAGE_HEIGHT, TestDocument};

    fn line(page: usize, x0: f32, x1: f32, top: f32, text: &str) -> TextBox {
        let top = (page - 1) as f32 * PAGE_HEIGHT + top;
        TextBox::new(page, Rect::new(x0, x1, top, top + 10.0), text)
    }

    #[test]
    fn test_wide_lines_emitted_with_tags() {
        let doc = TestDocument::pages(2);
        let boxes = vec![
            line(1, 50.0, 500.0, 100.0, "First paragraph line"),
            line(1, 50.0, 480.0, 112.0, "continues here"),
            line(2, 50.0, 500.0, 40.0, "Second page"),
        ];
        let chunks = filter_scraps(boxes, &doc.context());
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].text,
            "First paragraph line@@1\t50.0\t500.0\t100.0\t110.0##\ncontinues here@@1\t50.0\t480.0\t112.0\t122.0##"
        );
        assert_eq!(chunks[1].text, "Second page@@2\t50.0\t500.0\t40.0\t50.0##");
        assert_eq!(chunks[1].plain_text(), "Second page");
    }

    #[test]
    fn test_narrow_fragments_dropped() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            line(1, 50.0, 500.0, 100.0, "Body text that spans the page"),
            line(1, 520.0, 560.0, 300.0, "p. 3"),
            TextBox::new(1, Rect::new(20.0, 60.0, 400.0, 410.0), "tag")
                .with_layout(LayoutTag::new(LayoutType::Text, 1, Some(0.9))),
        ];
        let chunks = filter_scraps(boxes, &doc.context());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].plain_text().starts_with("Body text"));
    }

    #[test]
    fn test_heading_survives_and_pulls_next_line() {
        let doc = TestDocument::single_page();
        let heading = TextBox::new(1, Rect::new(50.0, 120.0, 100.0, 110.0), "Summary")
            .with_layout(LayoutTag::new(LayoutType::Title, 0, Some(0.9)));
        let boxes = vec![
            heading,
            TextBox::new(1, Rect::new(300.0, 380.0, 160.0, 170.0), "short note")
                .with_layout(LayoutTag::new(LayoutType::Text, 0, Some(0.9))),
        ];
        let chunks = filter_scraps(boxes, &doc.context());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].plain_text(), "Summary\nshort note");
    }

    #[test]
    fn test_large_vertical_gap_breaks_chain() {
        let doc = TestDocument::single_page();
        let boxes = vec![
            line(1, 50.0, 500.0, 100.0, "Upper block"),
            line(1, 50.0, 500.0, 200.0, "Lower block"),
        ];
        let chunks = filter_scraps(boxes, &doc.context());
        assert_eq!(chunks.len(), 2);
    }
}
