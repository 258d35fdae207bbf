//! Downward concatenation of lines into paragraphs.
//!
//! # Stage definition
//!
//! - Input: row-sorted, horizontally merged [`TextBox`]es
//! - Output: one box per block, each block a maximal chain of accepted merges
//! - Ordering: blocks are emitted in row-first order of their first line
//!
//! Chains are grown from an immutable snapshot. A `consumed` mask stands in for
//! removal, so indices never shift while a chain is being extended.

use super::StageContext;
use super::features::ConcatFeatures;
use crate::core::{AdapterKind, ConcatenationScorer, ReflowError, ReflowResult};
use crate::domain::{LayoutType, TextBox};
use crate::processors::{join_fragments, sort_rows_first};

/// Candidates within this many examined positions accept a same-region text
/// neighbour without consulting the scorer.
const SHORT_LOOKAHEAD: usize = 5;
/// Same-page candidates further than this many line heights end the scan.
const SAME_PAGE_BREAK: f32 = 4.0;
/// Next-page candidates further than this many line heights end the scan.
const CROSS_PAGE_BREAK: f32 = 16.0;
/// Candidates separated horizontally by more than this many character widths are skipped.
const MAX_X_GAP_CHARS: f32 = 10.0;
/// Window, on either side, used to count boxes sharing a row.
const IN_ROW_WINDOW: usize = 12;

/// Counts, for every box, the neighbours within one line height vertically.
pub fn count_in_row(boxes: &mut [TextBox], ctx: &StageContext<'_>) {
    let n = boxes.len();
    for i in 0..n {
        let mh = ctx.pages.mean_height(boxes[i].page);
        let mut count = 0;
        let mut j = i.saturating_sub(IN_ROW_WINDOW);
        while j < (i + IN_ROW_WINDOW).min(n) {
            if j != i {
                let ydis = boxes[i].rect.y_distance(&boxes[j].rect) / mh;
                if ydis.abs() < 1.0 {
                    count += 1;
                } else if ydis > 0.0 {
                    break;
                }
            }
            j += 1;
        }
        boxes[i].in_row = count;
    }
}

enum Verdict {
    Accept,
    Skip,
    Stop,
}

fn judge(
    up: &TextBox,
    down: &TextBox,
    examined: usize,
    ctx: &StageContext<'_>,
    scorer: &dyn ConcatenationScorer,
) -> ReflowResult<Verdict> {
    let mh = ctx.pages.mean_height(up.page);
    let mw = ctx.pages.mean_width(up.page);
    let ydis = up.rect.y_distance(&down.rect);

    if up.page == down.page {
        if ydis > SAME_PAGE_BREAK * mh {
            return Ok(Verdict::Stop);
        }
    } else if !ctx.config.concat_between_pages || ydis > CROSS_PAGE_BREAK * mh {
        return Ok(Verdict::Stop);
    }

    if up.table.row_index() != down.table.row_index() && !up.text.trim_end().ends_with('，') {
        return Ok(Verdict::Skip);
    }
    if ctx.patterns.is_page_number(up.text.trim()) || ctx.patterns.is_page_number(down.text.trim())
    {
        return Ok(Verdict::Skip);
    }
    let max_gap = MAX_X_GAP_CHARS * mw;
    if up.rect.x1 < down.rect.x0 - max_gap || up.rect.x0 > down.rect.x1 + max_gap {
        return Ok(Verdict::Skip);
    }

    if examined < SHORT_LOOKAHEAD && up.is_layout(LayoutType::Text) {
        return Ok(if up.layout_id() == down.layout_id() {
            Verdict::Accept
        } else {
            Verdict::Skip
        });
    }

    let features = ConcatFeatures::between(up, down, ctx);
    let score = scorer.score(&features).map_err(|e| {
        tracing::warn!(target: "concat", error = %e, "concatenation scorer failed");
        ReflowError::adapter_failure(
            AdapterKind::ConcatenationScorer,
            format!("page {} box '{}'", up.page, up.text),
            e,
        )
    })?;
    Ok(if score > ctx.config.concat_accept_score {
        Verdict::Accept
    } else {
        Verdict::Skip
    })
}

/// Groups boxes into chains of indices into `boxes`.
pub fn build_blocks(
    boxes: &[TextBox],
    ctx: &StageContext<'_>,
    scorer: &dyn ConcatenationScorer,
) -> ReflowResult<Vec<Vec<usize>>> {
    let n = boxes.len();
    let mut consumed = vec![false; n];
    let mut blocks = Vec::new();

    for start in 0..n {
        if consumed[start] {
            continue;
        }
        consumed[start] = true;
        let mut chain = vec![start];
        let mut tail = start;

        loop {
            let mut examined = 0;
            let mut pos = tail + 1;
            let mut next = None;
            while pos < n && examined < ctx.config.concat_window {
                if consumed[pos] || boxes[pos].text.trim().is_empty() {
                    pos += 1;
                    continue;
                }
                match judge(&boxes[tail], &boxes[pos], examined, ctx, scorer)? {
                    Verdict::Accept => {
                        next = Some(pos);
                        break;
                    }
                    Verdict::Stop => break,
                    Verdict::Skip => {}
                }
                examined += 1;
                pos += 1;
            }
            let Some(p) = next else { break };
            consumed[p] = true;
            chain.push(p);
            tail = p;
        }
        blocks.push(chain);
    }
    Ok(blocks)
}

/// Folds one chain into a single box.
fn merge_block(boxes: &[TextBox], chain: &[usize]) -> Option<TextBox> {
    let (&first, rest) = chain.split_first()?;
    let mut merged = boxes[first].clone();
    for &idx in rest {
        let b = &boxes[idx];
        merged.text = join_fragments(&merged.text, &b.text);
        merged.rect.x0 = merged.rect.x0.min(b.rect.x0);
        merged.rect.x1 = merged.rect.x1.max(b.rect.x1);
        merged.rect.bottom = b.rect.bottom;
        merged.page = merged.page.min(b.page);
        if merged.layout.is_none() {
            merged.layout = b.layout.clone();
        }
    }
    Some(merged)
}

/// Runs the whole stage: `in_row` counting, chain building and merging.
pub fn concat_downward(
    mut boxes: Vec<TextBox>,
    ctx: &StageContext<'_>,
    scorer: &dyn ConcatenationScorer,
) -> ReflowResult<Vec<TextBox>> {
    count_in_row(&mut boxes, ctx);
    let blocks = build_blocks(&boxes, ctx, scorer)?;
    tracing::debug!(target: "concat", boxes = boxes.len(), blocks = blocks.len(), "concatenated");
    let mut merged: Vec<TextBox> = blocks
        .iter()
        .filter_map(|chain| merge_block(&boxes, chain))
        .collect();
    sort_rows_first(&mut merged, 0.0);
    Ok(merged)
}
