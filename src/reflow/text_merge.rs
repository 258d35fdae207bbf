//! Same-line and same-bullet merging.
//!
//! # Stage definition
//!
//! - Input: row-sorted, layout-tagged [`TextBox`]es
//! - Output: fewer boxes; fragments of one visual line inside one layout region
//!   and one text column are joined left to right
//! - Tables, figures and equations are never merged here
//!
//! Text columns are found per page from the left edges of line-leading
//! boxes. A box continuing a line, one character width or less after a
//! neighbour on the same row, does not vote. Every box then joins the
//! rightmost column starting at or before it.

use super::StageContext;
use crate::domain::{LayoutType, TextBox};
use crate::processors::{column_of, column_starts, is_cjk, join_fragments, sort_rows_first};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

/// Left fragments ending with one of these may slightly overlap their successor.
const COMMA_CLASS: &[char] = &['，', ',', ';', '、'];
/// Right fragments starting with one of these may slightly overlap their predecessor.
const OPENING_CLASS: &[char] = &['(', '（', ',', '，'];
/// Fragments whose centres differ by a line height over this divisor are on different lines.
const SAME_LINE_DIVISOR: f32 = 5.0;
/// Overlap tolerated for ordinary fragments.
const DEFAULT_MIN_GAP: f32 = -1.0;
/// Overlap tolerated when a comma or opening bracket sits at the joint.
const RELAXED_MIN_GAP: f32 = -8.0;

static ORPHAN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9  •一—-]+$").expect("Invalid orphan marker regex"));

fn mergeable_kind(b: &TextBox) -> bool {
    !b.layout_kind().is_some_and(|k| k.is_visual())
}

/// Whether `b` continues a line started by another box of its page.
fn continues_line(b: &TextBox, page: &[&TextBox], ctx: &StageContext<'_>) -> bool {
    let mh = ctx.pages.mean_height(b.page);
    let mw = ctx.pages.mean_width(b.page);
    page.iter().any(|o| {
        let gap = b.rect.x0 - o.rect.x1;
        o.rect.x0 < b.rect.x0
            && (RELAXED_MIN_GAP..=mw).contains(&gap)
            && o.rect.y_distance(&b.rect).abs() < mh / 2.0
    })
}

/// Sets [`TextBox::page_column`] on every box.
pub fn assign_columns(boxes: &mut [TextBox], ctx: &StageContext<'_>) {
    let by_page = (0..boxes.len()).into_group_map_by(|&i| boxes[i].page);
    let mut counts: Vec<usize> = Vec::with_capacity(by_page.len());
    for (page, members) in by_page.into_iter().sorted_by_key(|(page, _)| *page) {
        let refs: Vec<&TextBox> = members.iter().map(|&i| &boxes[i]).collect();
        let starts: Vec<f32> = refs
            .iter()
            .filter(|b| !continues_line(b, &refs, ctx))
            .map(|b| b.rect.x0)
            .collect();
        let left = refs.iter().map(|b| b.rect.x0).fold(f32::INFINITY, f32::min);
        let right = refs.iter().map(|b| b.rect.x1).fold(f32::NEG_INFINITY, f32::max);
        let edges = column_starts(&starts, right - left);
        let slack = ctx.pages.mean_width(page);
        for i in members {
            boxes[i].page_column = column_of(boxes[i].rect.x0, &edges, slack);
        }
        tracing::debug!(target: "merge", page, columns = edges.len().max(1), "text columns assigned");
        counts.push(edges.len().max(1));
    }
    let prevailing = counts
        .into_iter()
        .counts()
        .into_iter()
        .max_by_key(|&(columns, pages)| (pages, std::cmp::Reverse(columns)))
        .map(|(columns, _)| columns);
    if let Some(columns) = prevailing {
        tracing::debug!(target: "merge", columns, "prevailing column count");
    }
}

fn horizontally_adjacent(left: &TextBox, right: &TextBox, ctx: &StageContext<'_>) -> bool {
    if left.page != right.page || left.layout_id().is_none() || left.layout_id() != right.layout_id() {
        return false;
    }
    if left.page_column != right.page_column {
        return false;
    }
    if !mergeable_kind(left) || !mergeable_kind(right) {
        return false;
    }
    let mh = ctx.pages.mean_height(left.page);
    if left.rect.y_distance(&right.rect).abs() >= mh / SAME_LINE_DIVISOR || left.rect.x1 >= right.rect.x1 {
        return false;
    }
    let relaxed = left.text.trim_end().ends_with(COMMA_CLASS)
        || right.text.trim_start().starts_with(OPENING_CLASS);
    let min_gap = if relaxed { RELAXED_MIN_GAP } else { DEFAULT_MIN_GAP };
    let gap = right.rect.x0 - left.rect.x1;
    gap >= min_gap && gap <= mh
}

/// Joins neighbouring fragments of one line within one layout region and
/// one text column.
pub fn merge_horizontal(mut boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Vec<TextBox> {
    assign_columns(&mut boxes, ctx);
    let before = boxes.len();
    let mut merged: Vec<TextBox> = Vec::with_capacity(boxes.len());
    for b in boxes.drain(..) {
        if let Some(last) = merged.last_mut()
            && horizontally_adjacent(last, &b, ctx)
        {
            last.text = join_fragments(&last.text, &b.text);
            last.rect.x1 = b.rect.x1;
            last.rect.top = (last.rect.top + b.rect.top) / 2.0;
            last.rect.bottom = (last.rect.bottom + b.rect.bottom) / 2.0;
            continue;
        }
        merged.push(b);
    }
    tracing::debug!(target: "merge", before, after = merged.len(), "horizontal merge");
    merged
}

fn bullet_glyph(text: &str) -> Option<char> {
    let c = text.trim().chars().next()?;
    (!c.is_alphabetic() && !is_cjk(c)).then_some(c)
}

/// Folds consecutive lines that open with the same non-letter bullet glyph
/// into one box, separated by newlines. Empty boxes are dropped.
pub fn merge_same_bullet(boxes: Vec<TextBox>) -> Vec<TextBox> {
    let mut out: Vec<TextBox> = Vec::with_capacity(boxes.len());
    for b in boxes.into_iter().filter(|b| !b.text.trim().is_empty()) {
        if let Some(last) = out.last_mut()
            && let Some(glyph) = bullet_glyph(&last.text)
            && bullet_glyph(&b.text) == Some(glyph)
            && last.rect.top <= b.rect.bottom
        {
            last.text = format!("{}\n{}", last.text, b.text);
            last.rect.x0 = last.rect.x0.min(b.rect.x0);
            last.rect.x1 = last.rect.x1.max(b.rect.x1);
            last.rect.bottom = last.rect.bottom.max(b.rect.bottom);
            continue;
        }
        out.push(b);
    }
    out
}

/// Geometric line-to-paragraph merge without the scorer.
///
/// Used for structured box output, where callers want paragraphs but no
/// classifier round trips.
pub fn naive_vertical_merge(boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Vec<TextBox> {
    let mut boxes = boxes;
    let heights: Vec<f32> = ctx.pages.iter().map(|p| p.mean_height).collect();
    sort_rows_first(&mut boxes, crate::processors::median(&heights) / 3.0);

    let mut out: Vec<TextBox> = Vec::with_capacity(boxes.len());
    let mut iter = boxes.into_iter().peekable();
    while let Some(mut b) = iter.next() {
        loop {
            let Some(next) = iter.peek() else { break };
            if b.page < next.page && ORPHAN_MARKER.is_match(&b.text) {
                // Page furniture left at the foot of a page
                b = match iter.next() {
                    Some(n) => n,
                    None => break,
                };
                continue;
            }
            if b.text.trim().is_empty() {
                b = match iter.next() {
                    Some(n) => n,
                    None => break,
                };
                continue;
            }
            if !continues_below(&b, next, ctx) {
                break;
            }
            let Some(next) = iter.next() else { break };
            b.rect.bottom = next.rect.bottom;
            b.rect.x0 = b.rect.x0.min(next.rect.x0);
            b.rect.x1 = b.rect.x1.max(next.rect.x1);
            b.text = join_fragments(&b.text, &next.text);
        }
        if !b.text.trim().is_empty() || b.is_layout(LayoutType::Figure) {
            out.push(b);
        }
    }
    out
}

fn continues_below(up: &TextBox, down: &TextBox, ctx: &StageContext<'_>) -> bool {
    let up_text = up.text.trim();
    let down_text = down.text.trim();
    let up_chars: Vec<char> = up_text.chars().collect();
    let Some(&last) = up_chars.last() else {
        return false;
    };

    let concatting = [
        ",;:'\"，、‘“；：-".contains(last),
        up_chars.len() > 1 && ",;:'\"，‘“、；：".contains(up_chars[up_chars.len() - 2]),
        down_text
            .chars()
            .next()
            .is_some_and(|c| "。；？！?”）),，、：".contains(c)),
    ];
    let mh = ctx.pages.mean_height(up.page);
    let mw = ctx.pages.mean_width(up.page);
    let separating = [
        up.layout_id() != down.layout_id(),
        "。？！?".contains(last),
        ctx.is_english && ".!?".contains(last),
        up.page == down.page && down.rect.top - up.rect.bottom > mh * 1.5,
        up.page < down.page && (up.rect.x0 - down.rect.x0).abs() > mw * 4.0,
    ];
    let detached = up.rect.x1 < down.rect.x0 || up.rect.x0 > down.rect.x1;

    let blocked = separating.iter().any(|&f| f) && !concatting.iter().any(|&f| f);
    !(blocked || detached)
}
