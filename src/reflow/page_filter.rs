//! Removes table-of-contents material from the front of the document.
//!
//! Three passes, in order:
//!
//! 1. A contents or acknowledgements title removes itself and every entry
//!    listed under it, up to the point where the body repeats the first entry.
//! 2. If no such title exists, the first pages (a fifth of the document, at
//!    most seven) are scanned for contents-like lines. On every page with at
//!    least three hits, the span from the first to the last hit is removed.
//! 3. Pages with more than three dotted-leader lines are dropped whole.

use super::StageContext;
use crate::domain::{LayoutType, TextBox};
use std::collections::{BTreeMap, HashSet};

/// Entries after a contents title searched for the repeated first entry.
const CONTENTS_LOOKAHEAD: usize = 128;
/// Leading pages scanned by the frequency pass is `pages / FRONT_MATTER_DIVISOR`, capped.
const FRONT_MATTER_DIVISOR: usize = 5;
const FRONT_MATTER_MAX_PAGES: usize = 7;
/// Contents-like lines needed on one page before it is trimmed.
const MIN_PAGE_HITS: usize = 3;
/// Dotted-leader lines a page may carry before it is dropped.
const MAX_DOTTED_LINES: usize = 3;
/// Lines wider than this ending in a page number look like contents entries.
const WIDE_ENTRY_WIDTH: f32 = 250.0;

/// Runs all passes.
pub fn filter_front_matter(mut boxes: Vec<TextBox>, ctx: &StageContext<'_>) -> Vec<TextBox> {
    if boxes.is_empty() {
        return boxes;
    }
    let before = boxes.len();
    if !remove_contents_sections(&mut boxes, ctx) {
        remove_contents_entries(&mut boxes, ctx);
        remove_dotted_pages(&mut boxes, ctx);
    }
    tracing::debug!(
        target: "page_filter",
        removed = before - boxes.len(),
        remaining = boxes.len(),
        "front matter filtered"
    );
    boxes
}

/// Opening words of a line used to find where the body repeats it.
fn entry_prefix(text: &str, english: bool) -> String {
    let text = text.trim();
    if english {
        text.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
    } else {
        text.chars().take(3).collect()
    }
}

fn is_latin_title(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() >= 5
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " :'.-".contains(c))
}

/// Pass 1. Returns whether any contents title was found.
fn remove_contents_sections(boxes: &mut Vec<TextBox>, ctx: &StageContext<'_>) -> bool {
    let mut found = false;
    let mut i = 0;
    while i < boxes.len() {
        if !ctx.patterns.is_contents_title(&boxes[i].text) {
            i += 1;
            continue;
        }
        found = true;
        let english = is_latin_title(&boxes[i].text);
        let title = boxes.remove(i);
        tracing::debug!(target: "page_filter", page = title.page, title = %title.text, "contents title");

        while i < boxes.len() && boxes[i].text.trim().is_empty() {
            boxes.remove(i);
        }
        if i >= boxes.len() {
            break;
        }
        let prefix = entry_prefix(&boxes[i].text, english);
        boxes.remove(i);
        if prefix.is_empty() {
            break;
        }
        let end = boxes.len().min(i + CONTENTS_LOOKAHEAD);
        if let Some(j) = (i..end).find(|&j| boxes[j].text.trim_start().starts_with(&prefix)) {
            boxes.drain(i..j);
        }
    }
    found
}

fn ends_with_digit(text: &str) -> bool {
    text.trim().chars().last().is_some_and(|c| c.is_ascii_digit())
}

/// A line that reads like a contents entry.
fn looks_like_entry(b: &TextBox, ctx: &StageContext<'_>) -> bool {
    if b.is_layout(LayoutType::Reference) {
        return true;
    }
    if b.rect.height() >= 2.0 * ctx.pages.mean_height(b.page) {
        return false;
    }
    if b.text.contains("....") || (b.rect.width() > WIDE_ENTRY_WIDTH && ends_with_digit(&b.text)) {
        return true;
    }
    let caption = ctx.patterns.is_caption(&b.text) || b.layout_kind().is_some_and(|k| k.is_caption());
    caption && ends_with_digit(&b.text)
}

/// Pass 2.
fn remove_contents_entries(boxes: &mut Vec<TextBox>, ctx: &StageContext<'_>) {
    let front = FRONT_MATTER_MAX_PAGES.min(ctx.pages.len() / FRONT_MATTER_DIVISOR);
    if front == 0 {
        return;
    }
    let mut hits = vec![0usize; front + 1];
    for b in boxes.iter().filter(|b| b.page <= front) {
        if looks_like_entry(b, ctx) {
            hits[b.page] += 1;
        }
    }

    // page -> (first, last) index of its marked lines
    let mut spans: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (i, b) in boxes.iter().enumerate() {
        if b.page <= front && hits[b.page] >= MIN_PAGE_HITS && looks_like_entry(b, ctx) {
            spans
                .entry(b.page)
                .and_modify(|(_, last)| *last = i)
                .or_insert((i, i));
        }
    }
    // Later spans first so earlier indices stay valid.
    for (page, (first, last)) in spans.into_iter().rev() {
        tracing::debug!(target: "page_filter", page, first, last, "removing contents entries");
        boxes.drain(first..=last);
    }
}

/// Pass 3.
fn remove_dotted_pages(boxes: &mut Vec<TextBox>, ctx: &StageContext<'_>) {
    let mut counts = vec![0usize; ctx.pages.len() + 1];
    for b in boxes.iter() {
        if ctx.patterns.has_dotted_leader(&b.text)
            && let Some(count) = counts.get_mut(b.page)
        {
            *count += 1;
        }
    }
    let dirty: HashSet<usize> = counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > MAX_DOTTED_LINES)
        .map(|(page, _)| page)
        .collect();
    if dirty.is_empty() {
        return;
    }
    tracing::debug!(target: "page_filter", pages = ?dirty, "dropping dotted-leader pages");
    boxes.retain(|b| !dirty.contains(&b.page));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::Rect;
    use crate::reflow::testing::{PAGE_HEIGHT, TestDocument};

    fn line(page: usize, row: usize, width: f32, text: &str) -> TextBox {
        let top = (page - 1) as f32 * PAGE_HEIGHT + 50.0 + row as f32 * 20.0;
        TextBox::new(page, Rect::new(50.0, 50.0 + width, top, top + 10.0), text)
    }

    fn texts(boxes: &[TextBox]) -> Vec<&str> {
        boxes.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn test_contents_section_removed_up_to_body() {
        let doc = TestDocument::pages(2);
        let boxes = vec![
            line(1, 0, 100.0, "Annual Report"),
            line(1, 1, 100.0, "Table of Contents"),
            line(1, 2, 300.0, "Introduction to scope 3"),
            line(1, 3, 300.0, "Methods 5"),
            line(1, 4, 300.0, "Results 9"),
            line(2, 0, 100.0, "Introduction to scope"),
            line(2, 1, 300.0, "This report covers the year."),
        ];
        let kept = filter_front_matter(boxes, &doc.context());
        assert_eq!(
            texts(&kept),
            vec!["Annual Report", "Introduction to scope", "This report covers the year."]
        );
    }

    #[test]
    fn test_cjk_contents_prefix() {
        let doc = TestDocument::pages(2);
        let boxes = vec![
            line(1, 0, 100.0, "目 录"),
            line(1, 1, 300.0, "第一章 总则 1"),
            line(1, 2, 300.0, "第二章 范围 4"),
            line(2, 0, 100.0, "第一章 总则"),
            line(2, 1, 300.0, "本办法适用于全部业务。"),
        ];
        let kept = filter_front_matter(boxes, &doc.context());
        assert_eq!(texts(&kept), vec!["第一章 总则", "本办法适用于全部业务。"]);
    }

    #[test]
    fn test_frequency_pass_trims_front_pages_only() {
        let doc = TestDocument::pages(10);
        let boxes = vec![
            line(1, 0, 100.0, "Guide"),
            line(1, 1, 300.0, "Overview ........ 2"),
            line(1, 2, 300.0, "Setup ........ 4"),
            line(1, 3, 300.0, "Usage ........ 7"),
            line(1, 4, 100.0, "Preface"),
            line(3, 0, 300.0, "Usage details ........ 9"),
            line(3, 1, 300.0, "Body text on page three"),
        ];
        let kept = filter_front_matter(boxes, &doc.context());
        assert_eq!(
            texts(&kept),
            vec![
                "Guide",
                "Preface",
                "Usage details ........ 9",
                "Body text on page three"
            ]
        );
    }

    #[test]
    fn test_frequency_pass_keeps_body_between_pages() {
        let doc = TestDocument::pages(10);
        let boxes = vec![
            line(1, 0, 300.0, "Overview ........ 2"),
            line(1, 1, 300.0, "Setup ........ 4"),
            line(1, 2, 300.0, "Usage ........ 7"),
            line(1, 3, 100.0, "Preface"),
            line(2, 0, 300.0, "Body on page two"),
            line(2, 1, 300.0, "Limits ........ 11"),
            line(2, 2, 300.0, "Errors ........ 13"),
            line(2, 3, 300.0, "Index ........ 17"),
        ];
        let kept = filter_front_matter(boxes, &doc.context());
        assert_eq!(texts(&kept), vec!["Preface", "Body on page two"]);
    }

    #[test]
    fn test_short_documents_skip_frequency_pass() {
        let doc = TestDocument::pages(2);
        let boxes = vec![
            line(1, 0, 300.0, "Figure 1 overview 2"),
            line(1, 1, 300.0, "Figure 2 setup 4"),
            line(1, 2, 300.0, "Figure 3 usage 7"),
        ];
        let kept = filter_front_matter(boxes.clone(), &doc.context());
        assert_eq!(kept, boxes);
    }

    #[test]
    fn test_dotted_pages_dropped() {
        let doc = TestDocument::pages(2);
        let mut boxes: Vec<TextBox> = (0..4)
            .map(|i| line(1, i, 300.0, &format!("Chapter {i} ···· {}", i * 3)))
            .collect();
        boxes.push(line(1, 4, 300.0, "also on the dirty page"));
        boxes.push(line(2, 0, 300.0, "Chapter 0 ···· 0"));
        boxes.push(line(2, 1, 300.0, "clean body"));
        let kept = filter_front_matter(boxes, &doc.context());
        assert_eq!(texts(&kept), vec!["Chapter 0 ···· 0", "clean body"]);
    }
}
