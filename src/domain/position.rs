//! Inline position tags.
//!
//! Every emitted line carries a tag of the form
//! `@@<pages>\t<x0>\t<x1>\t<top>\t<bottom>##`, where `<pages>` is a `-`-joined
//! list of 1-based page numbers and the coordinates are page units with one
//! decimal. `top` is relative to the first listed page and `bottom` to the last.

use super::page::DocumentPages;
use super::text_box::TextBox;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static TAG_STRIP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@[\t0-9.-]+?##").expect("Invalid position tag regex"));

static TAG_EXTRACT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@@([0-9-]+)\t([0-9.\t-]+)##").expect("Invalid position extract regex")
});

#[derive(Debug, Error, PartialEq)]
pub enum PositionTagError {
    #[error("missing @@/## delimiters")]
    Delimiters,
    #[error("expected 5 tab-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid page list '{0}'")]
    Pages(String),
    #[error("invalid coordinate '{0}'")]
    Coordinate(String),
}

fn round_tenth(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// A parsed position tag. Coordinates are held at one-decimal precision so
/// that formatting and parsing round-trip exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTag {
    pub pages: Vec<usize>,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
}

impl PositionTag {
    pub fn new(pages: Vec<usize>, x0: f32, x1: f32, top: f32, bottom: f32) -> Self {
        Self {
            pages,
            x0: round_tenth(x0),
            x1: round_tenth(x1),
            top: round_tenth(top),
            bottom: round_tenth(bottom),
        }
    }

    /// Tags a box, walking the bottom edge forward across page boundaries.
    pub fn for_box(b: &TextBox, pages: &DocumentPages) -> Self {
        let offset = pages.offset(b.page);
        let top = b.rect.top - offset;
        let mut bottom = b.rect.bottom - offset;
        let mut spanned = vec![b.page];
        let mut last = b.page;
        while last < pages.len() && pages.height(last) > 0.0 && bottom > pages.height(last) {
            bottom -= pages.height(last);
            last += 1;
            spanned.push(last);
        }
        Self::new(spanned, b.rect.x0, b.rect.x1, top, bottom)
    }

    /// Splits the tag into one absolute-page rectangle per spanned page.
    pub fn page_positions(&self, pages: &DocumentPages) -> Vec<PagePosition> {
        let n = self.pages.len();
        self.pages
            .iter()
            .enumerate()
            .map(|(i, &page)| {
                let top = if i == 0 { self.top } else { 0.0 };
                let bottom = if i + 1 == n {
                    self.bottom
                } else {
                    pages.height(page)
                };
                PagePosition {
                    page: page + pages.page_from,
                    x0: self.x0,
                    x1: self.x1,
                    top,
                    bottom,
                }
            })
            .collect()
    }
}

impl fmt::Display for PositionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pages = self
            .pages
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join("-");
        write!(
            f,
            "@@{}\t{:.1}\t{:.1}\t{:.1}\t{:.1}##",
            pages, self.x0, self.x1, self.top, self.bottom
        )
    }
}

impl FromStr for PositionTag {
    type Err = PositionTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix("@@")
            .and_then(|r| r.strip_suffix("##"))
            .ok_or(PositionTagError::Delimiters)?;
        let fields: Vec<&str> = inner.split('\t').collect();
        if fields.len() != 5 {
            return Err(PositionTagError::FieldCount(fields.len()));
        }
        let pages = fields[0]
            .split('-')
            .map(|p| p.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PositionTagError::Pages(fields[0].to_string()))?;
        if pages.is_empty() {
            return Err(PositionTagError::Pages(fields[0].to_string()));
        }
        let mut coords = [0.0f32; 4];
        for (slot, raw) in coords.iter_mut().zip(&fields[1..]) {
            *slot = raw
                .parse::<f32>()
                .map_err(|_| PositionTagError::Coordinate(raw.to_string()))?;
        }
        Ok(Self::new(pages, coords[0], coords[1], coords[2], coords[3]))
    }
}

/// A rectangle on one page. `page` is 1-based within the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePosition {
    pub page: usize,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Strips every position tag from `text`.
pub fn remove_tags(text: &str) -> String {
    TAG_STRIP_REGEX.replace_all(text, "").into_owned()
}

/// Parses every well-formed position tag embedded in `text`, in order.
pub fn extract_positions(text: &str) -> Vec<PositionTag> {
    TAG_EXTRACT_REGEX
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}
