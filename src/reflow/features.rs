//! Pairwise features fed to the [`ConcatenationScorer`](crate::core::ConcatenationScorer).

use super::StageContext;
use crate::domain::{LayoutType, TextBox};
use crate::processors::tokenize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ENDS_TERMINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([。？！；!?;+)）]|[a-z]\.)$").expect("Invalid terminal regex"));
static ENDS_CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[，：‘“、0-9（+-]$").expect("Invalid continuation regex"));
static STARTS_PUNCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.?[/,?;:\]，。；：’”？！》】）-]").expect("Invalid leading punctuation regex")
});
static FULLY_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\(（][^\(\)（）]+[）\)]$").expect("Invalid bracket regex"));
static COMMA_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[，,][^。.]+$").expect("Invalid comma tail regex"));
static OPEN_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(（][^\)）]+$").expect("Invalid open bracket regex"));
static CLOSE_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\)）]").expect("Invalid close bracket regex"));
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9.%,-]+$").expect("Invalid numeric regex"));

/// Number of characters examined at each side of the joint.
const JOINT_CHARS: usize = 6;

/// Describes an (upper, lower) box pair.
///
/// The field order is the order of [`ConcatFeatures::to_vector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcatFeatures {
    pub same_row_band: bool,
    /// Vertical centre distance over the taller box height.
    pub y_distance_ratio: f32,
    pub page_delta: f32,
    pub same_layout_type: bool,
    pub up_is_text: bool,
    pub down_is_text: bool,
    pub up_is_table: bool,
    pub down_is_table: bool,
    pub up_ends_sentence: bool,
    pub up_ends_continuation: bool,
    pub down_starts_punctuation: bool,
    pub up_fully_bracketed: bool,
    /// Counted twice in the vector.
    pub up_comma_tail: bool,
    pub bracket_closed_below: bool,
    pub down_is_bullet: bool,
    pub down_starts_uppercase: bool,
    pub up_ends_uppercase: bool,
    pub up_ends_lowercase_or_digit: bool,
    pub down_is_numeric: bool,
    pub same_two_char_suffix: bool,
    pub up_right_of_down: bool,
    pub height_difference_ratio: f32,
    pub x_distance_ratio: f32,
    pub length_delta_ratio: f32,
    /// Tokens created or lost by joining the two sides.
    pub joint_token_delta: f32,
    pub token_count_delta: f32,
    pub same_last_token: bool,
    pub max_in_row: f32,
    pub in_row_delta: f32,
    pub down_single_word: bool,
    pub up_single_word: bool,
}

fn flag(v: bool) -> f32 {
    if v { 1.0 } else { 0.0 }
}

fn head(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn tail(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

fn is_word(token: &str) -> bool {
    token.chars().count() > 1 && token.chars().all(char::is_alphabetic)
}

impl ConcatFeatures {
    /// Number of entries in [`ConcatFeatures::to_vector`].
    pub const LEN: usize = 32;

    /// Computes the features for `up` followed by `down`.
    pub fn between(up: &TextBox, down: &TextBox, ctx: &StageContext<'_>) -> Self {
        let up_text = up.text.trim();
        let down_text = down.text.trim();
        let (up_h, down_h) = (up.rect.height(), down.rect.height());
        let h = up_h.max(down_h).max(f32::EPSILON);
        let w = up
            .char_width()
            .unwrap_or(0.0)
            .max(down.char_width().unwrap_or(0.0))
            .max(1e-6);

        let up_tail = tail(up_text, JOINT_CHARS);
        let down_head = head(down_text, JOINT_CHARS);
        let tks_up = tokenize(&up_tail);
        let tks_down = tokenize(&down_head);
        let joint = crate::processors::join_fragments(&up_tail, &down_head);
        let tks_all = tokenize(&joint);

        let up_last = up_text.chars().last();
        let up_len = up_text.chars().count();
        let down_len = down_text.chars().count();
        let up_kind = up.layout_kind();
        let down_kind = down.layout_kind();

        Self {
            same_row_band: up.table.row_index() == down.table.row_index(),
            y_distance_ratio: up.rect.y_distance(&down.rect) / h,
            page_delta: down.page as f32 - up.page as f32,
            same_layout_type: up_kind == down_kind,
            up_is_text: up_kind == Some(LayoutType::Text),
            down_is_text: down_kind == Some(LayoutType::Text),
            up_is_table: up_kind == Some(LayoutType::Table),
            down_is_table: down_kind == Some(LayoutType::Table),
            up_ends_sentence: ENDS_TERMINAL.is_match(up_text),
            up_ends_continuation: ENDS_CONTINUATION.is_match(up_text),
            down_starts_punctuation: STARTS_PUNCT.is_match(down_text),
            up_fully_bracketed: FULLY_BRACKETED.is_match(up_text),
            up_comma_tail: COMMA_TAIL.is_match(up_text),
            bracket_closed_below: OPEN_BRACKET.is_match(up_text)
                && CLOSE_BRACKET.is_match(down_text),
            down_is_bullet: ctx.patterns.is_bullet(down_text),
            down_starts_uppercase: down_text.chars().next().is_some_and(|c| c.is_ascii_uppercase()),
            up_ends_uppercase: up_last.is_some_and(|c| c.is_ascii_uppercase()),
            up_ends_lowercase_or_digit: up_last
                .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
            down_is_numeric: NUMERIC.is_match(down_text),
            same_two_char_suffix: up_len > 1 && down_len > 1 && tail(up_text, 2) == tail(down_text, 2),
            up_right_of_down: up.rect.x0 > down.rect.x1,
            height_difference_ratio: (up_h - down_h).abs() / up_h.min(down_h).max(f32::EPSILON),
            x_distance_ratio: up.rect.x_distance(&down.rect) / w,
            length_delta_ratio: (up_len as f32 - down_len as f32)
                / up_len.max(down_len).max(1) as f32,
            joint_token_delta: tks_all.len() as f32 - tks_up.len() as f32 - tks_down.len() as f32,
            token_count_delta: tks_down.len() as f32 - tks_up.len() as f32,
            same_last_token: matches!((tks_down.last(), tks_up.last()), (Some(a), Some(b)) if a == b),
            max_in_row: up.in_row.max(down.in_row) as f32,
            in_row_delta: (up.in_row as f32 - down.in_row as f32).abs(),
            down_single_word: tks_down.len() == 1 && is_word(&tks_down[0]),
            up_single_word: tks_up.len() == 1 && is_word(&tks_up[0]),
        }
    }

    /// Flattens the features in declaration order.
    pub fn to_vector(&self) -> [f32; Self::LEN] {
        [
            flag(self.same_row_band),
            self.y_distance_ratio,
            self.page_delta,
            flag(self.same_layout_type),
            flag(self.up_is_text),
            flag(self.down_is_text),
            flag(self.up_is_table),
            flag(self.down_is_table),
            flag(self.up_ends_sentence),
            flag(self.up_ends_continuation),
            flag(self.down_starts_punctuation),
            flag(self.up_fully_bracketed),
            flag(self.up_comma_tail),
            flag(self.up_comma_tail),
            flag(self.bracket_closed_below),
            flag(self.down_is_bullet),
            flag(self.down_starts_uppercase),
            flag(self.up_ends_uppercase),
            flag(self.up_ends_lowercase_or_digit),
            flag(self.down_is_numeric),
            flag(self.same_two_char_suffix),
            flag(self.up_right_of_down),
            self.height_difference_ratio,
            self.x_distance_ratio,
            self.length_delta_ratio,
            self.joint_token_delta,
            self.token_count_delta,
            flag(self.same_last_token),
            self.max_in_row,
            self.in_row_delta,
            flag(self.down_single_word),
            flag(self.up_single_word),
        ]
    }
}
