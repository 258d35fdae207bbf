//! Lexical helpers used by the merge and table stages.

use crate::core::config::PatternTables;
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that end a sentence.
pub const TERMINAL_PUNCTUATION: &[char] = &['。', '？', '！', '?', '!', '.', '；', ';', '…'];

/// Characters after which a line is expected to continue.
pub const COMMA_LIKE: &[char] = &['，', ',', ';', '、', '：', ':'];

/// Punctuation that never starts a fresh paragraph.
pub const LEADING_PUNCTUATION: &[char] = &[
    '，', ',', '。', '.', '、', '；', ';', '：', ':', '）', ')', '】', ']', '」', '”', '’',
];

pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Joins two fragments, inserting a single space only between ASCII
/// alphanumerics.
pub fn join_fragments(left: &str, right: &str) -> String {
    let needs_space = matches!(
        (left.chars().last(), right.chars().next()),
        (Some(a), Some(b)) if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric()
    );
    if needs_space {
        format!("{left} {right}")
    } else {
        format!("{left}{right}")
    }
}

/// Splits text into lowercase Latin words, digit runs and single CJK
/// characters. Punctuation and whitespace are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() || c == '\'' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Content class of a table cell, used to spot header rows in numeric tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Dates and periods.
    Dt,
    /// Numbers.
    Nu,
    /// Codes and identifiers.
    Ca,
    /// Short English phrases.
    En,
    /// Numbers with units.
    NE,
    /// A single character.
    Sg,
    /// Short text.
    Tx,
    /// Long text.
    Lx,
    /// Anything else.
    Ot,
}

static BLOCK_TYPE_PATTERNS: Lazy<Vec<(Regex, BlockType)>> = Lazy::new(|| {
    [
        (r"^(20|19)[0-9]{2}[年/-][0-9]{1,2}[月/-][0-9]{1,2}日*$", BlockType::Dt),
        (r"^(20|19)[0-9]{2}年$", BlockType::Dt),
        (r"^(20|19)[0-9]{2}[年-][0-9]{1,2}月*$", BlockType::Dt),
        (r"^[0-9]{1,2}[月-][0-9]{1,2}日*$", BlockType::Dt),
        (r"^第*[一二三四1-4]季度$", BlockType::Dt),
        (r"^(20|19)[0-9]{2}年*[一二三四1-4]季度$", BlockType::Dt),
        (r"^(20|19)[0-9]{2}[ABCDE]$", BlockType::Dt),
        (r"^[0-9.,+%/ -]+$", BlockType::Nu),
        (r"^[0-9A-Z/\._~-]+$", BlockType::Ca),
        (r"^[A-Z]*[a-z' -]+$", BlockType::En),
        (r"^[0-9.,+-]+[0-9A-Za-z/$￥%<>（）()' -]+$", BlockType::NE),
        (r"^.$", BlockType::Sg),
    ]
    .into_iter()
    .map(|(p, t)| (Regex::new(p).expect("Invalid block type regex"), t))
    .collect()
});

/// Classifies a cell's text.
pub fn block_type(text: &str) -> BlockType {
    let text = text.trim();
    if let Some((_, kind)) = BLOCK_TYPE_PATTERNS.iter().find(|(re, _)| re.is_match(text)) {
        return *kind;
    }
    let words = tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .count();
    match words {
        0..=3 => BlockType::Ot,
        4..=11 => BlockType::Tx,
        _ => BlockType::Lx,
    }
}

/// Whether a document is predominantly English, judged per page on up to
/// 200 sampled lines and decided by majority.
pub fn detect_english<'a, I, P>(pages: I, patterns: &PatternTables) -> bool
where
    I: IntoIterator<Item = P>,
    P: IntoIterator<Item = &'a str>,
{
    let mut english = 0usize;
    let mut total = 0usize;
    for page in pages {
        total += 1;
        let sample: String = page.into_iter().take(200).collect::<Vec<_>>().join("");
        if patterns.has_latin_run(&sample) {
            english += 1;
        }
    }
    total > 0 && english * 2 > total
}
