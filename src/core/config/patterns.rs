//! Heuristic pattern tables.
//!
//! Every text heuristic in the pipeline (garbage lines, captions, bullets,
//! headings, contents pages, dotted leaders, source lines, page-number
//! artifacts) is driven by a regex table. Tables are described by a
//! serializable [`PatternSpec`], compiled once into [`PatternTables`] and
//! handed to the engine behind an `Arc`.

use super::errors::ConfigError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A heading/bullet pattern together with its outline level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeveledPattern {
    pub pattern: String,
    pub level: u8,
}

impl LeveledPattern {
    fn new(pattern: &str, level: u8) -> Self {
        Self {
            pattern: pattern.to_string(),
            level,
        }
    }
}

/// Serializable description of all heuristic pattern tables.
///
/// Patterns are applied with `is_match`; anchor them with `^` where a prefix
/// match is intended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternSpec {
    /// Lines dropped as noise before layout assignment.
    #[serde(default = "PatternSpec::default_garbage_text")]
    pub garbage_text: Vec<String>,
    /// Caption-shaped lines (figure/table titles).
    #[serde(default = "PatternSpec::default_captions")]
    pub captions: Vec<String>,
    /// Bullet or numbering prefixes used as a concatenation feature.
    #[serde(default = "PatternSpec::default_bullets")]
    pub bullets: Vec<String>,
    /// Heading patterns with outline levels, checked in order.
    #[serde(default = "PatternSpec::default_headings")]
    pub headings: Vec<LeveledPattern>,
    /// Titles announcing a table of contents or acknowledgements.
    #[serde(default = "PatternSpec::default_contents_titles")]
    pub contents_titles: Vec<String>,
    /// Dotted leaders as seen on contents pages.
    #[serde(default = "PatternSpec::default_dotted_leaders")]
    pub dotted_leaders: Vec<String>,
    /// Data-source attribution lines under tables and figures.
    #[serde(default = "PatternSpec::default_source_lines")]
    pub source_lines: Vec<String>,
    /// Page counters such as `12/345` that must never merge.
    #[serde(default = "PatternSpec::default_page_numbers")]
    pub page_numbers: Vec<String>,
    /// Lines consisting only of numeric punctuation (never headings).
    #[serde(default = "PatternSpec::default_numeric_lines")]
    pub numeric_lines: Vec<String>,
    /// A long run of Latin text marking a page as English.
    #[serde(default = "PatternSpec::default_latin_run")]
    pub latin_run: String,
}

impl PatternSpec {
    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    fn default_garbage_text() -> Vec<String> {
        Self::strings(&[
            r"^•+$",
            r"^[0-9]{1,2} / ?[0-9]{1,2}$",
            r"^[0-9]{1,2} of [0-9]{1,2}$",
            r"^http://[^ ]{12,}",
            r"\(cid *: *[0-9]+ *\)",
            r"(?i)^(©|\(c\)|copyright\b)",
            r"(?i)^(https?://|www\.)\S+$",
            r"^[\w.+-]+@[\w-]+(\.[\w-]+)+$",
        ])
    }

    fn default_captions() -> Vec<String> {
        Self::strings(&[
            r"^[图表]+[ 0-9:：]{2,}",
            r"(?i)^(figure|fig\.|table|chart)\s*[0-9]+",
        ])
    }

    fn default_bullets() -> Vec<String> {
        Self::strings(&[
            r"^第[零一二三四五六七八九十百]+章",
            r"^第[零一二三四五六七八九十百]+[条节]",
            r"^[零一二三四五六七八九十百]+[、是 　]",
            r"^[\(（][零一二三四五六七八九十百]+[）\)]",
            r"^[\(（][0-9]+[）\)]",
            r"^[0-9]+(、|\.[　 ]|）|\.[^0-9./a-zA-Z_%><-]{4,})",
            r"^[0-9]+\.[0-9.]+(、|\.[ 　])",
            r"^[⚫•➢①② ]",
        ])
    }

    fn default_headings() -> Vec<LeveledPattern> {
        vec![
            LeveledPattern::new(r"^第[零一二三四五六七八九十百]+章", 1),
            LeveledPattern::new(r"^第[零一二三四五六七八九十百]+[条节]", 2),
            LeveledPattern::new(r"^[零一二三四五六七八九十百]+[、 　]", 3),
            LeveledPattern::new(r"^[\(（][零一二三四五六七八九十百]+[）\)]", 4),
            LeveledPattern::new(r"^[0-9]+(、|\.[　 ]|\.[^0-9])", 5),
            LeveledPattern::new(r"^[0-9]+\.[0-9]+(、|[. 　]|[^0-9])", 6),
            LeveledPattern::new(r"^[0-9]+\.[0-9]+\.[0-9]+(、|[ 　]|[^0-9])", 7),
            LeveledPattern::new(r"^[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+(、|[ 　]|[^0-9])", 8),
            LeveledPattern::new(r"^.{0,48}[：:?？]$", 9),
            LeveledPattern::new(r"^[0-9]+）", 10),
            LeveledPattern::new(r"^[\(（][0-9]+[）\)]", 11),
            LeveledPattern::new(r"^[零一二三四五六七八九十百]+是", 12),
            LeveledPattern::new(r"^[⚫•➢✓]", 12),
        ]
    }

    fn default_contents_titles() -> Vec<String> {
        Self::strings(&[r"^(contents|目录|目次|tableofcontents|致谢|acknowledge|acknowledgements?)$"])
    }

    fn default_dotted_leaders() -> Vec<String> {
        Self::strings(&[r"··", r"\.{4,}", r"…{2,}"])
    }

    fn default_source_lines() -> Vec<String> {
        Self::strings(&[r"^(数据|资料|图表)*来源[:： ]", r"(?i)^(data )?source\s*:"])
    }

    fn default_page_numbers() -> Vec<String> {
        Self::strings(&[r"^[0-9]{2,3}/[0-9]{3}$"])
    }

    fn default_numeric_lines() -> Vec<String> {
        Self::strings(&[r"^[0-9 ().,%+/-]+$"])
    }

    fn default_latin_run() -> String {
        r#"[ a-zA-Z0-9,/¸;:'\[\]\(\)!@#$%^&*"?<>._-]{30,}"#.to_string()
    }

    /// Compiles the spec into matchers.
    pub fn compile(&self) -> Result<PatternTables, ConfigError> {
        PatternTables::compile(self)
    }
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            garbage_text: Self::default_garbage_text(),
            captions: Self::default_captions(),
            bullets: Self::default_bullets(),
            headings: Self::default_headings(),
            contents_titles: Self::default_contents_titles(),
            dotted_leaders: Self::default_dotted_leaders(),
            source_lines: Self::default_source_lines(),
            page_numbers: Self::default_page_numbers(),
            numeric_lines: Self::default_numeric_lines(),
            latin_run: Self::default_latin_run(),
        }
    }
}

/// Compiled pattern tables.
#[derive(Debug, Clone)]
pub struct PatternTables {
    garbage_text: RegexSet,
    captions: RegexSet,
    bullets: RegexSet,
    headings: RegexSet,
    heading_levels: Vec<u8>,
    contents_titles: RegexSet,
    dotted_leaders: RegexSet,
    source_lines: RegexSet,
    page_numbers: RegexSet,
    numeric_lines: RegexSet,
    latin_run: Regex,
}

static DEFAULT_TABLES: Lazy<Arc<PatternTables>> = Lazy::new(|| {
    Arc::new(
        PatternTables::compile(&PatternSpec::default()).expect("Invalid built-in pattern table"),
    )
});

fn build_set(table: &'static str, patterns: &[String]) -> Result<RegexSet, ConfigError> {
    // Compile individually first so the error names the offending pattern.
    for pattern in patterns {
        Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            table,
            pattern: pattern.clone(),
            source,
        })?;
    }
    RegexSet::new(patterns).map_err(|source| ConfigError::InvalidPattern {
        table,
        pattern: patterns.join(" | "),
        source,
    })
}

impl PatternTables {
    /// Compiles every table in `spec`.
    pub fn compile(spec: &PatternSpec) -> Result<Self, ConfigError> {
        let heading_patterns: Vec<String> =
            spec.headings.iter().map(|h| h.pattern.clone()).collect();
        let latin_run = Regex::new(&spec.latin_run).map_err(|source| {
            ConfigError::InvalidPattern {
                table: "latin_run",
                pattern: spec.latin_run.clone(),
                source,
            }
        })?;

        Ok(Self {
            garbage_text: build_set("garbage_text", &spec.garbage_text)?,
            captions: build_set("captions", &spec.captions)?,
            bullets: build_set("bullets", &spec.bullets)?,
            headings: build_set("headings", &heading_patterns)?,
            heading_levels: spec.headings.iter().map(|h| h.level).collect(),
            contents_titles: build_set("contents_titles", &spec.contents_titles)?,
            dotted_leaders: build_set("dotted_leaders", &spec.dotted_leaders)?,
            source_lines: build_set("source_lines", &spec.source_lines)?,
            page_numbers: build_set("page_numbers", &spec.page_numbers)?,
            numeric_lines: build_set("numeric_lines", &spec.numeric_lines)?,
            latin_run,
        })
    }

    /// The process-wide built-in tables.
    pub fn shared_default() -> Arc<PatternTables> {
        Arc::clone(&DEFAULT_TABLES)
    }

    pub fn is_garbage(&self, text: &str) -> bool {
        self.garbage_text.is_match(text)
    }

    pub fn is_caption(&self, text: &str) -> bool {
        self.captions.is_match(text.trim())
    }

    pub fn is_bullet(&self, text: &str) -> bool {
        self.bullets.is_match(text)
    }

    /// Outline level of the first heading pattern matching `line`.
    ///
    /// Lines of two characters or fewer and purely numeric lines are never headings.
    pub fn heading_level(&self, line: &str) -> Option<u8> {
        if line.chars().count() <= 2 || self.numeric_lines.is_match(line) {
            return None;
        }
        self.headings
            .matches(line)
            .iter()
            .next()
            .map(|idx| self.heading_levels[idx])
    }

    /// Whether `text` is a contents/acknowledgement title. Whitespace
    /// (including ideographic spaces) is ignored and matching is case-insensitive.
    pub fn is_contents_title(&self, text: &str) -> bool {
        let squeezed: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        self.contents_titles.is_match(&squeezed)
    }

    pub fn has_dotted_leader(&self, text: &str) -> bool {
        self.dotted_leaders.is_match(text)
    }

    pub fn is_source_line(&self, text: &str) -> bool {
        self.source_lines.is_match(text.trim())
    }

    pub fn is_page_number(&self, text: &str) -> bool {
        self.page_numbers.is_match(text.trim())
    }

    pub fn has_latin_run(&self, text: &str) -> bool {
        self.latin_run.is_match(text)
    }
}

impl Default for PatternTables {
    fn default() -> Self {
        (*Self::shared_default()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_compile() {
        let tables = PatternSpec::default().compile();
        assert!(tables.is_ok());
    }

    #[test]
    fn test_garbage_patterns() {
        let tables = PatternTables::shared_default();
        assert!(tables.is_garbage("3 / 12"));
        assert!(tables.is_garbage("2 of 10"));
        assert!(tables.is_garbage("•••"));
        assert!(tables.is_garbage("(cid:12)"));
        assert!(tables.is_garbage("© 2021 Example Corp. All rights reserved."));
        assert!(tables.is_garbage("https://example.com/report.pdf"));
        assert!(tables.is_garbage("someone@example.org"));
        assert!(!tables.is_garbage("The results are shown below."));
    }

    #[test]
    fn test_heading_levels() {
        let tables = PatternTables::shared_default();
        assert_eq!(tables.heading_level("第一章 总则"), Some(1));
        assert_eq!(tables.heading_level("1.2 Methods and data"), Some(6));
        assert_eq!(tables.heading_level("Summary:"), Some(9));
        assert_eq!(tables.heading_level("12.5%"), None);
        assert_eq!(tables.heading_level("ab"), None);
        assert_eq!(tables.heading_level("plain sentence without marker"), None);
    }

    #[test]
    fn test_contents_title_ignores_spacing_and_case() {
        let tables = PatternTables::shared_default();
        assert!(tables.is_contents_title("Table of Contents"));
        assert!(tables.is_contents_title("目　录"));
        assert!(!tables.is_contents_title("Contents of the box"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let spec = PatternSpec {
            captions: vec!["(unclosed".to_string()],
            ..PatternSpec::default()
        };
        match PatternTables::compile(&spec) {
            Err(ConfigError::InvalidPattern { table, .. }) => assert_eq!(table, "captions"),
            other => panic!("expected invalid pattern, got {:?}", other.map(|_| ())),
        }
    }
}
