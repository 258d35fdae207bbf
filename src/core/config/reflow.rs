//! Engine configuration.

use super::errors::{ConfigError, ConfigValidator, ensure_positive, ensure_range};
use super::parallel::ParallelPolicy;
use serde::{Deserialize, Serialize};

/// How reconstructed tables are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutput {
    /// A literal `<table>` with `colspan`/`rowspan` attributes.
    #[default]
    Html,
    /// One "header: value; ..." sentence per data row.
    Verbalized,
}

/// Tunables for the reflow engine.
///
/// Distances are expressed in page units (rendered pixels divided by `zoom`)
/// unless a field says it is a multiple of the page's mean line height.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReflowConfig {
    /// Rasterization zoom factor (72 dpi * zoom).
    #[serde(default = "ReflowConfig::default_zoom")]
    pub zoom: f32,
    /// First page to process (0-based, inclusive).
    #[serde(default)]
    pub page_from: usize,
    /// Last page to process (0-based, exclusive).
    #[serde(default = "ReflowConfig::default_page_to")]
    pub page_to: usize,
    /// Header/footer/reference detections below this score are discarded.
    #[serde(default = "ReflowConfig::default_layout_min_score")]
    pub layout_min_score: f32,
    /// Minimum box-over-region overlap to assign a layout.
    #[serde(default = "ReflowConfig::default_layout_overlap_threshold")]
    pub layout_overlap_threshold: f32,
    /// Lookahead window when deduplicating layout detections.
    #[serde(default = "ReflowConfig::default_layout_cleanup_window")]
    pub layout_cleanup_window: usize,
    /// Coverage ratio above which two same-type detections conflict.
    #[serde(default = "ReflowConfig::default_layout_cleanup_threshold")]
    pub layout_cleanup_threshold: f32,
    /// Margin around table regions when cropping for structure detection.
    #[serde(default = "ReflowConfig::default_table_crop_margin")]
    pub table_crop_margin: f32,
    /// Try all four quarter turns of each table crop and keep the one the
    /// recognizer reads best.
    #[serde(default = "ReflowConfig::default_true")]
    pub table_auto_rotate: bool,
    /// Minimum box-over-band overlap for row/header/span/column tagging.
    #[serde(default = "ReflowConfig::default_table_band_threshold")]
    pub table_band_threshold: f32,
    /// Forward candidates examined per downward-concatenation step.
    #[serde(default = "ReflowConfig::default_concat_window")]
    pub concat_window: usize,
    /// Classifier score above which a concatenation is accepted.
    #[serde(default = "ReflowConfig::default_concat_accept_score")]
    pub concat_accept_score: f32,
    /// Whether paragraphs may continue across page boundaries.
    #[serde(default = "ReflowConfig::default_true")]
    pub concat_between_pages: bool,
    /// Forward candidates examined when grouping scraps into lines.
    #[serde(default = "ReflowConfig::default_scrap_window")]
    pub scrap_window: usize,
    /// Groups narrower than this fraction of page width are scraps.
    #[serde(default = "ReflowConfig::default_scrap_min_width_ratio")]
    pub scrap_min_width_ratio: f32,
    /// Groups at least this wide (page units) always survive.
    #[serde(default = "ReflowConfig::default_scrap_min_width")]
    pub scrap_min_width: f32,
    /// Max gap, in mean line heights, between halves of a cross-page table.
    #[serde(default = "ReflowConfig::default_cross_page_table_gap")]
    pub cross_page_table_gap: f32,
    /// Captions further than this from every table/figure stay in the text.
    #[serde(default = "ReflowConfig::default_caption_max_distance")]
    pub caption_max_distance: f32,
    /// Table rendering mode.
    #[serde(default)]
    pub table_output: TableOutput,
    /// Whether figure regions are extracted with their crops.
    #[serde(default = "ReflowConfig::default_true")]
    pub need_image: bool,
    /// Fold consecutive lines sharing a bullet glyph into one box.
    #[serde(default)]
    pub merge_same_bullet: bool,
    /// Document-level parallelism.
    #[serde(default)]
    pub parallel: ParallelPolicy,
}

impl ReflowConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from a JSON document, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::invalid(format!("malformed config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_page_range(mut self, page_from: usize, page_to: usize) -> Self {
        self.page_from = page_from;
        self.page_to = page_to;
        self
    }

    pub fn with_table_output(mut self, table_output: TableOutput) -> Self {
        self.table_output = table_output;
        self
    }

    pub fn with_table_auto_rotate(mut self, enabled: bool) -> Self {
        self.table_auto_rotate = enabled;
        self
    }

    pub fn with_concat_between_pages(mut self, enabled: bool) -> Self {
        self.concat_between_pages = enabled;
        self
    }

    pub fn with_need_image(mut self, need_image: bool) -> Self {
        self.need_image = need_image;
        self
    }

    pub fn with_merge_same_bullet(mut self, enabled: bool) -> Self {
        self.merge_same_bullet = enabled;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    fn default_zoom() -> f32 {
        3.0
    }

    fn default_page_to() -> usize {
        299
    }

    fn default_layout_min_score() -> f32 {
        0.4
    }

    fn default_layout_overlap_threshold() -> f32 {
        0.4
    }

    fn default_layout_cleanup_window() -> usize {
        2
    }

    fn default_layout_cleanup_threshold() -> f32 {
        0.7
    }

    fn default_table_crop_margin() -> f32 {
        10.0
    }

    fn default_table_band_threshold() -> f32 {
        0.3
    }

    fn default_concat_window() -> usize {
        12
    }

    fn default_concat_accept_score() -> f32 {
        0.5
    }

    fn default_scrap_window() -> usize {
        20
    }

    fn default_scrap_min_width_ratio() -> f32 {
        0.35
    }

    fn default_scrap_min_width() -> f32 {
        200.0
    }

    fn default_cross_page_table_gap() -> f32 {
        23.0
    }

    fn default_caption_max_distance() -> f32 {
        45.0
    }

    fn default_true() -> bool {
        true
    }
}

impl Default for ReflowConfig {
    fn default() -> Self {
        Self {
            zoom: Self::default_zoom(),
            page_from: 0,
            page_to: Self::default_page_to(),
            layout_min_score: Self::default_layout_min_score(),
            layout_overlap_threshold: Self::default_layout_overlap_threshold(),
            layout_cleanup_window: Self::default_layout_cleanup_window(),
            layout_cleanup_threshold: Self::default_layout_cleanup_threshold(),
            table_crop_margin: Self::default_table_crop_margin(),
            table_auto_rotate: true,
            table_band_threshold: Self::default_table_band_threshold(),
            concat_window: Self::default_concat_window(),
            concat_accept_score: Self::default_concat_accept_score(),
            concat_between_pages: true,
            scrap_window: Self::default_scrap_window(),
            scrap_min_width_ratio: Self::default_scrap_min_width_ratio(),
            scrap_min_width: Self::default_scrap_min_width(),
            cross_page_table_gap: Self::default_cross_page_table_gap(),
            caption_max_distance: Self::default_caption_max_distance(),
            table_output: TableOutput::default(),
            need_image: true,
            merge_same_bullet: false,
            parallel: ParallelPolicy::default(),
        }
    }
}

impl ConfigValidator for ReflowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("zoom", self.zoom)?;
        if self.page_to <= self.page_from {
            return Err(ConfigError::invalid(format!(
                "page_to ({}) must be greater than page_from ({})",
                self.page_to, self.page_from
            )));
        }
        ensure_range("layout_min_score", self.layout_min_score, 0.0, 1.0)?;
        ensure_range(
            "layout_overlap_threshold",
            self.layout_overlap_threshold,
            0.0,
            1.0,
        )?;
        ensure_range(
            "layout_cleanup_threshold",
            self.layout_cleanup_threshold,
            0.0,
            1.0,
        )?;
        ensure_range("table_band_threshold", self.table_band_threshold, 0.0, 1.0)?;
        ensure_range("concat_accept_score", self.concat_accept_score, 0.0, 1.0)?;
        ensure_range("scrap_min_width_ratio", self.scrap_min_width_ratio, 0.0, 1.0)?;
        ensure_positive("cross_page_table_gap", self.cross_page_table_gap)?;
        ensure_positive("caption_max_distance", self.caption_max_distance)?;
        if self.table_crop_margin < 0.0 {
            return Err(ConfigError::invalid("table_crop_margin must not be negative"));
        }
        for (name, window) in [
            ("layout_cleanup_window", self.layout_cleanup_window),
            ("concat_window", self.concat_window),
            ("scrap_window", self.scrap_window),
        ] {
            if window == 0 {
                return Err(ConfigError::invalid(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReflowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            ReflowConfig::from_json(r#"{"zoom": 2.0, "table_output": "verbalized"}"#).unwrap();
        assert_eq!(config.zoom, 2.0);
        assert_eq!(config.table_output, TableOutput::Verbalized);
        assert_eq!(config.concat_window, 12);
        assert!(config.concat_between_pages);
        assert!(config.table_auto_rotate);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ReflowConfig::new().with_zoom(0.0).validate().is_err());
        assert!(ReflowConfig::new().with_page_range(5, 5).validate().is_err());

        let mut config = ReflowConfig::new();
        config.table_band_threshold = 1.5;
        assert!(config.validate().is_err());

        config = ReflowConfig::new();
        config.concat_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(ReflowConfig::from_json("{ not json").is_err());
    }
}
