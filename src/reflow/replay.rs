//! Adapters that replay recorded detector output.
//!
//! A [`RecordedDetections`] file holds, per rendered page, the OCR lines,
//! layout regions and table bands a set of models produced. Replaying it
//! through [`ReplayAdapters`] runs the full reconstruction without any model
//! runtime, which is how the CLI and the integration tests drive the engine.
//!
//! # File format
//!
//! ```json
//! {
//!   "zoom": 3.0,
//!   "pages": [
//!     {
//!       "width": 1800,
//!       "height": 2400,
//!       "lines": [{"rect": {"x0": 150, "x1": 900, "top": 300, "bottom": 330}, "text": "..."}],
//!       "layout": [{"label": "text", "rect": {...}, "score": 0.93}],
//!       "tables": [[{"label": "table row", "rect": {...}, "score": 0.9}]],
//!       "table_ocr": [{"table": 0, "rotation": 90, "lines": [...]}]
//!     }
//!   ]
//! }
//! ```
//!
//! All rectangles are in rendered pixels; table bands are relative to the
//! table crop, one list per table region of the page in layout order.
//! `table_ocr` holds what the recognizer read on a table crop turned by
//! `rotation` degrees. Tables without an entry read as empty, which keeps
//! them upright during orientation checks.

use super::features::ConcatFeatures;
use crate::core::{
    AdapterResult, ConcatenationScorer, LayoutDetector, OcrLine, OcrPage, ReflowError,
    ReflowResult, RegionDetection, TableCrop, TableRotation, TableStructureDetector,
    TextRecognizer,
};
use crate::processors::Rect;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A recognized line or character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedText {
    pub rect: Rect,
    pub text: String,
    #[serde(default = "RecordedRegion::default_score")]
    pub score: f32,
}

/// OCR of one table crop in one orientation, in crop pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedTableText {
    /// Index of the table region on its page.
    pub table: usize,
    /// Clockwise turn in degrees.
    #[serde(default)]
    pub rotation: u16,
    #[serde(default)]
    pub lines: Vec<RecordedText>,
}

/// A layout region or table band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRegion {
    pub label: String,
    pub rect: Rect,
    #[serde(default = "RecordedRegion::default_score")]
    pub score: f32,
}

impl RecordedRegion {
    fn default_score() -> f32 {
        1.0
    }

    fn to_detection(&self) -> RegionDetection {
        RegionDetection::new(self.label.clone(), self.rect, self.score)
    }
}

/// Everything recorded for one rendered page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedPage {
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    #[serde(default)]
    pub lines: Vec<RecordedText>,
    #[serde(default)]
    pub chars: Vec<RecordedText>,
    #[serde(default)]
    pub layout: Vec<RecordedRegion>,
    #[serde(default)]
    pub tables: Vec<Vec<RecordedRegion>>,
    #[serde(default)]
    pub table_ocr: Vec<RecordedTableText>,
}

/// A whole recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDetections {
    /// Zoom the pages were rendered at.
    #[serde(default = "RecordedDetections::default_zoom")]
    pub zoom: f32,
    pub pages: Vec<RecordedPage>,
}

impl RecordedDetections {
    fn default_zoom() -> f32 {
        3.0
    }

    pub fn from_json(json: &str) -> ReflowResult<Self> {
        let recording: Self = serde_json::from_str(json)
            .map_err(|e| ReflowError::invalid_input(format!("malformed recording: {e}")))?;
        if let Some(i) = recording
            .pages
            .iter()
            .position(|p| p.width == 0 || p.height == 0)
        {
            return Err(ReflowError::invalid_input(format!(
                "recorded page {} has an empty size",
                i + 1
            )));
        }
        for (i, page) in recording.pages.iter().enumerate() {
            if let Some(t) = page
                .table_ocr
                .iter()
                .find(|t| TableRotation::from_degrees(t.rotation).is_none())
            {
                return Err(ReflowError::invalid_input(format!(
                    "recorded page {} turns table {} by {} degrees; only quarter turns are allowed",
                    i + 1,
                    t.table,
                    t.rotation
                )));
            }
        }
        Ok(recording)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ReflowResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// White pages of the recorded sizes, for replays without the source document.
    pub fn blank_pages(&self) -> Vec<RgbImage> {
        self.pages
            .iter()
            .map(|p| RgbImage::from_pixel(p.width, p.height, Rgb([255, 255, 255])))
            .collect()
    }
}

/// Serves a recording through the detector traits.
///
/// Page indices are relative to the rendered range, so a recording made for
/// pages 10..20 must be replayed with the same page range.
#[derive(Debug, Clone)]
pub struct ReplayAdapters {
    recording: Arc<RecordedDetections>,
}

impl ReplayAdapters {
    pub fn new(recording: RecordedDetections) -> Self {
        Self {
            recording: Arc::new(recording),
        }
    }

    pub fn recording(&self) -> &RecordedDetections {
        &self.recording
    }
}

fn to_ocr_lines(texts: &[RecordedText]) -> Vec<OcrLine> {
    texts
        .iter()
        .map(|t| OcrLine::new(t.rect, t.text.clone(), t.score))
        .collect()
}

impl TextRecognizer for ReplayAdapters {
    fn ocr(&self, page_index: usize, _image: &RgbImage) -> AdapterResult<OcrPage> {
        let page = self
            .recording
            .pages
            .get(page_index)
            .ok_or_else(|| format!("no recorded OCR for page index {page_index}"))?;
        Ok(OcrPage {
            lines: to_ocr_lines(&page.lines),
            chars: to_ocr_lines(&page.chars),
        })
    }

    fn ocr_table(&self, crop: &TableCrop) -> AdapterResult<OcrPage> {
        let lines = self
            .recording
            .pages
            .get(crop.page_index)
            .and_then(|p| {
                p.table_ocr.iter().find(|t| {
                    t.table == crop.table_index
                        && TableRotation::from_degrees(t.rotation) == Some(crop.rotation)
                })
            })
            .map(|t| to_ocr_lines(&t.lines))
            .unwrap_or_default();
        Ok(OcrPage {
            lines,
            chars: Vec::new(),
        })
    }
}

impl LayoutDetector for ReplayAdapters {
    fn detect_layout(&self, pages: &[RgbImage]) -> AdapterResult<Vec<Vec<RegionDetection>>> {
        if pages.len() > self.recording.pages.len() {
            return Err(format!(
                "{} pages rendered but only {} recorded",
                pages.len(),
                self.recording.pages.len()
            )
            .into());
        }
        Ok(self.recording.pages[..pages.len()]
            .iter()
            .map(|p| p.layout.iter().map(RecordedRegion::to_detection).collect())
            .collect())
    }
}

impl TableStructureDetector for ReplayAdapters {
    fn detect_table_structure(
        &self,
        crops: &[TableCrop],
    ) -> AdapterResult<Vec<Vec<RegionDetection>>> {
        Ok(crops
            .iter()
            .map(|crop| {
                self.recording
                    .pages
                    .get(crop.page_index)
                    .and_then(|p| p.tables.get(crop.table_index))
                    .map(|bands| bands.iter().map(RecordedRegion::to_detection).collect())
                    .unwrap_or_default()
            })
            .collect())
    }
}

/// A logistic regression over [`ConcatFeatures::to_vector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticScorer {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LogisticScorer {
    /// Loads weights from JSON (`{"weights": [...], "bias": 0.0}`).
    pub fn from_json(json: &str) -> ReflowResult<Self> {
        let scorer: Self = serde_json::from_str(json)
            .map_err(|e| ReflowError::config_error_detailed("concat scorer", e.to_string()))?;
        if scorer.weights.len() != ConcatFeatures::LEN {
            return Err(ReflowError::config_error_detailed(
                "concat scorer",
                format!(
                    "expected {} weights, found {}",
                    ConcatFeatures::LEN,
                    scorer.weights.len()
                ),
            ));
        }
        Ok(scorer)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ReflowResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Hand-tuned weights: punctuation at the joint and a shared region favour a
/// merge; sentence ends, page breaks, bullets and tables oppose it.
impl Default for LogisticScorer {
    fn default() -> Self {
        let weights = vec![
            -0.5, // same row band
            -1.0, // y distance
            -1.5, // page delta
            1.0,  // same layout type
            0.5,  // up is text
            0.5,  // down is text
            -2.0, // up is table
            -2.0, // down is table
            -2.5, // up ends sentence
            2.0,  // up ends continuation
            1.5,  // down starts with punctuation
            -1.0, // up fully bracketed
            0.5,  // up comma tail
            0.5,  // up comma tail
            1.0,  // bracket closed below
            -2.0, // down is bullet
            -0.5, // down starts uppercase
            0.0,  // up ends uppercase
            0.5,  // up ends lowercase or digit
            -1.0, // down is numeric
            -0.5, // same two-char suffix
            0.0,  // up right of down
            -1.0, // height difference
            -0.5, // x distance
            -0.2, // length delta
            0.0,  // joint token delta
            0.0,  // token count delta
            0.0,  // same last token
            -0.3, // max in row
            -0.3, // in row delta
            0.0,  // down single word
            -0.5, // up single word
        ];
        Self { weights, bias: 1.0 }
    }
}

impl ConcatenationScorer for LogisticScorer {
    fn score(&self, features: &ConcatFeatures) -> AdapterResult<f32> {
        let x = features.to_vector();
        if self.weights.len() != x.len() {
            return Err(format!(
                "scorer has {} weights for {} features",
                self.weights.len(),
                x.len()
            )
            .into());
        }
        let z: f32 = self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f32>();
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = r#"{
        "zoom": 2.0,
        "pages": [{
            "width": 1200,
            "height": 1600,
            "lines": [{"rect": {"x0": 100, "x1": 900, "top": 200, "bottom": 220}, "text": "Hello"}],
            "layout": [{"label": "text", "rect": {"x0": 90, "x1": 910, "top": 190, "bottom": 230}}],
            "tables": [[{"label": "table row", "rect": {"x0": 0, "x1": 50, "top": 0, "bottom": 10}, "score": 0.8}]]
        }]
    }"#;

    #[test]
    fn test_recording_parses_with_defaults() {
        let recording = RecordedDetections::from_json(RECORDING).unwrap();
        assert_eq!(recording.zoom, 2.0);
        assert_eq!(recording.pages[0].layout[0].score, 1.0);
        assert!(recording.pages[0].chars.is_empty());

        let blank = recording.blank_pages();
        assert_eq!(blank[0].dimensions(), (1200, 1600));
    }

    #[test]
    fn test_recording_rejects_empty_page() {
        let err = RecordedDetections::from_json(r#"{"pages": [{"width": 0, "height": 10}]}"#)
            .unwrap_err();
        assert!(matches!(err, ReflowError::InvalidInput { .. }), "unexpected: {}", err);
    }

    #[test]
    fn test_replay_serves_each_detector() {
        let replay = ReplayAdapters::new(RecordedDetections::from_json(RECORDING).unwrap());
        let pages = replay.recording().blank_pages();

        let ocr = replay.ocr(0, &pages[0]).unwrap();
        assert_eq!(ocr.lines[0].text, "Hello");
        assert!(replay.ocr(1, &pages[0]).is_err());

        let layout = replay.detect_layout(&pages).unwrap();
        assert_eq!(layout[0][0].label, "text");

        let crops = vec![
            TableCrop {
                page_index: 0,
                table_index: 0,
                rotation: TableRotation::Upright,
                image: RgbImage::new(50, 10),
            },
            TableCrop {
                page_index: 0,
                table_index: 3,
                rotation: TableRotation::Upright,
                image: RgbImage::new(50, 10),
            },
        ];
        let bands = replay.detect_table_structure(&crops).unwrap();
        assert_eq!(bands[0].len(), 1);
        assert!(bands[1].is_empty());
    }

    #[test]
    fn test_replay_serves_table_ocr_per_rotation() {
        let json = r#"{"pages": [{
            "width": 100,
            "height": 100,
            "table_ocr": [{"table": 0, "rotation": 90, "lines": [
                {"rect": {"x0": 0, "x1": 40, "top": 0, "bottom": 10}, "text": "Qty", "score": 0.9}
            ]}]
        }]}"#;
        let replay = ReplayAdapters::new(RecordedDetections::from_json(json).unwrap());
        let mut crop = TableCrop {
            page_index: 0,
            table_index: 0,
            rotation: TableRotation::Cw90,
            image: RgbImage::new(10, 40),
        };
        let read = replay.ocr_table(&crop).unwrap();
        assert_eq!(read.lines[0].text, "Qty");
        assert_eq!(read.lines[0].score, 0.9);

        crop.rotation = TableRotation::Upright;
        assert!(replay.ocr_table(&crop).unwrap().lines.is_empty());

        let bad = r#"{"pages": [{"width": 1, "height": 1, "table_ocr": [{"table": 0, "rotation": 45}]}]}"#;
        assert!(RecordedDetections::from_json(bad).is_err());
    }

    #[test]
    fn test_logistic_scorer_prefers_continuations() {
        let scorer = LogisticScorer::default();
        assert_eq!(scorer.weights.len(), ConcatFeatures::LEN);

        let continuation = ConcatFeatures {
            y_distance_ratio: 1.3,
            same_layout_type: true,
            up_is_text: true,
            down_is_text: true,
            up_ends_continuation: true,
            ..Default::default()
        };
        let sentence_end = ConcatFeatures {
            up_ends_sentence: true,
            up_ends_continuation: false,
            ..continuation.clone()
        };
        let merge = scorer.score(&continuation).unwrap();
        let split = scorer.score(&sentence_end).unwrap();
        assert!(merge > 0.5, "continuation scored {}", merge);
        assert!(split < merge, "sentence end scored {} >= {}", split, merge);
    }

    #[test]
    fn test_logistic_scorer_weight_count_checked() {
        let err = LogisticScorer::from_json(r#"{"weights": [1.0, 2.0], "bias": 0.0}"#).unwrap_err();
        assert!(err.to_string().contains("expected 32 weights"), "unexpected: {}", err);
    }
}
