//! Fixtures shared by the stage tests.

use super::StageContext;
use super::features::ConcatFeatures;
use crate::core::{
    AdapterResult, ConcatenationScorer, DocumentSource, LayoutDetector, OcrLine, OcrPage,
    PatternTables, Rasterizer, ReflowConfig, RegionDetection, TableCrop, TableStructureDetector,
    TextRecognizer,
};
use crate::domain::{DocumentPages, PageGeometry};
use crate::processors::Rect;
use image::{Rgb, RgbImage};
use std::sync::Arc;

pub(crate) const PAGE_WIDTH: f32 = 600.0;
pub(crate) const PAGE_HEIGHT: f32 = 800.0;

/// A document of identical 600x800 pages with 10-unit lines and 5-unit glyphs.
pub(crate) struct TestDocument {
    pub config: ReflowConfig,
    pub patterns: Arc<PatternTables>,
    pub pages: DocumentPages,
    pub is_english: bool,
}

impl TestDocument {
    pub fn pages(count: usize) -> Self {
        let geometry = PageGeometry {
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
            mean_height: 10.0,
            mean_width: 5.0,
        };
        Self {
            config: ReflowConfig::default(),
            patterns: PatternTables::shared_default(),
            pages: DocumentPages::new(vec![geometry; count], 0),
            is_english: true,
        }
    }

    pub fn single_page() -> Self {
        Self::pages(1)
    }

    pub fn context(&self) -> StageContext<'_> {
        StageContext::new(&self.config, &self.patterns, &self.pages, self.is_english)
    }
}

/// Returns the same score for every pair.
#[derive(Debug)]
pub(crate) struct ConstantScorer(pub f32);

impl ConcatenationScorer for ConstantScorer {
    fn score(&self, _features: &ConcatFeatures) -> AdapterResult<f32> {
        Ok(self.0)
    }
}

/// Fails on every call.
#[derive(Debug)]
pub(crate) struct FailingScorer;

impl ConcatenationScorer for FailingScorer {
    fn score(&self, _features: &ConcatFeatures) -> AdapterResult<f32> {
        Err("scorer unavailable".into())
    }
}

/// Renders `pages` white pages of `width` x `height` pixels.
#[derive(Debug, Clone)]
pub(crate) struct WhitePages {
    pub pages: usize,
    pub width: u32,
    pub height: u32,
}

impl Rasterizer for WhitePages {
    fn rasterize(
        &self,
        _source: &DocumentSource,
        _zoom: f32,
        page_from: usize,
        page_to: usize,
    ) -> AdapterResult<Vec<RgbImage>> {
        let count = page_to.min(self.pages).saturating_sub(page_from);
        Ok((0..count)
            .map(|_| RgbImage::from_pixel(self.width, self.height, Rgb([255, 255, 255])))
            .collect())
    }
}

/// Returns canned OCR lines per page, in pixel coordinates.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedOcr {
    pub pages: Vec<Vec<(Rect, &'static str)>>,
    pub fail_on_page: Option<usize>,
}

impl TextRecognizer for ScriptedOcr {
    fn ocr(&self, page_index: usize, _image: &RgbImage) -> AdapterResult<OcrPage> {
        if self.fail_on_page == Some(page_index) {
            return Err(format!("recognizer crashed on page {page_index}").into());
        }
        let lines = self
            .pages
            .get(page_index)
            .map(|lines| {
                lines
                    .iter()
                    .map(|(rect, text)| OcrLine::new(*rect, *text, 0.95))
                    .collect()
            })
            .unwrap_or_default();
        Ok(OcrPage {
            lines,
            chars: Vec::new(),
        })
    }
}

/// Returns canned layout detections per page, in pixel coordinates.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedLayout {
    pub pages: Vec<Vec<RegionDetection>>,
}

impl LayoutDetector for ScriptedLayout {
    fn detect_layout(&self, pages: &[RgbImage]) -> AdapterResult<Vec<Vec<RegionDetection>>> {
        Ok((0..pages.len())
            .map(|i| self.pages.get(i).cloned().unwrap_or_default())
            .collect())
    }
}

/// Returns the same band list for every crop, in crop pixel coordinates.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTables {
    pub bands: Vec<RegionDetection>,
}

impl TableStructureDetector for ScriptedTables {
    fn detect_table_structure(
        &self,
        crops: &[TableCrop],
    ) -> AdapterResult<Vec<Vec<RegionDetection>>> {
        Ok(crops.iter().map(|_| self.bands.clone()).collect())
    }
}
