//! The orchestrator that runs a document through every stage.
//!
//! # Example
//!
//! ```no_run
//! use oar_reflow::core::{DocumentSource, ReflowConfig};
//! use oar_reflow::reflow::{RecordedDetections, ReflowEngineBuilder, ReplayAdapters};
//!
//! let recording = RecordedDetections::from_path("recorded.json")?;
//! let pages = recording.blank_pages();
//! let engine = ReflowEngineBuilder::new(ReflowConfig::new().with_zoom(recording.zoom))
//!     .with_detectors(ReplayAdapters::new(recording))
//!     .build()?;
//! let output = engine.parse(&DocumentSource::Pages(pages))?;
//! println!("{}", output.text());
//! # Ok::<(), oar_reflow::core::ReflowError>(())
//! ```

use super::StageContext;
use super::concat::concat_downward;
use super::layout_tagger::{regions_from_detections, tag_layouts};
use super::ocr_ingest::{IngestedPage, ingest_page};
use super::page_filter::filter_front_matter;
use super::replay::LogisticScorer;
use super::scraps::filter_scraps;
use super::table_figure::{PlacedVisual, extract_tables_and_figures};
use super::table_structure::{
    bands_from_detections, gather_bands, normalize_bands, orient_table_crops,
    replace_turned_table_boxes, table_crops, tag_table_boxes,
};
use super::text_merge::{merge_horizontal, merge_same_bullet, naive_vertical_merge};
use crate::core::{
    AdapterError, AdapterKind, ConcatenationScorer, ConfigValidator, DocumentSource,
    LayoutDetector, PatternTables, ProcessingStage, Progress, Rasterizer, ReflowConfig,
    ReflowError, ReflowResult, TableStructureDetector, TextRecognizer,
};
use crate::domain::{
    Completion, DocumentPages, LayoutRegion, LayoutType, ParsedBox, PositionTag, ReflowOutput,
    TextBox, TextChunk, VisualChunk,
};
use crate::processors::{Rect, detect_english};
use image::RgbImage;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// OCR progress is reported once per this many pages.
const OCR_REPORT_EVERY: usize = 6;
/// Share of the progress range spent on OCR.
const OCR_SHARE: f32 = 0.4;
const LAYOUT_DONE: f32 = 0.63;
const TABLES_DONE: f32 = 0.83;
const MERGE_DONE: f32 = 0.92;

fn adapter_error(adapter: AdapterKind, context: String, source: AdapterError) -> ReflowError {
    tracing::warn!(target: "engine", %adapter, %context, error = %source, "adapter call failed");
    ReflowError::adapter_failure(adapter, context, source)
}

fn log_stage(stage: ProcessingStage, started: Instant, boxes: usize) {
    tracing::info!(
        target: "engine",
        stage = %stage,
        elapsed_ms = started.elapsed().as_millis() as u64,
        boxes,
        "stage finished"
    );
}

/// Builder for [`ReflowEngine`].
///
/// The text recognizer and the two detectors are required. Without a
/// rasterizer only pre-rendered pages and single images are accepted; the
/// concatenation scorer defaults to [`LogisticScorer::default`].
#[derive(Default)]
pub struct ReflowEngineBuilder {
    config: ReflowConfig,
    patterns: Option<Arc<PatternTables>>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    layout_detector: Option<Arc<dyn LayoutDetector>>,
    table_detector: Option<Arc<dyn TableStructureDetector>>,
    scorer: Option<Arc<dyn ConcatenationScorer>>,
}

impl ReflowEngineBuilder {
    pub fn new(config: ReflowConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Replaces the built-in heuristic pattern tables.
    pub fn with_patterns(mut self, patterns: Arc<PatternTables>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.rasterizer = Some(Arc::new(rasterizer));
        self
    }

    pub fn with_text_recognizer(mut self, recognizer: impl TextRecognizer + 'static) -> Self {
        self.recognizer = Some(Arc::new(recognizer));
        self
    }

    pub fn with_layout_detector(mut self, detector: impl LayoutDetector + 'static) -> Self {
        self.layout_detector = Some(Arc::new(detector));
        self
    }

    pub fn with_table_structure_detector(
        mut self,
        detector: impl TableStructureDetector + 'static,
    ) -> Self {
        self.table_detector = Some(Arc::new(detector));
        self
    }

    /// Registers one value as recognizer, layout detector and table detector.
    pub fn with_detectors<A>(mut self, adapters: A) -> Self
    where
        A: TextRecognizer + LayoutDetector + TableStructureDetector + 'static,
    {
        let shared = Arc::new(adapters);
        self.recognizer = Some(shared.clone());
        self.layout_detector = Some(shared.clone());
        self.table_detector = Some(shared);
        self
    }

    pub fn with_concat_scorer(mut self, scorer: impl ConcatenationScorer + 'static) -> Self {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    /// Validates the configuration and assembles the engine.
    pub fn build(self) -> ReflowResult<ReflowEngine> {
        self.config.validate()?;
        let missing =
            |what: &str| ReflowError::config_error_detailed("engine", format!("no {what} registered"));
        Ok(ReflowEngine {
            recognizer: self.recognizer.ok_or_else(|| missing("text recognizer"))?,
            layout_detector: self.layout_detector.ok_or_else(|| missing("layout detector"))?,
            table_detector: self
                .table_detector
                .ok_or_else(|| missing("table structure detector"))?,
            scorer: self.scorer.unwrap_or_else(|| {
                Arc::new(LogisticScorer::default()) as Arc<dyn ConcatenationScorer>
            }),
            patterns: self.patterns.unwrap_or_else(PatternTables::shared_default),
            rasterizer: self.rasterizer,
            config: self.config,
        })
    }
}

/// Rebuilds reading order, tables and figures from page images.
///
/// An engine holds no per-document state; one instance can parse many
/// documents, concurrently through [`ReflowEngine::parse_many`].
pub struct ReflowEngine {
    config: ReflowConfig,
    patterns: Arc<PatternTables>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    recognizer: Arc<dyn TextRecognizer>,
    layout_detector: Arc<dyn LayoutDetector>,
    table_detector: Arc<dyn TableStructureDetector>,
    scorer: Arc<dyn ConcatenationScorer>,
}

impl fmt::Debug for ReflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflowEngine")
            .field("config", &self.config)
            .field("rasterizer", &self.rasterizer)
            .field("recognizer", &self.recognizer)
            .field("layout_detector", &self.layout_detector)
            .field("table_detector", &self.table_detector)
            .finish_non_exhaustive()
    }
}

/// Everything known once layout and table tagging have run.
struct Analysis {
    images: Vec<RgbImage>,
    pages: DocumentPages,
    is_english: bool,
    boxes: Vec<TextBox>,
    regions: Vec<LayoutRegion>,
    /// Set when cancellation stopped the analysis early.
    stopped_after: Option<ProcessingStage>,
}

impl Analysis {
    fn cancelled(&self) -> bool {
        self.stopped_after.is_some()
    }
}

/// Emits every non-empty box as its own tagged chunk.
fn tagged_chunks(boxes: &[TextBox], pages: &DocumentPages) -> Vec<TextChunk> {
    boxes
        .iter()
        .filter(|b| !b.text.trim().is_empty())
        .map(|b| TextChunk::new(format!("{}{}", b.text, PositionTag::for_box(b, pages))))
        .collect()
}

impl ReflowEngine {
    pub fn builder(config: ReflowConfig) -> ReflowEngineBuilder {
        ReflowEngineBuilder::new(config)
    }

    pub fn config(&self) -> &ReflowConfig {
        &self.config
    }

    /// Parses one document without progress reporting.
    pub fn parse(&self, source: &DocumentSource) -> ReflowResult<ReflowOutput> {
        self.parse_with_progress(source, &mut Progress::silent())
    }

    /// Parses one document, reporting progress and honouring cancellation
    /// between pages and between stages.
    ///
    /// Cancellation is not an error: the returned output carries whatever was
    /// built so far and [`Completion::Cancelled`].
    pub fn parse_with_progress(
        &self,
        source: &DocumentSource,
        progress: &mut Progress<'_>,
    ) -> ReflowResult<ReflowOutput> {
        let started = Instant::now();
        let analysis = self.analyze(source, progress)?;
        let is_english = analysis.is_english;
        let ctx = StageContext::new(&self.config, &self.patterns, &analysis.pages, is_english);
        let partial = |boxes: &[TextBox], visuals: Vec<VisualChunk>, after: ProcessingStage| {
            tracing::info!(target: "engine", %after, "parse cancelled");
            ReflowOutput {
                chunks: tagged_chunks(boxes, ctx.pages),
                visuals,
                is_english,
                completion: Completion::Cancelled { after },
            }
        };
        if let Some(after) = analysis.stopped_after {
            return Ok(partial(&analysis.boxes, Vec::new(), after));
        }
        let Analysis { images, regions, boxes, .. } = &analysis;

        let stage_started = Instant::now();
        let mut merged = merge_horizontal(boxes.clone(), &ctx);
        if self.config.merge_same_bullet {
            merged = merge_same_bullet(merged);
        }
        let merged = concat_downward(merged, &ctx, self.scorer.as_ref())?;
        log_stage(ProcessingStage::TextMerge, stage_started, merged.len());
        progress.report(MERGE_DONE, "Text merged");

        if progress.is_cancelled() {
            return Ok(partial(&merged, Vec::new(), ProcessingStage::TextMerge));
        }
        let filtered = filter_front_matter(merged, &ctx);

        if progress.is_cancelled() {
            return Ok(partial(&filtered, Vec::new(), ProcessingStage::PageFilter));
        }
        let stage_started = Instant::now();
        let extracted = extract_tables_and_figures(filtered, regions, images, &ctx);
        log_stage(
            ProcessingStage::TableFigureExtraction,
            stage_started,
            extracted.visuals.len(),
        );
        let visuals: Vec<VisualChunk> = extracted.visuals.into_iter().map(|v| v.chunk).collect();

        if progress.is_cancelled() {
            return Ok(partial(
                &extracted.boxes,
                visuals,
                ProcessingStage::TableFigureExtraction,
            ));
        }
        let stage_started = Instant::now();
        let chunks = filter_scraps(extracted.boxes, &ctx);
        log_stage(ProcessingStage::Emission, stage_started, chunks.len());
        progress.report(1.0, "Done");

        tracing::info!(
            target: "engine",
            pages = analysis.pages.len(),
            chunks = chunks.len(),
            visuals = visuals.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document parsed"
        );
        Ok(ReflowOutput {
            chunks,
            visuals,
            is_english,
            completion: Completion::Complete,
        })
    }

    /// Parses one document into a flat list of boxes in reading order.
    ///
    /// Lines are merged into paragraphs geometrically and through the scorer,
    /// but no front-matter or scrap filtering runs. Tables and figures are
    /// inserted next to the closest text box on their page. A cancelled run
    /// returns the boxes tagged so far.
    pub fn parse_into_boxes(
        &self,
        source: &DocumentSource,
        progress: &mut Progress<'_>,
    ) -> ReflowResult<Vec<ParsedBox>> {
        let analysis = self.analyze(source, progress)?;
        let pages = &analysis.pages;
        let ctx = StageContext::new(&self.config, &self.patterns, pages, analysis.is_english);
        if analysis.cancelled() {
            return Ok(analysis
                .boxes
                .iter()
                .filter(|b| !b.text.trim().is_empty())
                .map(|b| parsed_text_box(b, pages))
                .collect());
        }

        let merged = merge_horizontal(analysis.boxes.clone(), &ctx);
        let extracted = extract_tables_and_figures(merged, &analysis.regions, &analysis.images, &ctx);
        let text = naive_vertical_merge(extracted.boxes, &ctx);
        let text = concat_downward(text, &ctx, self.scorer.as_ref())?;
        let text: Vec<TextBox> = text.into_iter().filter(|b| !b.text.trim().is_empty()).collect();

        let mut slots: Vec<(usize, PlacedVisual)> = extracted
            .visuals
            .into_iter()
            .map(|v| (insertion_index(&text, v.page, &v.rect), v))
            .collect();
        slots.sort_by_key(|(at, _)| *at);

        let mut out = Vec::with_capacity(text.len() + slots.len());
        let mut pending = slots.into_iter().peekable();
        for (i, b) in text.iter().enumerate() {
            while let Some((_, v)) = pending.next_if(|(at, _)| *at == i) {
                out.push(parsed_visual(v, pages));
            }
            out.push(parsed_text_box(b, pages));
        }
        out.extend(pending.map(|(_, v)| parsed_visual(v, pages)));
        progress.report(1.0, "Done");
        Ok(out)
    }

    /// Parses independent documents, in parallel when the configured
    /// [`ParallelPolicy`](crate::core::ParallelPolicy) allows it. Results are
    /// index-aligned with `sources`.
    pub fn parse_many(&self, sources: &[DocumentSource]) -> Vec<ReflowResult<ReflowOutput>> {
        if self.config.parallel.should_parallelize(sources.len()) {
            tracing::debug!(target: "engine", documents = sources.len(), "parsing in parallel");
            sources.par_iter().map(|s| self.parse(s)).collect()
        } else {
            sources.iter().map(|s| self.parse(s)).collect()
        }
    }

    /// Renders the configured page range.
    fn render(&self, source: &DocumentSource) -> ReflowResult<Vec<RgbImage>> {
        let (from, to) = (self.config.page_from, self.config.page_to);
        match source {
            DocumentSource::Pages(pages) => Ok(pages
                .iter()
                .skip(from)
                .take(to.saturating_sub(from))
                .cloned()
                .collect()),
            DocumentSource::Image(bytes) => {
                if from > 0 {
                    return Ok(Vec::new());
                }
                Ok(vec![image::load_from_memory(bytes)?.to_rgb8()])
            }
            DocumentSource::Pdf(_) => {
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    ReflowError::unsupported_input("PDF input needs a rasterizer and none is registered")
                })?;
                rasterizer
                    .rasterize(source, self.config.zoom, from, to)
                    .map_err(|e| adapter_error(AdapterKind::Rasterizer, format!("pages {from}..{to}"), e))
            }
        }
    }

    /// Runs rasterization, OCR, layout tagging and table tagging.
    fn analyze(&self, source: &DocumentSource, progress: &mut Progress<'_>) -> ReflowResult<Analysis> {
        let zoom = self.config.zoom;
        let started = Instant::now();
        let images = self.render(source)?;
        log_stage(ProcessingStage::Rasterize, started, images.len());
        let mut analysis = Analysis {
            images,
            pages: DocumentPages::default(),
            is_english: false,
            boxes: Vec::new(),
            regions: Vec::new(),
            stopped_after: None,
        };
        if progress.is_cancelled() {
            analysis.stopped_after = Some(ProcessingStage::Rasterize);
            return Ok(analysis);
        }

        let started = Instant::now();
        let total = analysis.images.len();
        let mut ingested: Vec<IngestedPage> = Vec::with_capacity(total);
        for (i, image) in analysis.images.iter().enumerate() {
            if progress.is_cancelled() {
                analysis.stopped_after = Some(ProcessingStage::Ocr);
                break;
            }
            let ocr = self.recognizer.ocr(i, image).map_err(|e| {
                adapter_error(
                    AdapterKind::Ocr,
                    format!("page {}", self.config.page_from + i + 1),
                    e,
                )
            })?;
            ingested.push(ingest_page(i + 1, &ocr, image.width(), image.height(), zoom));
            if (i + 1) % OCR_REPORT_EVERY == 0 || i + 1 == total {
                progress.report(
                    OCR_SHARE * (i + 1) as f32 / total as f32,
                    &format!("OCR finished on {} of {} pages", i + 1, total),
                );
            }
        }

        analysis.pages = DocumentPages::new(
            ingested.iter().map(|p| p.geometry.clone()).collect(),
            self.config.page_from,
        );
        analysis.is_english = detect_english(
            ingested.iter().map(|p| p.boxes.iter().map(|b| b.text.as_str())),
            &self.patterns,
        );
        for page in ingested {
            for mut b in page.boxes {
                b.rect = b.rect.translate(0.0, analysis.pages.offset(b.page));
                analysis.boxes.push(b);
            }
        }
        log_stage(ProcessingStage::Ocr, started, analysis.boxes.len());
        if analysis.cancelled() {
            return Ok(analysis);
        }
        progress.report(OCR_SHARE, "OCR finished");

        if progress.is_cancelled() {
            analysis.stopped_after = Some(ProcessingStage::Ocr);
            return Ok(analysis);
        }
        let started = Instant::now();
        let detections = self
            .layout_detector
            .detect_layout(&analysis.images)
            .map_err(|e| adapter_error(AdapterKind::LayoutDetector, format!("{total} pages"), e))?;
        let regions: Vec<LayoutRegion> = detections
            .iter()
            .enumerate()
            .flat_map(|(i, dets)| {
                regions_from_detections(
                    i + 1,
                    dets,
                    zoom,
                    analysis.pages.offset(i + 1),
                    self.config.layout_min_score,
                )
            })
            .collect();
        let ctx = StageContext::new(
            &self.config,
            &self.patterns,
            &analysis.pages,
            analysis.is_english,
        );
        let tagged = tag_layouts(std::mem::take(&mut analysis.boxes), regions, &ctx);
        let mut boxes = tagged.boxes;
        log_stage(ProcessingStage::LayoutTagging, started, boxes.len());
        progress.report(LAYOUT_DONE, "Layout analysis");

        if progress.is_cancelled() {
            analysis.boxes = boxes;
            analysis.regions = tagged.regions;
            analysis.stopped_after = Some(ProcessingStage::LayoutTagging);
            return Ok(analysis);
        }
        let started = Instant::now();
        let (mut crops, placements) = table_crops(&analysis.images, &tagged.regions, &ctx);
        if !crops.is_empty() {
            if self.config.table_auto_rotate {
                let reads = orient_table_crops(&mut crops, self.recognizer.as_ref());
                replace_turned_table_boxes(&mut boxes, &reads, &placements, &ctx);
            }
            let detections = self
                .table_detector
                .detect_table_structure(&crops)
                .map_err(|e| {
                    adapter_error(
                        AdapterKind::TableStructureDetector,
                        format!("{} table crops", crops.len()),
                        e,
                    )
                })?;
            let mut bands = bands_from_detections(&detections, &placements, &ctx);
            normalize_bands(&mut bands);
            let gathered = gather_bands(&bands, &boxes);
            tag_table_boxes(&mut boxes, &gathered, &ctx);
        }
        log_stage(ProcessingStage::TableStructure, started, crops.len());
        progress.report(TABLES_DONE, "Table analysis");

        analysis.boxes = boxes;
        analysis.regions = tagged.regions;
        if progress.is_cancelled() {
            analysis.stopped_after = Some(ProcessingStage::TableStructure);
        }
        Ok(analysis)
    }
}

/// Where a visual anchored at `rect` on `page` goes in `boxes`: next to the
/// vertically closest box of its page, else before the first later page.
fn insertion_index(boxes: &[TextBox], page: usize, rect: &Rect) -> usize {
    let nearest = boxes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.page == page)
        .min_by(|(_, a), (_, b)| {
            a.rect
                .y_distance(rect)
                .abs()
                .total_cmp(&b.rect.y_distance(rect).abs())
        });
    match nearest {
        Some((i, b)) if b.rect.center_y() <= rect.center_y() => i + 1,
        Some((i, _)) => i,
        None => boxes.iter().position(|b| b.page > page).unwrap_or(boxes.len()),
    }
}

fn parsed_text_box(b: &TextBox, pages: &DocumentPages) -> ParsedBox {
    let tag = PositionTag::for_box(b, pages);
    ParsedBox {
        page: b.page + pages.page_from,
        rect: b.rect.translate(0.0, -pages.offset(b.page)),
        text: b.text.clone(),
        layout_type: b
            .layout_kind()
            .map(|k| k.as_str().to_string())
            .unwrap_or_default(),
        positions: tag.page_positions(pages),
        position_tag: tag.to_string(),
        image: None,
    }
}

fn parsed_visual(visual: PlacedVisual, pages: &DocumentPages) -> ParsedBox {
    let PlacedVisual { chunk, page, rect } = visual;
    let tag = PositionTag::for_box(&TextBox::new(page, rect, ""), pages);
    let text = chunk.text();
    let (kind, positions, image) = match chunk {
        VisualChunk::Figure(f) => (LayoutType::Figure, f.positions, f.image),
        VisualChunk::Table(t) => (LayoutType::Table, t.positions, t.image),
    };
    ParsedBox {
        page: page + pages.page_from,
        rect: rect.translate(0.0, -pages.offset(page)),
        text,
        layout_type: kind.as_str().to_string(),
        position_tag: tag.to_string(),
        positions,
        image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancellationToken, RegionDetection};
    use crate::domain::TableContent;
    use crate::reflow::testing::{
        ConstantScorer, FailingScorer, ScriptedLayout, ScriptedOcr, ScriptedTables, WhitePages,
    };
    use std::ops::ControlFlow;

    const ZOOM: f32 = 3.0;

    fn px(x0: f32, x1: f32, top: f32, bottom: f32) -> Rect {
        Rect::new(x0, x1, top, bottom)
    }

    /// Two 600x800 pages at zoom 3: a heading, a paragraph and a 3x2 table on
    /// page 1, one paragraph on page 2.
    fn scripted_ocr() -> ScriptedOcr {
        ScriptedOcr {
            pages: vec![
                vec![
                    (px(150.0, 600.0, 150.0, 180.0), "1. Introduction"),
                    (px(150.0, 1650.0, 240.0, 270.0), "The engine rebuilds reading order from"),
                    (px(150.0, 1500.0, 282.0, 312.0), "recognized lines and layout regions."),
                    (px(180.0, 600.0, 930.0, 960.0), "Item"),
                    (px(900.0, 1200.0, 930.0, 960.0), "Qty"),
                    (px(180.0, 600.0, 1020.0, 1050.0), "Apples"),
                    (px(900.0, 1200.0, 1020.0, 1050.0), "12"),
                    (px(180.0, 600.0, 1110.0, 1140.0), "Pears"),
                    (px(900.0, 1200.0, 1110.0, 1140.0), "7"),
                ],
                vec![(
                    px(150.0, 1650.0, 300.0, 330.0),
                    "Closing remarks on the second page of the document.",
                )],
            ],
            fail_on_page: None,
        }
    }

    fn scripted_layout() -> ScriptedLayout {
        ScriptedLayout {
            pages: vec![
                vec![
                    RegionDetection::new("title", px(140.0, 700.0, 140.0, 190.0), 0.9),
                    RegionDetection::new("text", px(140.0, 1660.0, 230.0, 320.0), 0.9),
                    RegionDetection::new("table", px(150.0, 1650.0, 900.0, 1200.0), 0.9),
                ],
                vec![RegionDetection::new("text", px(140.0, 1660.0, 290.0, 340.0), 0.9)],
            ],
        }
    }

    /// Bands in crop pixels; the crop starts 30px left of and above the region.
    fn scripted_tables() -> ScriptedTables {
        ScriptedTables {
            bands: vec![
                RegionDetection::new("table column header", px(40.0, 1100.0, 50.0, 100.0), 0.9),
                RegionDetection::new("table row", px(40.0, 1100.0, 50.0, 100.0), 0.9),
                RegionDetection::new("table row", px(40.0, 1100.0, 140.0, 190.0), 0.9),
                RegionDetection::new("table row", px(40.0, 1100.0, 230.0, 280.0), 0.9),
                RegionDetection::new("table column", px(40.0, 500.0, 40.0, 290.0), 0.9),
                RegionDetection::new("table column", px(760.0, 1100.0, 40.0, 290.0), 0.9),
            ],
        }
    }

    fn pages() -> DocumentSource {
        DocumentSource::Pages(vec![RgbImage::new(1800, 2400), RgbImage::new(1800, 2400)])
    }

    fn engine_with(ocr: ScriptedOcr, scorer: impl ConcatenationScorer + 'static) -> ReflowEngine {
        ReflowEngineBuilder::new(ReflowConfig::new().with_zoom(ZOOM))
            .with_text_recognizer(ocr)
            .with_layout_detector(scripted_layout())
            .with_table_structure_detector(scripted_tables())
            .with_concat_scorer(scorer)
            .build()
            .unwrap()
    }

    fn engine() -> ReflowEngine {
        engine_with(scripted_ocr(), ConstantScorer(0.9))
    }

    #[test]
    fn test_end_to_end_text_and_table() {
        let mut fractions = Vec::new();
        let mut sink = |f: f32, _: &str| {
            fractions.push(f);
            ControlFlow::Continue(())
        };
        let output = {
            let mut progress = Progress::new(Some(&mut sink), None);
            engine().parse_with_progress(&pages(), &mut progress).unwrap()
        };

        assert!(output.is_complete());
        assert!(output.is_english);
        let text = output.text();
        assert!(text.contains("Introduction"), "text: {}", text);
        assert!(text.contains("recognized lines"), "text: {}", text);
        assert!(text.contains("Closing remarks"), "text: {}", text);
        assert!(!text.contains("Apples"), "table cell leaked into text: {}", text);
        for chunk in &output.chunks {
            assert!(!chunk.positions().is_empty(), "untagged chunk: {}", chunk.text);
        }
        assert!(output.chunks.last().unwrap().text.contains("@@2\t"));

        let tables: Vec<_> = output.tables().collect();
        assert_eq!(tables.len(), 1);
        let TableContent::Html(html) = &tables[0].content else {
            panic!("expected html table");
        };
        assert!(html.contains("Apples") && html.contains("Qty"), "html: {}", html);
        assert!(tables[0].image.is_some());
        assert_eq!(tables[0].positions[0].page, 1);

        for milestone in [OCR_SHARE, LAYOUT_DONE, TABLES_DONE, MERGE_DONE, 1.0] {
            assert!(fractions.contains(&milestone), "missing {} in {:?}", milestone, fractions);
        }
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "not monotone: {:?}", fractions);
    }

    #[test]
    fn test_cancel_from_callback_returns_partial() {
        let mut sink = |f: f32, _: &str| {
            if f >= LAYOUT_DONE {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let mut progress = Progress::new(Some(&mut sink), None);
        let output = engine().parse_with_progress(&pages(), &mut progress).unwrap();
        assert_eq!(
            output.completion,
            Completion::Cancelled {
                after: ProcessingStage::LayoutTagging
            }
        );
        assert!(output.visuals.is_empty());
        assert!(output.text().contains("Apples"), "partial text: {}", output.text());
    }

    #[test]
    fn test_cancelled_token_stops_before_ocr() {
        let token = CancellationToken::new();
        token.cancel();
        let mut progress = Progress::new(None, Some(token));
        let output = engine().parse_with_progress(&pages(), &mut progress).unwrap();
        assert_eq!(
            output.completion,
            Completion::Cancelled {
                after: ProcessingStage::Rasterize
            }
        );
        assert!(output.chunks.is_empty());
    }

    #[test]
    fn test_ocr_failure_propagates() {
        let ocr = ScriptedOcr {
            fail_on_page: Some(1),
            ..scripted_ocr()
        };
        let err = engine_with(ocr, ConstantScorer(0.9)).parse(&pages()).unwrap_err();
        assert!(
            matches!(
                err,
                ReflowError::ModelAdapter {
                    adapter: AdapterKind::Ocr,
                    ..
                }
            ),
            "unexpected error: {}",
            err
        );
        assert_eq!(err.to_string(), "ocr failed: page 2");
    }

    #[test]
    fn test_scorer_failure_propagates() {
        let err = engine_with(scripted_ocr(), FailingScorer).parse(&pages()).unwrap_err();
        assert!(err.is_adapter_failure(), "unexpected error: {}", err);
    }

    #[test]
    fn test_pdf_without_rasterizer_is_unsupported() {
        let source = DocumentSource::Pdf(b"%PDF-1.7".to_vec());
        let err = engine().parse(&source).unwrap_err();
        assert!(matches!(err, ReflowError::UnsupportedInput { .. }), "unexpected: {}", err);
    }

    #[test]
    fn test_pdf_goes_through_rasterizer() {
        let engine = ReflowEngineBuilder::new(ReflowConfig::new().with_zoom(ZOOM))
            .with_rasterizer(WhitePages {
                pages: 2,
                width: 1800,
                height: 2400,
            })
            .with_text_recognizer(scripted_ocr())
            .with_layout_detector(scripted_layout())
            .with_table_structure_detector(scripted_tables())
            .build()
            .unwrap();
        let output = engine.parse(&DocumentSource::Pdf(b"%PDF-1.7".to_vec())).unwrap();
        assert!(output.is_complete());
        assert!(output.text().contains("Closing remarks"));
    }

    #[test]
    fn test_missing_detector_rejected() {
        let err = ReflowEngineBuilder::new(ReflowConfig::default())
            .with_text_recognizer(scripted_ocr())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("layout detector"), "unexpected: {}", err);
    }

    #[test]
    fn test_page_range_applies_to_prerendered_pages() {
        let ocr = ScriptedOcr {
            pages: vec![scripted_ocr().pages[1].clone()],
            fail_on_page: None,
        };
        let engine = ReflowEngineBuilder::new(
            ReflowConfig::new().with_zoom(ZOOM).with_page_range(1, 5),
        )
        .with_text_recognizer(ocr)
        .with_layout_detector(ScriptedLayout::default())
        .with_table_structure_detector(ScriptedTables::default())
        .build()
        .unwrap();
        let output = engine.parse(&pages()).unwrap();
        assert_eq!(output.chunks.len(), 1);
        // Tags carry page numbers within the rendered range.
        assert!(output.chunks[0].text.contains("@@1\t"), "chunk: {}", output.chunks[0].text);
    }

    #[test]
    fn test_parse_into_boxes_inserts_table() {
        let boxes = engine()
            .parse_into_boxes(&pages(), &mut Progress::silent())
            .unwrap();
        let table_at = boxes
            .iter()
            .position(|b| b.layout_type == "table")
            .expect("table box");
        assert_eq!(boxes[table_at].page, 1);
        assert!(boxes[table_at].position_tag.starts_with("@@1\t"));
        assert!(boxes[table_at].text.contains("Pears"));
        let closing = boxes
            .iter()
            .position(|b| b.text.contains("Closing remarks"))
            .expect("closing paragraph");
        assert!(table_at < closing);
        assert_eq!(boxes[closing].page, 2);
        assert_eq!(boxes[closing].positions[0].page, 2);
    }

    #[test]
    fn test_parse_many_keeps_order() {
        let engine = engine();
        let results = engine.parse_many(&[pages(), DocumentSource::Pdf(b"%PDF".to_vec()), pages()]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(
            results[0].as_ref().unwrap().text(),
            results[2].as_ref().unwrap().text()
        );
    }
}
