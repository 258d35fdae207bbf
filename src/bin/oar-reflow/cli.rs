//! Subcommand implementations.

use crate::pdf::PdfRasterizer;
use crate::{Format, InputArgs};
use image::RgbImage;
use oar_reflow::core::Rasterizer;
use oar_reflow::prelude::*;
use oar_reflow::utils::crop_tagged;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Everything a run needs: the engine, the document and the rendered pages
/// used for crops.
struct Session {
    engine: ReflowEngine,
    source: DocumentSource,
    rasterizer: Option<PdfRasterizer>,
}

impl Session {
    fn open(input: &InputArgs) -> CliResult<Self> {
        let recording = RecordedDetections::from_path(&input.detections)?;

        let mut config = match &input.config {
            Some(path) => ReflowConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => ReflowConfig::new(),
        };
        if config.parallel.install_global_thread_pool()? {
            info!("Using {:?} worker threads", config.parallel.max_threads);
        }
        // Recorded coordinates are only meaningful at the recording's zoom.
        config.zoom = recording.zoom;
        if let Some(tables) = input.tables {
            config.table_output = tables.into();
        }
        if input.page_from.is_some() || input.page_to.is_some() {
            let page_from = input.page_from.unwrap_or(config.page_from);
            let page_to = input.page_to.unwrap_or(config.page_to);
            config = config.with_page_range(page_from, page_to);
        }

        let (source, rasterizer) = match &input.pdf {
            Some(path) => {
                info!("Rendering pages from {}", path.display());
                (
                    DocumentSource::Pdf(std::fs::read(path)?),
                    Some(PdfRasterizer::new(input.pdfium_dir.clone())),
                )
            }
            None => {
                // The recording starts at `page_from`; pad so the engine's page range lines up.
                let mut pages = vec![RgbImage::new(1, 1); config.page_from];
                pages.extend(recording.blank_pages());
                (DocumentSource::Pages(pages), None)
            }
        };

        let mut builder = ReflowEngineBuilder::new(config).with_detectors(ReplayAdapters::new(recording));
        if let Some(rasterizer) = &rasterizer {
            builder = builder.with_rasterizer(rasterizer.clone());
        }
        if let Some(path) = &input.scorer {
            builder = builder.with_concat_scorer(LogisticScorer::from_path(path)?);
        }

        Ok(Self {
            engine: builder.build()?,
            source,
            rasterizer,
        })
    }

    /// Pages of the processed range, numbered like the position tags.
    fn page_images(&self) -> CliResult<Vec<RgbImage>> {
        let config = self.engine.config();
        match (&self.source, &self.rasterizer) {
            (DocumentSource::Pdf(_), Some(rasterizer)) => Ok(rasterizer.rasterize(
                &self.source,
                config.zoom,
                config.page_from,
                config.page_to,
            )?),
            (DocumentSource::Pages(pages), _) => {
                let end = config.page_to.min(pages.len());
                Ok(pages.get(config.page_from..end).unwrap_or_default().to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn log_progress(fraction: f32, message: &str) -> ControlFlow<()> {
    info!(target: "progress", "{:>5.1}% {}", fraction * 100.0, message);
    ControlFlow::Continue(())
}

pub fn run_parse(input: &InputArgs, crops: Option<&Path>) -> CliResult<()> {
    let session = Session::open(input)?;

    let mut sink = log_progress;
    let mut progress = Progress::new(Some(&mut sink), None);
    let output = session.engine.parse_with_progress(&session.source, &mut progress)?;
    if !output.is_complete() {
        warn!("Reflow stopped early: {:?}", output.completion);
    }

    match input.format {
        Format::Text => {
            println!("{}", output.text());
            for visual in &output.visuals {
                println!("\n{}", visual.text());
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }

    if let Some(dir) = crops {
        write_crops(&session, &output, dir)?;
    }
    Ok(())
}

pub fn run_boxes(input: &InputArgs) -> CliResult<()> {
    let session = Session::open(input)?;

    let mut sink = log_progress;
    let mut progress = Progress::new(Some(&mut sink), None);
    let boxes = session.engine.parse_into_boxes(&session.source, &mut progress)?;
    info!("Emitting {} boxes", boxes.len());

    match input.format {
        Format::Text => {
            for b in &boxes {
                let label = if b.layout_type.is_empty() { "text" } else { &b.layout_type };
                println!("[{}] {}{}", label, b.text, b.position_tag);
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&boxes)?),
    }
    Ok(())
}

/// Saves one PNG per text chunk and per extracted visual.
fn write_crops(session: &Session, output: &ReflowOutput, dir: &Path) -> CliResult<()> {
    std::fs::create_dir_all(dir)?;
    let pages = session.page_images()?;
    let config = session.engine.config();

    let mut written = 0usize;
    for (i, chunk) in output.chunks.iter().enumerate() {
        let Some((image, _)) = crop_tagged(&pages, &chunk.positions(), config.zoom, config.page_from)
        else {
            continue;
        };
        image.save(dir.join(format!("chunk_{:04}.png", i)))?;
        written += 1;
    }
    for (i, visual) in output.visuals.iter().enumerate() {
        let Some(image) = visual.image() else {
            continue;
        };
        let kind = match visual {
            VisualChunk::Figure(_) => "figure",
            VisualChunk::Table(_) => "table",
        };
        image.save(dir.join(format!("{}_{:04}.png", kind, i)))?;
        written += 1;
    }
    info!("Wrote {} crops to {}", written, dir.display());
    Ok(())
}
