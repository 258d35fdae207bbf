//! OAR-Reflow CLI
//!
//! Replays recorded OCR, layout and table detections through the reflow
//! engine and prints the reconstructed document.
//!
//! # Usage
//!
//! ```bash
//! oar-reflow parse --detections recorded.json
//! oar-reflow parse --detections recorded.json --pdf report.pdf --format json --tables verbalized
//! oar-reflow boxes --detections recorded.json --config reflow.json
//! ```

mod cli;
mod pdf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use oar_reflow::core::TableOutput;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "oar-reflow")]
#[command(author = "OAR-OCR Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Layout-aware reading-order reconstruction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct text chunks, tables and figures
    Parse {
        #[command(flatten)]
        input: InputArgs,

        /// Directory receiving one PNG per chunk and per table or figure
        #[arg(long)]
        crops: Option<PathBuf>,
    },
    /// Emit a flat list of boxes in reading order as JSON
    Boxes {
        #[command(flatten)]
        input: InputArgs,
    },
}

/// Output format of `parse`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

/// Table rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Tables {
    Html,
    Verbalized,
}

impl From<Tables> for TableOutput {
    fn from(tables: Tables) -> Self {
        match tables {
            Tables::Html => TableOutput::Html,
            Tables::Verbalized => TableOutput::Verbalized,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Recorded detector output (JSON)
    #[arg(long, env = "OAR_REFLOW_DETECTIONS")]
    pub detections: PathBuf,

    /// Source PDF; without it blank pages of the recorded sizes are used
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long, env = "OAR_REFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logistic concatenation scorer weights (JSON)
    #[arg(long, env = "OAR_REFLOW_SCORER")]
    pub scorer: Option<PathBuf>,

    /// Directory holding the PDFium shared library
    #[arg(long, env = "PDFIUM_LIB_DIR")]
    pub pdfium_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: Format,

    /// Table rendering, overriding the configuration file
    #[arg(long, value_enum)]
    pub tables: Option<Tables>,

    /// First page to process (0-based)
    #[arg(long)]
    pub page_from: Option<usize>,

    /// Page after the last page to process
    #[arg(long)]
    pub page_to: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    oar_reflow::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { input, crops } => {
            info!("Parsing with detections from {}", input.detections.display());
            cli::run_parse(&input, crops.as_deref())?;
        }
        Commands::Boxes { input } => {
            info!("Emitting boxes with detections from {}", input.detections.display());
            cli::run_boxes(&input)?;
        }
    }

    Ok(())
}
