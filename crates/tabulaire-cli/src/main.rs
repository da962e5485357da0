//! Tabulaire command-line interface.
//!
//! Two offline entry points into the engine: `preprocess` runs the image
//! normalizer on a page scan, `reconstruct` rebuilds the line-item table
//! from an OCR token dump. Both print JSON to stdout so they compose with
//! the surrounding tooling; diagnostics go to stderr via `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tabulaire::{PipelineConfig, Token, normalize_page, reconstruct_table};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tabulaire",
    version,
    about = "Invoice layout analysis and table reconstruction"
)]
struct Cli {
    /// Pipeline configuration TOML file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize a scanned page into an OCR-ready binary image
    Preprocess {
        /// Input page image (PNG/JPEG)
        input: PathBuf,

        /// Where to write the binarized image
        #[arg(short, long)]
        output: PathBuf,

        /// Persist intermediate stage images under this directory
        #[arg(long)]
        debug_dir: Option<PathBuf>,
    },

    /// Reconstruct the line-item table from an OCR token dump
    Reconstruct {
        /// JSON file holding an array of tokens
        tokens: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_preprocess(input: &PathBuf, output: &PathBuf, debug_dir: Option<&PathBuf>) -> Result<()> {
    let page = image::open(input).with_context(|| format!("failed to open image {}", input.display()))?;

    let normalized = normalize_page(&page, debug_dir.map(|d| d.as_path()))?;
    normalized
        .image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(deskew_angle = normalized.deskew_angle, "page normalized");
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "output": output.display().to_string(),
            "deskew_angle": normalized.deskew_angle,
            "debug_image_paths": normalized.debug_paths,
        }))?
    );
    Ok(())
}

fn run_reconstruct(tokens_path: &PathBuf, config: &PipelineConfig, pretty: bool) -> Result<()> {
    let content = std::fs::read_to_string(tokens_path)
        .with_context(|| format!("failed to read {}", tokens_path.display()))?;
    let tokens: Vec<Token> =
        serde_json::from_str(&content).with_context(|| format!("invalid token dump {}", tokens_path.display()))?;

    let result = reconstruct_table(&tokens, &config.table);
    for warning in &result.warnings {
        tracing::warn!("{}", warning);
    }

    let rendered = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", rendered);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Command::Preprocess {
            input,
            output,
            debug_dir,
        } => run_preprocess(input, output, debug_dir.as_ref()),
        Command::Reconstruct { tokens, pretty } => run_reconstruct(tokens, &config, *pretty),
    }
}
