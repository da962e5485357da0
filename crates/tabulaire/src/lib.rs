//! Tabulaire - Invoice Layout & Table Reconstruction Engine
//!
//! Tabulaire turns scanned invoice pages into structured line-item tables.
//! Raw OCR output has no grid lines, inconsistent spacing and locale-ambiguous
//! numbers; this crate recovers the logical table from token geometry alone,
//! with explicit confidence metrics and warnings instead of silent guesses.
//!
//! # Pipeline
//!
//! One page flows through five stages; a document aggregates its pages:
//!
//! 1. **Normalization** (`preprocess`): contrast enhancement, denoising,
//!    deskew, sharpening, adaptive binarization.
//! 2. **Multi-pass OCR** (`ocr`): the external engine runs once per
//!    segmentation assumption; the best-scoring pass wins.
//! 3. **Line clustering** (`table::lines`): engine line ids when reliable,
//!    geometric clustering when not.
//! 4. **Column inference** (`table::header`, `table::columns`): fuzzy header
//!    keyword anchors, or k-means/quantile fallback over the x-distribution.
//! 5. **Row assembly** (`table::rows`): band assignment, OCR-artifact
//!    correction, locale-aware numeric parsing.
//! 6. **Aggregation** (`core::pipeline`): pages merged in order with global
//!    line numbering and combined quality metrics.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabulaire::{OcrEngine, PipelineConfig, process_document};
//!
//! # async fn run(engine: Arc<dyn OcrEngine>, pages: Vec<image::DynamicImage>) -> tabulaire::Result<()> {
//! let config = PipelineConfig::default();
//! let result = process_document(engine, pages, &config).await?;
//! println!("{} rows, {} warnings", result.rows.len(), result.warnings.len());
//! # Ok(())
//! # }
//! ```
//!
//! Glyph recognition itself is a collaborator: implement [`OcrEngine`] over
//! your Tesseract (or compatible) installation and hand it to the pipeline.

#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod ocr;
pub mod preprocess;
pub mod table;
pub mod types;

mod utils;

pub use crate::error::{Result, TabulaireError};
pub use crate::types::*;

pub use crate::core::config::{DebugConfig, PipelineConfig, SelectorConfig, TableConfig};
pub use crate::core::pipeline::process_document;
pub use crate::ocr::engine::{EngineOutput, OcrEngine, SegmentationMode};
pub use crate::ocr::pass::{LayoutAnalysis, PassMetrics, layout_ocr};
pub use crate::preprocess::{NormalizedPage, normalize_page};
pub use crate::table::reconstruct_table;
