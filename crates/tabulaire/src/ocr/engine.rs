//! OCR engine collaborator interface.
//!
//! Glyph recognition itself is out of scope: this crate consumes structured
//! token output from an external engine (Tesseract or compatible) through the
//! [`OcrEngine`] trait. The pipeline issues one `recognize` call per
//! configured [`SegmentationMode`] and never retries; retry policy belongs to
//! the engine implementation.

use crate::Result;
use crate::types::Token;
use async_trait::async_trait;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Layout-segmentation assumption for one OCR pass.
///
/// Values mirror Tesseract page segmentation modes so engine adapters can
/// map them 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Fully automatic page segmentation.
    Auto,
    /// Single column of text of variable sizes.
    SingleColumn,
    /// Single uniform block of text.
    SingleBlock,
    /// Sparse text in no particular order.
    SparseText,
}

impl SegmentationMode {
    /// Tesseract PSM value for this mode.
    pub fn as_psm(&self) -> u8 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SparseText => 11,
        }
    }

    pub fn from_psm(value: u8) -> std::result::Result<Self, String> {
        match value {
            3 => Ok(SegmentationMode::Auto),
            4 => Ok(SegmentationMode::SingleColumn),
            6 => Ok(SegmentationMode::SingleBlock),
            11 => Ok(SegmentationMode::SparseText),
            _ => Err(format!("Unsupported PSM value: {}", value)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::Auto => "auto",
            SegmentationMode::SingleColumn => "single_column",
            SegmentationMode::SingleBlock => "single_block",
            SegmentationMode::SparseText => "sparse_text",
        }
    }
}

impl std::fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output of one engine invocation.
///
/// `tokens` holds only entries with non-empty text; `raw_entry_count` is the
/// total number of entries the engine produced including empty ones, so the
/// selector can compute the empty-entry ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub tokens: Vec<Token>,
    pub raw_entry_count: usize,
}

/// External OCR engine seam.
///
/// Implementations must be `Send + Sync`: the pipeline shares one engine
/// across concurrently processed pages and passes. A failed call is surfaced
/// per-pass by the selector; it never aborts sibling passes.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize tokens on a binarized page under the given segmentation
    /// assumption.
    async fn recognize(&self, image: GrayImage, language: &str, mode: SegmentationMode) -> Result<EngineOutput>;
}
