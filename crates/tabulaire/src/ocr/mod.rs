//! OCR engine seam and multi-pass selection.

pub mod engine;
pub mod pass;

pub use engine::{EngineOutput, OcrEngine, SegmentationMode};
pub use pass::{LayoutAnalysis, PassMetrics, layout_ocr};
