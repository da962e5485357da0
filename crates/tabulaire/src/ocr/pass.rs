//! Multi-pass OCR selection.
//!
//! The engine is invoked once per configured segmentation mode; each pass is
//! scored on its own token statistics and the best-scoring pass wins. Passes
//! are independent, so they run as one task each with a synchronous reduce
//! over the completed results; completion order never affects the outcome.
//!
//! A failing pass is recorded as a skipped candidate with a warning and does
//! not abort its siblings; only the loss of every pass is fatal.

use crate::core::config::{PipelineConfig, SelectorConfig};
use crate::ocr::engine::{EngineOutput, OcrEngine, SegmentationMode};
use crate::types::Token;
use crate::utils::{round3, round4};
use crate::{Result, TabulaireError};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Quality metrics of one OCR pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassMetrics {
    pub mode: SegmentationMode,
    /// Mean confidence over tokens, engine "-1" entries counted as 0.
    pub mean_conf: f64,
    /// Fraction of tokens below the low-confidence threshold.
    pub low_conf_ratio: f64,
    /// Fraction of raw engine entries that carried no text.
    pub empty_ratio: f64,
    pub token_count: usize,
    /// `mean_conf - empty_penalty * empty_ratio - low_penalty * low_conf_ratio`.
    pub score: f64,
}

/// Result of the multi-pass layout OCR for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutAnalysis {
    /// Line-ordered text of the selected pass.
    pub raw_text: String,
    /// Tokens of the selected pass, verbatim.
    pub tokens: Vec<Token>,
    /// Index into `candidates` of the selected pass.
    pub selected_index: usize,
    /// Metrics of the selected pass.
    pub quality: PassMetrics,
    /// Metrics of every completed pass, in configuration order.
    pub candidates: Vec<PassMetrics>,
    pub warnings: Vec<String>,
}

struct PassOutcome {
    tokens: Vec<Token>,
    raw_text: String,
    metrics: PassMetrics,
    /// Unrounded score used for selection.
    raw_score: f64,
}

/// Render tokens as plain text: one line per line id, tokens in x order.
fn build_raw_text(tokens: &[Token]) -> String {
    let mut by_line: BTreeMap<u32, Vec<&Token>> = BTreeMap::new();
    for token in tokens {
        by_line.entry(token.line_id).or_default().push(token);
    }

    let mut lines = Vec::new();
    for line_tokens in by_line.values_mut() {
        line_tokens.sort_by_key(|t| t.bbox.x1);
        let text = line_tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let text = text.trim();
        if !text.is_empty() {
            lines.push(text.to_string());
        }
    }
    lines.join("\n")
}

fn evaluate_pass(mode: SegmentationMode, output: EngineOutput, selector: &SelectorConfig) -> PassOutcome {
    let EngineOutput {
        mut tokens,
        raw_entry_count,
    } = output;
    // Engines are expected to emit only non-empty tokens; anything else
    // counts toward the empty-entry ratio instead.
    tokens.retain(|t| !t.text.trim().is_empty());
    tokens.sort_by_key(|t| (t.bbox.y1, t.bbox.x1));

    let confidences: Vec<i32> = tokens.iter().map(|t| t.confidence.max(0)).collect();
    let (mean_conf, low_conf_ratio) = if confidences.is_empty() {
        (0.0, 1.0)
    } else {
        let sum: i64 = confidences.iter().map(|&c| c as i64).sum();
        let low = confidences
            .iter()
            .filter(|&&c| c < selector.low_confidence_threshold)
            .count();
        (
            sum as f64 / confidences.len() as f64,
            low as f64 / confidences.len() as f64,
        )
    };

    let empty_entries = raw_entry_count.saturating_sub(tokens.len());
    let empty_ratio = empty_entries as f64 / raw_entry_count.max(1) as f64;

    let raw_score =
        mean_conf - selector.empty_entry_penalty * empty_ratio - selector.low_confidence_penalty * low_conf_ratio;

    let raw_text = build_raw_text(&tokens);
    let token_count = tokens.len();

    PassOutcome {
        tokens,
        raw_text,
        metrics: PassMetrics {
            mode,
            mean_conf: round3(mean_conf),
            low_conf_ratio: round4(low_conf_ratio),
            empty_ratio: round4(empty_ratio),
            token_count,
            score: round3(raw_score),
        },
        raw_score,
    }
}

/// Run one OCR pass per configured segmentation mode and keep the best.
///
/// Passes run concurrently (one task each); results are reduced in
/// configuration order, so the returned `candidates` list and tie-breaking
/// are deterministic regardless of completion order.
///
/// # Errors
///
/// Returns an error only when every pass fails. A single failing pass is
/// downgraded to a warning.
pub async fn layout_ocr(
    engine: Arc<dyn OcrEngine>,
    image: &GrayImage,
    config: &PipelineConfig,
) -> Result<LayoutAnalysis> {
    let mut handles = Vec::with_capacity(config.segmentation_modes.len());
    for &mode in &config.segmentation_modes {
        let engine = Arc::clone(&engine);
        let image = image.clone();
        let language = config.language.clone();
        handles.push((
            mode,
            tokio::spawn(async move { engine.recognize(image, &language, mode).await }),
        ));
    }

    let mut warnings = Vec::new();
    let mut outcomes = Vec::new();
    for (mode, handle) in handles {
        match handle.await {
            Ok(Ok(output)) => outcomes.push(evaluate_pass(mode, output, &config.selector)),
            Ok(Err(e)) => warnings.push(format!("OCR pass {} failed: {}", mode, e)),
            Err(e) => warnings.push(format!("OCR pass {} failed: {}", mode, e)),
        }
    }

    if outcomes.is_empty() {
        return Err(TabulaireError::ocr("All OCR layout passes failed."));
    }

    let mut selected_index = 0;
    for (index, outcome) in outcomes.iter().enumerate() {
        if outcome.raw_score > outcomes[selected_index].raw_score {
            selected_index = index;
        }
    }

    let candidates: Vec<PassMetrics> = outcomes.iter().map(|o| o.metrics.clone()).collect();
    tracing::debug!(
        selected = %candidates[selected_index].mode,
        score = candidates[selected_index].score,
        candidates = candidates.len(),
        "layout pass selected"
    );

    let selected = outcomes.swap_remove(selected_index);
    Ok(LayoutAnalysis {
        raw_text: selected.raw_text,
        tokens: selected.tokens,
        selected_index,
        quality: selected.metrics,
        candidates,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;
    use async_trait::async_trait;

    fn tok(text: &str, confidence: i32, x1: i32, y1: i32, line_id: u32) -> Token {
        Token {
            text: text.to_string(),
            confidence,
            bbox: BBox::new(x1, y1, x1 + 40, y1 + 16),
            line_id,
            page: 0,
        }
    }

    #[test]
    fn test_evaluate_pass_metrics() {
        let output = EngineOutput {
            tokens: vec![tok("a", 90, 0, 0, 1), tok("b", 40, 50, 0, 1)],
            raw_entry_count: 4,
        };
        let outcome = evaluate_pass(SegmentationMode::SingleBlock, output, &SelectorConfig::default());
        let m = &outcome.metrics;
        assert_eq!(m.mean_conf, 65.0);
        assert_eq!(m.low_conf_ratio, 0.5);
        assert_eq!(m.empty_ratio, 0.5);
        assert_eq!(m.token_count, 2);
        // 65 - 25 * 0.5 - 10 * 0.5
        assert_eq!(m.score, 47.5);
    }

    #[test]
    fn test_evaluate_pass_no_tokens() {
        let output = EngineOutput {
            tokens: vec![],
            raw_entry_count: 3,
        };
        let outcome = evaluate_pass(SegmentationMode::SingleColumn, output, &SelectorConfig::default());
        assert_eq!(outcome.metrics.mean_conf, 0.0);
        assert_eq!(outcome.metrics.low_conf_ratio, 1.0);
        assert_eq!(outcome.metrics.empty_ratio, 1.0);
        assert_eq!(outcome.metrics.score, -35.0);
    }

    #[test]
    fn test_evaluate_pass_negative_confidence_counts_as_zero() {
        let output = EngineOutput {
            tokens: vec![tok("a", -1, 0, 0, 1), tok("b", 100, 50, 0, 1)],
            raw_entry_count: 2,
        };
        let outcome = evaluate_pass(SegmentationMode::SingleBlock, output, &SelectorConfig::default());
        assert_eq!(outcome.metrics.mean_conf, 50.0);
    }

    #[test]
    fn test_build_raw_text_orders_lines_and_tokens() {
        let tokens = vec![
            tok("monde", 90, 60, 30, 2),
            tok("Bonjour", 90, 0, 30, 2),
            tok("Facture", 90, 0, 0, 1),
        ];
        assert_eq!(build_raw_text(&tokens), "Facture\nBonjour monde");
    }

    struct ScriptedEngine;

    #[async_trait]
    impl OcrEngine for ScriptedEngine {
        async fn recognize(
            &self,
            _image: GrayImage,
            _language: &str,
            mode: SegmentationMode,
        ) -> Result<EngineOutput> {
            // SingleBlock reads cleanly, SingleColumn comes back noisy.
            match mode {
                SegmentationMode::SingleBlock => Ok(EngineOutput {
                    tokens: vec![tok("Article", 95, 0, 0, 1), tok("12.50", 92, 80, 0, 1)],
                    raw_entry_count: 2,
                }),
                _ => Ok(EngineOutput {
                    tokens: vec![tok("Art1cle", 30, 0, 0, 1)],
                    raw_entry_count: 4,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_layout_ocr_selects_best_pass() {
        let engine: Arc<dyn OcrEngine> = Arc::new(ScriptedEngine);
        let image = GrayImage::new(10, 10);
        let config = PipelineConfig::default();

        let analysis = layout_ocr(engine, &image, &config).await.unwrap();
        assert_eq!(analysis.quality.mode, SegmentationMode::SingleBlock);
        assert_eq!(analysis.selected_index, 0);
        assert_eq!(analysis.candidates.len(), 2);
        assert_eq!(analysis.tokens.len(), 2);
        assert_eq!(analysis.raw_text, "Article 12.50");
        assert!(analysis.warnings.is_empty());
    }

    struct HalfFailingEngine;

    #[async_trait]
    impl OcrEngine for HalfFailingEngine {
        async fn recognize(
            &self,
            _image: GrayImage,
            _language: &str,
            mode: SegmentationMode,
        ) -> Result<EngineOutput> {
            match mode {
                SegmentationMode::SingleColumn => Err(TabulaireError::ocr("engine crashed")),
                _ => Ok(EngineOutput {
                    tokens: vec![tok("Total", 88, 0, 0, 1)],
                    raw_entry_count: 1,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_layout_ocr_pass_failure_is_a_warning() {
        let engine: Arc<dyn OcrEngine> = Arc::new(HalfFailingEngine);
        let image = GrayImage::new(10, 10);
        let config = PipelineConfig::default();

        let analysis = layout_ocr(engine, &image, &config).await.unwrap();
        assert_eq!(analysis.candidates.len(), 1);
        assert_eq!(analysis.tokens.len(), 1);
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].contains("single_column"));
        assert!(analysis.warnings[0].contains("failed"));
    }

    struct BrokenEngine;

    #[async_trait]
    impl OcrEngine for BrokenEngine {
        async fn recognize(
            &self,
            _image: GrayImage,
            _language: &str,
            _mode: SegmentationMode,
        ) -> Result<EngineOutput> {
            Err(TabulaireError::ocr("engine unavailable"))
        }
    }

    #[tokio::test]
    async fn test_layout_ocr_all_passes_failing_is_fatal() {
        let engine: Arc<dyn OcrEngine> = Arc::new(BrokenEngine);
        let image = GrayImage::new(10, 10);
        let config = PipelineConfig::default();

        let result = layout_ocr(engine, &image, &config).await;
        assert!(matches!(result, Err(TabulaireError::Ocr { .. })));
    }

    #[tokio::test]
    async fn test_layout_ocr_tie_keeps_first_mode() {
        struct TiedEngine;

        #[async_trait]
        impl OcrEngine for TiedEngine {
            async fn recognize(
                &self,
                _image: GrayImage,
                _language: &str,
                _mode: SegmentationMode,
            ) -> Result<EngineOutput> {
                Ok(EngineOutput {
                    tokens: vec![tok("same", 80, 0, 0, 1)],
                    raw_entry_count: 1,
                })
            }
        }

        let engine: Arc<dyn OcrEngine> = Arc::new(TiedEngine);
        let image = GrayImage::new(10, 10);
        let config = PipelineConfig::default();

        let analysis = layout_ocr(engine, &image, &config).await.unwrap();
        assert_eq!(analysis.selected_index, 0);
        assert_eq!(analysis.quality.mode, config.segmentation_modes[0]);
    }
}
