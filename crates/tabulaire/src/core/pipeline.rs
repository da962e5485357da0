//! Document pipeline orchestration.
//!
//! Pages are independent: each runs the full normalize → multi-pass OCR →
//! reconstruct chain in its own task, and the aggregation below is a
//! deterministic, order-sensitive reduction: results are merged in page
//! index order no matter which task finishes first.
//!
//! Failure policy (see the error module): a page whose OCR fails entirely
//! only loses that page's contribution and leaves a page-scoped warning;
//! the document call fails only when there is nothing left at all.

use crate::core::config::PipelineConfig;
use crate::ocr::engine::OcrEngine;
use crate::ocr::pass::layout_ocr;
use crate::preprocess::normalize_page;
use crate::table::reconstruct_table;
use crate::types::{DocumentQuality, DocumentResult, PageQuality, Row, Token};
use crate::utils::{round3, round4};
use crate::{Result, TabulaireError};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::sync::Arc;

struct PageOutput {
    raw_text: String,
    tokens: Vec<Token>,
    rows: Vec<Row>,
    reconstructed_lines: Vec<String>,
    warnings: Vec<String>,
    quality: PageQuality,
    debug_paths: BTreeMap<String, String>,
}

async fn process_page(
    engine: Arc<dyn OcrEngine>,
    page: DynamicImage,
    page_number: u32,
    config: Arc<PipelineConfig>,
) -> Result<PageOutput> {
    let debug_dir = config
        .debug
        .as_ref()
        .map(|d| d.root_dir.join(format!("{}_page_{}", d.stem, page_number)));

    // Normalization is pure CPU work; keep it off the async runtime.
    let normalized = tokio::task::spawn_blocking(move || normalize_page(&page, debug_dir.as_deref()))
        .await
        .map_err(|e| TabulaireError::image_processing(format!("page normalization task failed: {}", e)))??;

    let layout = layout_ocr(Arc::clone(&engine), &normalized.image, &config).await?;

    let mut tokens = layout.tokens;
    for token in &mut tokens {
        token.page = page_number;
    }

    let table = reconstruct_table(&tokens, &config.table);

    let mut warnings = layout.warnings;
    warnings.extend(table.warnings);

    let reconstructed_lines = if table.reconstructed_text.is_empty() {
        Vec::new()
    } else {
        table.reconstructed_text.lines().map(str::to_string).collect()
    };

    Ok(PageOutput {
        raw_text: layout.raw_text,
        tokens,
        rows: table.rows,
        reconstructed_lines,
        warnings,
        quality: PageQuality {
            mean_conf: layout.quality.mean_conf,
            low_conf_ratio: layout.quality.low_conf_ratio,
            deskew_angle: round3(normalized.deskew_angle),
            token_count: layout.quality.token_count,
        },
        debug_paths: normalized.debug_paths,
    })
}

/// Combine per-page metrics: token-count-weighted mean for the confidence
/// metrics, simple mean for the deskew angle. An empty page list yields the
/// neutral-but-pessimistic default.
fn merge_quality(per_page: &[PageQuality]) -> DocumentQuality {
    if per_page.is_empty() {
        return DocumentQuality {
            mean_conf: 0.0,
            low_conf_ratio: 1.0,
            deskew_angle: 0.0,
            token_count: 0,
        };
    }

    let weights: Vec<f64> = per_page.iter().map(|q| q.token_count.max(1) as f64).collect();
    let total_weight: f64 = weights.iter().sum();

    let mean_conf = per_page
        .iter()
        .zip(&weights)
        .map(|(q, w)| q.mean_conf * w)
        .sum::<f64>()
        / total_weight;
    let low_conf_ratio = per_page
        .iter()
        .zip(&weights)
        .map(|(q, w)| q.low_conf_ratio * w)
        .sum::<f64>()
        / total_weight;
    let deskew_angle = per_page.iter().map(|q| q.deskew_angle).sum::<f64>() / per_page.len() as f64;

    DocumentQuality {
        mean_conf: round3(mean_conf),
        low_conf_ratio: round4(low_conf_ratio),
        deskew_angle: round3(deskew_angle),
        token_count: per_page.iter().map(|q| q.token_count).sum(),
    }
}

/// Process every page of a document and aggregate into one result.
///
/// This is the top-level entry the application layer calls per uploaded
/// document. Pages run concurrently; the merge is performed in ascending
/// page order, then ascending within-page line order, so output is
/// deterministic. Token line ids are remapped to be globally increasing
/// across pages; rows and tokens keep their originating page number.
///
/// # Errors
///
/// Fatal only when the page list is empty, the configuration is invalid, or
/// OCR failed on every page. A subset of failing pages degrades to
/// page-scoped warnings.
pub async fn process_document(
    engine: Arc<dyn OcrEngine>,
    pages: Vec<DynamicImage>,
    config: &PipelineConfig,
) -> Result<DocumentResult> {
    config.validate()?;
    if pages.is_empty() {
        return Err(TabulaireError::validation("document contains no pages"));
    }

    let config = Arc::new(config.clone());
    let mut handles = Vec::with_capacity(pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        let page_number = index as u32 + 1;
        handles.push((
            page_number,
            tokio::spawn(process_page(
                Arc::clone(&engine),
                page,
                page_number,
                Arc::clone(&config),
            )),
        ));
    }

    // Buffer completions and merge in page order, not completion order.
    let mut page_results: Vec<(u32, Result<PageOutput>)> = Vec::with_capacity(handles.len());
    for (page_number, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(TabulaireError::ocr(format!("page task failed: {}", e))),
        };
        page_results.push((page_number, result));
    }

    let total_pages = page_results.len();
    let mut failed_pages = 0usize;

    let mut raw_texts: Vec<String> = Vec::new();
    let mut all_tokens: Vec<Token> = Vec::new();
    let mut all_rows: Vec<Row> = Vec::new();
    let mut reconstructed_lines: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut per_page_quality: Vec<PageQuality> = Vec::new();
    let mut debug_image_paths: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut line_offset: u32 = 0;

    for (page_number, result) in page_results {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                failed_pages += 1;
                warnings.push(format!("page {}: {}", page_number, e));
                tracing::warn!(page = page_number, error = %e, "page processing failed");
                continue;
            }
        };

        let page_raw = output.raw_text.trim();
        if !page_raw.is_empty() {
            raw_texts.push(page_raw.to_string());
        }

        let mut page_tokens = output.tokens;
        for token in &mut page_tokens {
            token.line_id += line_offset;
        }
        if let Some(max_line) = page_tokens.iter().map(|t| t.line_id).max() {
            line_offset = line_offset.max(max_line + 1);
        }
        all_tokens.extend(page_tokens);

        all_rows.extend(output.rows);

        for line in output.reconstructed_lines {
            reconstructed_lines.push(format!("[page {}] {}", page_number, line));
        }

        for warning in output.warnings {
            warnings.push(format!("page {}: {}", page_number, warning));
        }

        if !output.debug_paths.is_empty() {
            debug_image_paths.insert(format!("page_{}", page_number), output.debug_paths);
        }

        per_page_quality.push(output.quality);
    }

    if failed_pages == total_pages {
        return Err(TabulaireError::ocr("OCR failed on every page of the document."));
    }

    if all_rows.is_empty() {
        warnings.push("Table reconstruction produced no rows; fallback to raw OCR text only.".to_string());
    }

    let raw_text = raw_texts.join("\n\n").trim().to_string();
    let mut reconstructed_text = reconstructed_lines.join("\n").trim().to_string();
    if reconstructed_text.is_empty() {
        reconstructed_text = raw_text.clone();
    }

    let quality = merge_quality(&per_page_quality);
    tracing::debug!(
        pages = total_pages,
        failed_pages,
        rows = all_rows.len(),
        tokens = all_tokens.len(),
        "document aggregated"
    );

    Ok(DocumentResult {
        raw_text,
        tokens: all_tokens,
        rows: all_rows,
        reconstructed_text,
        quality,
        warnings,
        debug_image_paths,
    })
}
