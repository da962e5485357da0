//! Table reconstruction: OCR tokens in, structured line items out.
//!
//! No grid lines, no ground-truth layout, only token geometry. The stages
//! are deliberately simple and each tags its decisions (`LineSource`,
//! `ColumnMethod`) so callers can see which heuristic path produced a
//! result. Everything here is pure and synchronous: identical token input
//! yields identical output.

pub mod columns;
pub mod header;
pub mod lines;
pub mod numeric;
mod rows;

pub use columns::{ColumnBand, ColumnLayout, build_column_bands};
pub use header::{HeaderDetection, detect_header};
pub use lines::group_tokens_into_lines;

use crate::core::config::TableConfig;
use crate::types::{ColumnMethod, Row, TableReconstruction, Token};

fn render_row(row: &Row) -> String {
    format!(
        "LIGNE: {} | qty={} | unit={} | total={}",
        row.description,
        row.quantity.as_deref().unwrap_or("?"),
        row.unit_price.as_deref().unwrap_or("?"),
        row.line_total.as_deref().unwrap_or("?"),
    )
}

/// Reconstruct the line-item table from one page's tokens.
///
/// Best-effort by design: when the header is missing or the columns are
/// unstable the result is still produced, with the uncertainty recorded in
/// `warnings` and the inference path in `column_method` / `line_source`.
pub fn reconstruct_table(tokens: &[Token], config: &TableConfig) -> TableReconstruction {
    let filtered: Vec<Token> = tokens
        .iter()
        .filter(|t| !t.text.trim().is_empty() && t.confidence >= config.min_token_confidence)
        .cloned()
        .collect();

    if filtered.is_empty() {
        return TableReconstruction {
            rows: Vec::new(),
            reconstructed_text: String::new(),
            column_method: ColumnMethod::Fallback,
            line_source: None,
            warnings: vec!["No reliable tokens after confidence filtering.".to_string()],
        };
    }

    let mut warnings = Vec::new();

    let (lines, line_source) = group_tokens_into_lines(&filtered, config);

    let header = detect_header(&lines);
    if header.is_none() {
        warnings.push("Table header not found.".to_string());
    }

    let layout = build_column_bands(&lines, header.as_ref(), config);
    warnings.extend(layout.warnings.clone());

    let data_lines = match &header {
        Some(detection) => &lines[detection.line_index + 1..],
        None => &lines[..],
    };

    let mut table_rows: Vec<Row> = Vec::new();
    for line in data_lines {
        let Some(row) = rows::line_to_row(line, &layout.bands) else {
            continue;
        };
        // Rows carrying only a quantity are noise, not line items.
        if row.description.is_empty() && row.unit_price.is_none() && row.line_total.is_none() {
            continue;
        }
        table_rows.push(row);
    }

    if table_rows.len() < 2 {
        warnings.push("Less than two table rows detected.".to_string());
    }

    let reconstructed_text = table_rows.iter().map(render_row).collect::<Vec<_>>().join("\n");

    tracing::debug!(
        lines = lines.len(),
        rows = table_rows.len(),
        method = layout.method.as_str(),
        header_found = header.is_some(),
        "table reconstructed"
    );

    TableReconstruction {
        rows: table_rows,
        reconstructed_text,
        column_method: layout.method,
        line_source: Some(line_source),
        warnings,
    }
}
