//! Header line detection.
//!
//! Invoice tables announce their columns with a header line ("Désignation",
//! "Qté", "Prix unitaire", "Montant"...). Matching is fuzzy: token text is
//! NFKD-decomposed, stripped to ASCII, lowercased and de-spaced before a
//! substring test against the per-role keyword sets, which covers accents,
//! OCR-mangled spacing and trailing punctuation.
//!
//! Known false-negative source, kept on purpose: a *data* row whose
//! description contains a role keyword (e.g. "Total station rental") also
//! matches and is later rejected by the row assembler. Loosening the match
//! here trades that for missed headers, which cost more.

use crate::types::{ColumnRole, Line};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

const DESCRIPTION_KEYWORDS: [&str; 4] = ["description", "designation", "libelle", "article"];
const QUANTITY_KEYWORDS: [&str; 4] = ["quantite", "qte", "qty", "quant"];
const UNIT_PRICE_KEYWORDS: [&str; 4] = ["prix", "pu", "unitaire", "unit"];
const LINE_TOTAL_KEYWORDS: [&str; 3] = ["total", "montant", "ttc"];

/// Minimum distinct role anchors a line needs to count as the header.
const MIN_ROLE_HITS: usize = 2;

/// NFKD-decompose, drop non-ASCII (accents become combining marks and
/// disappear), lowercase, strip all whitespace.
pub fn normalize_for_match(text: &str) -> String {
    text.nfkd()
        .filter(|c| c.is_ascii() && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Match a token (or concatenated cell) against the canonical column roles.
/// Roles are tested in column order; the first hit wins.
pub fn match_header_role(text: &str) -> Option<ColumnRole> {
    let value = normalize_for_match(text);
    if value.is_empty() {
        return None;
    }
    if DESCRIPTION_KEYWORDS.iter().any(|k| value.contains(k)) {
        return Some(ColumnRole::Description);
    }
    if QUANTITY_KEYWORDS.iter().any(|k| value.contains(k)) {
        return Some(ColumnRole::Quantity);
    }
    if UNIT_PRICE_KEYWORDS.iter().any(|k| value.contains(k)) {
        return Some(ColumnRole::UnitPrice);
    }
    if LINE_TOTAL_KEYWORDS.iter().any(|k| value.contains(k)) {
        return Some(ColumnRole::LineTotal);
    }
    None
}

/// A detected header line and its per-role anchor x-centers.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderDetection {
    /// Index of the header line in the input line list.
    pub line_index: usize,
    /// First matching token's x-center per role.
    pub anchors: BTreeMap<ColumnRole, f64>,
}

/// Find the line with the most distinct role anchors (minimum 2).
///
/// One anchor per role per line: the first matching token wins, so a header
/// like "Prix unitaire" anchors `unit_price` at "Prix" and the trailing
/// "unitaire" token is ignored.
pub fn detect_header(lines: &[Line]) -> Option<HeaderDetection> {
    let mut best: Option<HeaderDetection> = None;
    let mut best_hits = 0;

    for (index, line) in lines.iter().enumerate() {
        let mut anchors: BTreeMap<ColumnRole, f64> = BTreeMap::new();
        for token in &line.tokens {
            let Some(role) = match_header_role(&token.text) else {
                continue;
            };
            anchors.entry(role).or_insert_with(|| token.x_center());
        }
        if anchors.len() > best_hits {
            best_hits = anchors.len();
            best = Some(HeaderDetection {
                line_index: index,
                anchors,
            });
        }
    }

    if best_hits < MIN_ROLE_HITS { None } else { best }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BBox, Token};

    fn tok(text: &str, x1: i32) -> Token {
        Token {
            text: text.to_string(),
            confidence: 90,
            bbox: BBox::new(x1, 0, x1 + 60, 16),
            line_id: 1,
            page: 0,
        }
    }

    fn line(tokens: Vec<Token>) -> Line {
        let bbox = tokens.iter().skip(1).fold(tokens[0].bbox, |acc, t| acc.union(&t.bbox));
        Line {
            line_id: 1,
            y_center: 8.0,
            bbox,
            tokens,
        }
    }

    #[test]
    fn test_normalize_strips_accents_and_whitespace() {
        assert_eq!(normalize_for_match("Qté :"), "qte:");
        assert_eq!(normalize_for_match("Désignation"), "designation");
        assert_eq!(normalize_for_match("  PRIX  Unitaire "), "prixunitaire");
        assert_eq!(normalize_for_match(""), "");
    }

    #[test]
    fn test_match_header_role() {
        assert_eq!(match_header_role("Désignation"), Some(ColumnRole::Description));
        assert_eq!(match_header_role("Qté"), Some(ColumnRole::Quantity));
        assert_eq!(match_header_role("P.U."), Some(ColumnRole::UnitPrice));
        assert_eq!(match_header_role("Montant TTC"), Some(ColumnRole::LineTotal));
        assert_eq!(match_header_role("Clavier mécanique"), None);
        assert_eq!(match_header_role(""), None);
    }

    #[test]
    fn test_match_is_substring_based() {
        // OCR often glues punctuation onto header cells.
        assert_eq!(match_header_role("Quantité:"), Some(ColumnRole::Quantity));
        assert_eq!(match_header_role("[Article]"), Some(ColumnRole::Description));
    }

    #[test]
    fn test_role_order_breaks_ambiguity() {
        // "Article" is checked before "total": description wins.
        assert_eq!(match_header_role("Article total"), Some(ColumnRole::Description));
    }

    #[test]
    fn test_detect_header_full_line() {
        let lines = vec![
            line(vec![tok("Facture", 0), tok("2024-117", 200)]),
            line(vec![
                tok("Description", 0),
                tok("Qté", 300),
                tok("Prix", 450),
                tok("Total", 600),
            ]),
        ];
        let header = detect_header(&lines).unwrap();
        assert_eq!(header.line_index, 1);
        assert_eq!(header.anchors.len(), 4);
        assert_eq!(header.anchors[&ColumnRole::Description], 30.0);
        assert_eq!(header.anchors[&ColumnRole::Quantity], 330.0);
        assert_eq!(header.anchors[&ColumnRole::UnitPrice], 480.0);
        assert_eq!(header.anchors[&ColumnRole::LineTotal], 630.0);
    }

    #[test]
    fn test_detect_header_requires_two_roles() {
        let lines = vec![line(vec![tok("Total", 600), tok("Clavier", 0)])];
        assert!(detect_header(&lines).is_none());
    }

    #[test]
    fn test_detect_header_first_match_wins_per_role() {
        let lines = vec![line(vec![
            tok("Prix", 400),
            tok("unitaire", 470),
            tok("Qté", 300),
        ])];
        let header = detect_header(&lines).unwrap();
        // "unitaire" also matches unit_price but "Prix" anchored it first.
        assert_eq!(header.anchors[&ColumnRole::UnitPrice], 430.0);
    }

    #[test]
    fn test_detect_header_prefers_line_with_most_roles() {
        let lines = vec![
            line(vec![tok("Qté", 300), tok("Total", 600)]),
            line(vec![
                tok("Description", 0),
                tok("Qté", 300),
                tok("Prix", 450),
                tok("Total", 600),
            ]),
        ];
        assert_eq!(detect_header(&lines).unwrap().line_index, 1);
    }

    #[test]
    fn test_detect_header_no_lines() {
        assert!(detect_header(&[]).is_none());
    }
}
