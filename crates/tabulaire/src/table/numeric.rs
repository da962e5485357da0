//! OCR-tolerant numeric parsing.
//!
//! Scanned invoices mangle digits in predictable ways: `0` reads as `O`,
//! `1` as `l`, `I` or `|`. Corrections are applied conservatively (letter
//! substitutions only when the text already looks numeric) so descriptions
//! passing through by accident are not rewritten. Locale ambiguity
//! (`1.234,56` vs `1,234.56`) is resolved by position: whichever separator
//! appears last is the decimal point.

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("digit pattern is valid"));
static DIGIT_DOMINANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9Iil|.,\- ]+$").expect("digit-dominant pattern is valid"));
static ONE_LOOKALIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Iil|]").expect("lookalike pattern is valid"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static SIGNED_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("integer pattern is valid"));

/// Repair common OCR digit artifacts.
///
/// `O`→`0` applies whenever the text already contains a digit. The
/// `1`-lookalike substitutions apply in quantity mode unconditionally, and
/// otherwise only when the whole text is digit-dominant.
pub fn correct_numeric_artifacts(text: &str, quantity_mode: bool) -> String {
    let mut value = text.trim().to_string();
    if value.is_empty() {
        return value;
    }
    if DIGIT_RE.is_match(&value) {
        value = value.replace('O', "0").replace('o', "0");
    }
    if quantity_mode || DIGIT_DOMINANT_RE.is_match(&value) {
        value = ONE_LOOKALIKE_RE.replace_all(&value, "1").into_owned();
    }
    WHITESPACE_RE.replace_all(&value, " ").trim().to_string()
}

/// Parse a quantity cell: correct artifacts, extract the first signed
/// integer, re-render canonically (`"010"` → `"10"`). Returns the corrected
/// text unchanged when no integer is found or it overflows.
pub fn parse_quantity(raw: &str) -> String {
    let cleaned = correct_numeric_artifacts(raw, true);
    let compact: String = cleaned.chars().filter(|c| *c != ' ').collect();
    match SIGNED_INT_RE.find(&compact) {
        Some(found) => found
            .as_str()
            .parse::<i64>()
            .map(|v| v.to_string())
            .unwrap_or(cleaned),
        None => cleaned,
    }
}

/// Parse a money cell: correct artifacts, strip currency decoration,
/// disambiguate decimal vs thousands separators, re-render with exactly two
/// fractional digits. Returns the corrected text when parsing fails rather
/// than dropping the value.
pub fn parse_money(raw: &str) -> String {
    let cleaned = correct_numeric_artifacts(raw, false);
    if cleaned.is_empty() {
        return cleaned;
    }

    let number: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if number.is_empty() {
        return cleaned;
    }

    let has_comma = number.contains(',');
    let has_dot = number.contains('.');
    let normalized = if has_comma && !has_dot {
        number.replace(',', ".")
    } else if has_comma && has_dot {
        if number.rfind(',') > number.rfind('.') {
            // European style: dot groups thousands, comma is decimal.
            number.replace('.', "").replace(',', ".")
        } else {
            number.replace(',', "")
        }
    } else if number.matches('.').count() > 1 {
        // Only dots: all but the last are thousands separators.
        let last = number.rfind('.').expect("dot count checked above");
        let (head, tail) = number.split_at(last);
        format!("{}{}", head.replace('.', ""), tail)
    } else {
        number
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => format!("{:.2}", value),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_o_for_zero() {
        assert_eq!(parse_quantity("O1O"), "10");
    }

    #[test]
    fn test_quantity_l_for_one() {
        assert_eq!(parse_quantity("l2"), "12");
        assert_eq!(parse_quantity("|2"), "12");
        assert_eq!(parse_quantity("I"), "1");
    }

    #[test]
    fn test_quantity_strips_leading_zeros() {
        assert_eq!(parse_quantity("010"), "10");
        assert_eq!(parse_quantity("0"), "0");
    }

    #[test]
    fn test_quantity_negative() {
        assert_eq!(parse_quantity("-3"), "-3");
    }

    #[test]
    fn test_quantity_extracts_first_integer() {
        assert_eq!(parse_quantity("x 12 pcs"), "12");
    }

    #[test]
    fn test_quantity_non_numeric_kept() {
        assert_eq!(parse_quantity("N/A"), "N/A");
        assert_eq!(parse_quantity(""), "");
    }

    #[test]
    fn test_money_european_thousands() {
        assert_eq!(parse_money("1.234,56"), "1234.56");
    }

    #[test]
    fn test_money_english_thousands() {
        assert_eq!(parse_money("1,234.56"), "1234.56");
    }

    #[test]
    fn test_money_comma_decimal() {
        assert_eq!(parse_money("12,5"), "12.50");
    }

    #[test]
    fn test_money_plain_dot() {
        assert_eq!(parse_money("45.9"), "45.90");
        assert_eq!(parse_money("45"), "45.00");
    }

    #[test]
    fn test_money_multiple_dots() {
        assert_eq!(parse_money("1.234.56"), "1234.56");
    }

    #[test]
    fn test_money_currency_decoration_stripped() {
        assert_eq!(parse_money("45,00 €"), "45.00");
        assert_eq!(parse_money("EUR 1 200,00"), "1200.00");
    }

    #[test]
    fn test_money_ocr_artifacts() {
        // Digit-dominant text gets the lookalike repair: "l2,5O" -> "12,50".
        assert_eq!(parse_money("l2,5O"), "12.50");
    }

    #[test]
    fn test_money_unparseable_kept_corrected() {
        assert_eq!(parse_money("Gratuit"), "Gratuit");
        // Two commas cannot be disambiguated; corrected text survives.
        assert_eq!(parse_money("1,2,3"), "1,2,3");
        assert_eq!(parse_money(""), "");
    }

    #[test]
    fn test_money_negative() {
        assert_eq!(parse_money("-12,50"), "-12.50");
    }

    #[test]
    fn test_correction_requires_digits_for_o_substitution() {
        // No digit anywhere: "O" stays a letter.
        assert_eq!(correct_numeric_artifacts("Option", false), "Option");
        // A digit nearby flips the interpretation.
        assert_eq!(correct_numeric_artifacts("O5", false), "05");
    }

    #[test]
    fn test_correction_lookalikes_only_when_digit_dominant() {
        assert_eq!(correct_numeric_artifacts("Installation", false), "Installation");
        assert_eq!(correct_numeric_artifacts("l2", false), "12");
    }

    #[test]
    fn test_correction_collapses_whitespace() {
        assert_eq!(correct_numeric_artifacts("  1   200  ", false), "1 200");
    }
}
