//! Public data model for layout analysis and table reconstruction.
//!
//! Everything here is plain data: serde-derived, cheap to clone, and safe to
//! ship across task boundaries. Geometry follows image conventions (origin
//! top-left, y growing downward, pixel coordinates).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned bounding box in pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn x_center(&self) -> f64 {
        (self.x1 as f64 + self.x2 as f64) / 2.0
    }

    pub fn y_center(&self) -> f64 {
        (self.y1 as f64 + self.y2 as f64) / 2.0
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// One OCR-recognized text fragment.
///
/// Produced by the engine collaborator and treated as immutable afterwards.
/// `confidence` is 0..=100; engines reporting -1 for "no estimate" are
/// clamped to 0 when aggregating. `line_id` 0 means the engine did not
/// report a usable line grouping for this token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub confidence: i32,
    pub bbox: BBox,
    #[serde(default)]
    pub line_id: u32,
    #[serde(default)]
    pub page: u32,
}

impl Token {
    pub fn x_center(&self) -> f64 {
        self.bbox.x_center()
    }

    pub fn y_center(&self) -> f64 {
        self.bbox.y_center()
    }
}

/// How tokens were grouped into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    /// Engine-reported line identifiers were trusted directly.
    EngineIds,
    /// Geometric fallback: clustering by vertical token centers.
    YClustering,
}

/// Tokens grouped as one horizontal text row, ordered left-to-right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub line_id: u32,
    pub y_center: f64,
    pub bbox: BBox,
    pub tokens: Vec<Token>,
}

/// The four canonical invoice table columns, in left-to-right order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Description,
    Quantity,
    UnitPrice,
    LineTotal,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 4] = [
        ColumnRole::Description,
        ColumnRole::Quantity,
        ColumnRole::UnitPrice,
        ColumnRole::LineTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Description => "description",
            ColumnRole::Quantity => "quantity",
            ColumnRole::UnitPrice => "unit_price",
            ColumnRole::LineTotal => "line_total",
        }
    }
}

/// How the column bands were derived. Part of the observable contract:
/// callers and tests branch on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMethod {
    /// Anchored on a detected header line.
    Header,
    /// 1-D k-means over token x-centers.
    Kmeans,
    /// Fixed percentiles of the x-distribution.
    Quantile,
    /// No usable x-distribution at all.
    Fallback,
}

impl ColumnMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnMethod::Header => "header",
            ColumnMethod::Kmeans => "kmeans",
            ColumnMethod::Quantile => "quantile",
            ColumnMethod::Fallback => "fallback",
        }
    }
}

/// A token cited as evidence for one cell of a reconstructed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvidence {
    pub text: String,
    pub bbox: BBox,
    pub confidence: i32,
}

impl From<&Token> for TokenEvidence {
    fn from(token: &Token) -> Self {
        Self {
            text: token.text.clone(),
            bbox: token.bbox,
            confidence: token.confidence,
        }
    }
}

/// Provenance of a reconstructed row: the source line and the tokens that
/// were assigned to each column band. Line ids here are page-local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEvidence {
    pub line_id: u32,
    pub bbox: BBox,
    pub description: Vec<TokenEvidence>,
    pub quantity: Vec<TokenEvidence>,
    pub unit_price: Vec<TokenEvidence>,
    pub line_total: Vec<TokenEvidence>,
}

/// One reconstructed invoice line item.
///
/// Numeric fields hold the canonical rendering when parsing succeeded
/// (`"10"`, `"1234.56"`) and the corrected-but-unparsed text otherwise;
/// `None` when the column band was empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_total: Option<String>,
    pub page: u32,
    pub evidence: RowEvidence,
}

/// Output of [`crate::table::reconstruct_table`] for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReconstruction {
    pub rows: Vec<Row>,
    pub reconstructed_text: String,
    pub column_method: ColumnMethod,
    /// `None` when no tokens survived confidence filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_source: Option<LineSource>,
    pub warnings: Vec<String>,
}

/// Per-page quality metrics, carried into the document-level merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuality {
    pub mean_conf: f64,
    pub low_conf_ratio: f64,
    pub deskew_angle: f64,
    pub token_count: usize,
}

/// Document-level quality metrics: token-count-weighted means of the
/// per-page confidence metrics, simple mean of the deskew angles, total
/// token count across pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuality {
    pub mean_conf: f64,
    pub low_conf_ratio: f64,
    pub deskew_angle: f64,
    pub token_count: usize,
}

/// Aggregate result for one processed document.
///
/// Constructed once per request and never mutated afterwards; there is no
/// cross-request shared state anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Raw OCR text of all pages, blank line between pages.
    pub raw_text: String,
    /// All tokens, page-qualified, line ids remapped to be globally unique.
    pub tokens: Vec<Token>,
    /// All reconstructed rows in page order.
    pub rows: Vec<Row>,
    /// Page-prefixed table rendering; falls back to `raw_text` when no rows
    /// were reconstructed anywhere.
    pub reconstructed_text: String,
    pub quality: DocumentQuality,
    pub warnings: Vec<String>,
    /// `page_<n>` → stage name → persisted debug image path. Empty unless
    /// debug persistence was requested.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub debug_image_paths: BTreeMap<String, BTreeMap<String, String>>,
}
