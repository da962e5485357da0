//! Pipeline configuration.
//!
//! All thresholds and weights the pipeline uses live here, passed explicitly
//! into the entry points. Nothing is read from ambient process state, which
//! keeps `reconstruct_table` and `layout_ocr` pure and independently testable.
//! Configuration can be created programmatically or loaded from a TOML file.

use crate::ocr::engine::SegmentationMode;
use crate::{Result, TabulaireError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
///
/// # Example
///
/// ```rust
/// use tabulaire::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.language, "fra+eng");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Language hint handed to the OCR engine, e.g. `"fra+eng"`.
    #[serde(default = "default_language")]
    pub language: String,

    /// Layout-segmentation assumptions to try, one OCR pass each.
    /// Must contain at least one mode; two or more give the selector
    /// something to choose between.
    #[serde(default = "default_segmentation_modes")]
    pub segmentation_modes: Vec<SegmentationMode>,

    /// Pass scoring knobs.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Table reconstruction knobs.
    #[serde(default)]
    pub table: TableConfig,

    /// Debug image persistence (None = disabled). Pure side channel: never
    /// affects returned data.
    #[serde(default)]
    pub debug: Option<DebugConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            segmentation_modes: default_segmentation_modes(),
            selector: SelectorConfig::default(),
            table: TableConfig::default(),
            debug: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| TabulaireError::Validation {
                message: format!("Invalid config file '{}': {}", path.as_ref().display(), e),
                source: Some(Box::new(e)),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(TabulaireError::validation("language must not be empty"));
        }
        if self.segmentation_modes.is_empty() {
            return Err(TabulaireError::validation(
                "at least one segmentation mode is required",
            ));
        }
        self.table.validate()
    }
}

/// Scoring weights for the multi-pass OCR selector.
///
/// A pass is scored as
/// `mean_conf - empty_entry_penalty * empty_ratio - low_conf_penalty * low_conf_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Confidence below which a token counts as low-confidence.
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: i32,

    /// Weight of the empty-entry ratio in the fitness score.
    #[serde(default = "default_empty_entry_penalty")]
    pub empty_entry_penalty: f64,

    /// Weight of the low-confidence ratio in the fitness score.
    #[serde(default = "default_low_confidence_penalty")]
    pub low_confidence_penalty: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
            empty_entry_penalty: default_empty_entry_penalty(),
            low_confidence_penalty: default_low_confidence_penalty(),
        }
    }
}

/// Knobs for line clustering, column inference and row assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Tokens below this confidence never participate in reconstruction.
    #[serde(default = "default_min_token_confidence")]
    pub min_token_confidence: i32,

    /// Fraction of the median token height used as the vertical clustering
    /// tolerance before clamping.
    #[serde(default = "default_cluster_tolerance_scale")]
    pub cluster_tolerance_scale: f64,

    /// Lower clamp of the clustering tolerance, in pixels. Prevents dense
    /// small text from splitting a single visual line.
    #[serde(default = "default_cluster_tolerance_min")]
    pub cluster_tolerance_min: f64,

    /// Upper clamp of the clustering tolerance, in pixels. Prevents tall
    /// glyphs from merging distinct lines.
    #[serde(default = "default_cluster_tolerance_max")]
    pub cluster_tolerance_max: f64,

    /// Minimum spacing forced between column centers when header anchors
    /// come out non-increasing, in pixels.
    #[serde(default = "default_anchor_margin")]
    pub anchor_margin: f64,

    /// Interior band widths below this trigger the unstable-columns warning.
    #[serde(default = "default_narrow_band_width")]
    pub narrow_band_width: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_token_confidence: default_min_token_confidence(),
            cluster_tolerance_scale: default_cluster_tolerance_scale(),
            cluster_tolerance_min: default_cluster_tolerance_min(),
            cluster_tolerance_max: default_cluster_tolerance_max(),
            anchor_margin: default_anchor_margin(),
            narrow_band_width: default_narrow_band_width(),
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.min_token_confidence) {
            return Err(TabulaireError::validation(format!(
                "min_token_confidence must be in 0..=100, got {}",
                self.min_token_confidence
            )));
        }
        if self.cluster_tolerance_min > self.cluster_tolerance_max {
            return Err(TabulaireError::validation(format!(
                "cluster tolerance bounds are inverted: {} > {}",
                self.cluster_tolerance_min, self.cluster_tolerance_max
            )));
        }
        Ok(())
    }
}

/// Where to persist intermediate preprocessing images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Root directory; each page gets a `<stem>_page_<n>` subdirectory.
    pub root_dir: PathBuf,

    /// Document stem used in the per-page directory names.
    #[serde(default = "default_stem")]
    pub stem: String,
}

fn default_language() -> String {
    "fra+eng".to_string()
}

fn default_segmentation_modes() -> Vec<SegmentationMode> {
    vec![SegmentationMode::SingleBlock, SegmentationMode::SingleColumn]
}

fn default_low_confidence_threshold() -> i32 {
    50
}

fn default_empty_entry_penalty() -> f64 {
    25.0
}

fn default_low_confidence_penalty() -> f64 {
    10.0
}

fn default_min_token_confidence() -> i32 {
    35
}

fn default_cluster_tolerance_scale() -> f64 {
    0.8
}

fn default_cluster_tolerance_min() -> f64 {
    10.0
}

fn default_cluster_tolerance_max() -> f64 {
    24.0
}

fn default_anchor_margin() -> f64 {
    20.0
}

fn default_narrow_band_width() -> f64 {
    20.0
}

fn default_stem() -> String {
    "document".to_string()
}
