//! Column band inference.
//!
//! With a detected header, column centers come straight from the role
//! anchors (percentile-filled for missing roles). Without one, centers are
//! inferred from the global x-distribution: 1-D k-means seeded from
//! quantiles, falling back to fixed percentiles when the distribution has
//! too few distinct values. Midpoints between adjacent centers become the
//! band boundaries.
//!
//! Invariant, enforced on every path: the four bands are contiguous,
//! non-overlapping, strictly ordered, and jointly cover `(-inf, inf)`.

use super::header::HeaderDetection;
use crate::core::config::TableConfig;
use crate::types::{ColumnMethod, ColumnRole, Line};
use crate::utils::quantile;

/// Maximum k-means refinement iterations.
const KMEANS_MAX_ITER: usize = 40;
/// K-means converges once no center moves further than this, in pixels.
const KMEANS_TOLERANCE: f64 = 0.1;
/// Step forced between non-increasing boundaries, in pixels.
const BOUNDARY_MARGIN: f64 = 1.0;
/// Percentiles used to fill missing anchors and as the quantile fallback,
/// in column order.
const CENTER_QUANTILES: [f64; 4] = [0.2, 0.45, 0.7, 0.9];

/// One of four half-open x-intervals `[left, right)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnBand {
    pub left: f64,
    pub right: f64,
}

impl ColumnBand {
    pub fn contains(&self, x: f64) -> bool {
        self.left <= x && x < self.right
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }
}

/// Inferred column layout for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    /// Bands in column order: description, quantity, unit_price, line_total.
    pub bands: [ColumnBand; 4],
    pub method: ColumnMethod,
    pub warnings: Vec<String>,
}

/// Index of the band containing `x`. The last band catches any overflow.
pub fn assign_column(x: f64, bands: &[ColumnBand; 4]) -> usize {
    bands.iter().position(|b| b.contains(x)).unwrap_or(bands.len() - 1)
}

/// 1-D k-means over `values`, seeded from quantiles.
///
/// Returns the distinct values themselves when there are no more than `k`
/// of them; the caller decides whether that is enough centers.
fn kmeans_1d(values: &[f64], k: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let mut unique: Vec<f64> = values.to_vec();
    unique.sort_by(|a, b| a.partial_cmp(b).expect("x centers must not be NaN"));
    unique.dedup();
    if unique.len() <= k {
        return unique;
    }

    let mut centers: Vec<f64> = (0..k)
        .map(|i| quantile(values, (i + 1) as f64 / (k + 1) as f64))
        .collect();

    for _ in 0..KMEANS_MAX_ITER {
        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for &value in values {
            let mut best = 0;
            for (idx, &center) in centers.iter().enumerate() {
                if (value - center).abs() < (value - centers[best]).abs() {
                    best = idx;
                }
            }
            sums[best] += value;
            counts[best] += 1;
        }

        let updated: Vec<f64> = (0..k)
            .map(|idx| {
                if counts[idx] > 0 {
                    sums[idx] / counts[idx] as f64
                } else {
                    centers[idx]
                }
            })
            .collect();

        let converged = centers
            .iter()
            .zip(&updated)
            .all(|(old, new)| (old - new).abs() <= KMEANS_TOLERANCE);
        centers = updated;
        if converged {
            break;
        }
    }

    centers.sort_by(|a, b| a.partial_cmp(b).expect("centers must not be NaN"));
    centers
}

/// Force strictly increasing values by pushing laggards forward by `margin`.
fn enforce_increasing(values: &mut [f64], margin: f64) {
    for idx in 1..values.len() {
        if values[idx] <= values[idx - 1] {
            values[idx] = values[idx - 1] + margin;
        }
    }
}

fn bands_from_centers(centers: &[f64; 4], config: &TableConfig) -> ([ColumnBand; 4], Vec<String>) {
    let mut boundaries = [
        (centers[0] + centers[1]) / 2.0,
        (centers[1] + centers[2]) / 2.0,
        (centers[2] + centers[3]) / 2.0,
    ];
    enforce_increasing(&mut boundaries, BOUNDARY_MARGIN);

    let bands = [
        ColumnBand {
            left: f64::NEG_INFINITY,
            right: boundaries[0],
        },
        ColumnBand {
            left: boundaries[0],
            right: boundaries[1],
        },
        ColumnBand {
            left: boundaries[1],
            right: boundaries[2],
        },
        ColumnBand {
            left: boundaries[2],
            right: f64::INFINITY,
        },
    ];

    let mut warnings = Vec::new();
    if bands[1].width() < config.narrow_band_width || bands[2].width() < config.narrow_band_width {
        warnings.push("Column ranges may be unstable.".to_string());
    }
    (bands, warnings)
}

/// Derive the four column bands from the token x-distribution.
pub fn build_column_bands(lines: &[Line], header: Option<&HeaderDetection>, config: &TableConfig) -> ColumnLayout {
    let all_x: Vec<f64> = lines
        .iter()
        .flat_map(|line| line.tokens.iter().map(|t| t.x_center()))
        .collect();

    if all_x.is_empty() {
        // Nothing to anchor on; produce a degenerate but still valid
        // partition so the band invariant holds everywhere.
        let centers = [
            0.0,
            config.anchor_margin,
            config.anchor_margin * 2.0,
            config.anchor_margin * 3.0,
        ];
        let (bands, mut warnings) = bands_from_centers(&centers, config);
        warnings.insert(0, "No tokens available for column detection.".to_string());
        return ColumnLayout {
            bands,
            method: ColumnMethod::Fallback,
            warnings,
        };
    }

    let fill: Vec<f64> = CENTER_QUANTILES.iter().map(|&q| quantile(&all_x, q)).collect();

    let (centers, method, mut warnings) = match header {
        Some(detection) => {
            let mut ordered = [0.0f64; 4];
            for (idx, role) in ColumnRole::ALL.iter().enumerate() {
                ordered[idx] = detection.anchors.get(role).copied().unwrap_or(fill[idx]);
            }
            enforce_increasing(&mut ordered, config.anchor_margin);
            (ordered, ColumnMethod::Header, Vec::new())
        }
        None => {
            let clustered = kmeans_1d(&all_x, 4);
            let warning = "Header not found; column detection fallback used.".to_string();
            if clustered.len() < 4 {
                let mut centers = [fill[0], fill[1], fill[2], fill[3]];
                enforce_increasing(&mut centers, config.anchor_margin);
                (centers, ColumnMethod::Quantile, vec![warning])
            } else {
                (
                    [clustered[0], clustered[1], clustered[2], clustered[3]],
                    ColumnMethod::Kmeans,
                    vec![warning],
                )
            }
        }
    };

    let (bands, band_warnings) = bands_from_centers(&centers, config);
    warnings.extend(band_warnings);

    tracing::debug!(
        method = method.as_str(),
        boundaries = ?[bands[0].right, bands[1].right, bands[2].right],
        "column bands derived"
    );

    ColumnLayout { bands, method, warnings }
}
