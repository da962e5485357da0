//! Grouping tokens into ordered text lines.
//!
//! Engine-reported line identifiers are reliable when the segmentation
//! assumption held, but collapse under noisy or rotated input. Two modes:
//! trust the engine ids when at least two distinct ids are present, otherwise
//! recover line structure geometrically by clustering vertical centers.

use crate::core::config::TableConfig;
use crate::types::{BBox, Line, LineSource, Token};
use crate::utils::median;
use std::collections::BTreeMap;

fn merged_bbox(tokens: &[Token]) -> BBox {
    let mut iter = tokens.iter();
    let first = iter.next().expect("line must contain at least one token");
    iter.fold(first.bbox, |acc, t| acc.union(&t.bbox))
}

fn mean_y_center(tokens: &[Token]) -> f64 {
    tokens.iter().map(Token::y_center).sum::<f64>() / tokens.len() as f64
}

/// Vertical clustering tolerance: a fraction of the median token height,
/// clamped so dense small text does not split lines and tall glyphs do not
/// merge them.
fn cluster_tolerance(tokens: &[Token], config: &TableConfig) -> f64 {
    let heights: Vec<f64> = tokens.iter().map(|t| t.bbox.height() as f64).collect();
    (median(&heights) * config.cluster_tolerance_scale)
        .floor()
        .clamp(config.cluster_tolerance_min, config.cluster_tolerance_max)
}

struct Cluster {
    line_id: u32,
    y_center: f64,
    tokens: Vec<Token>,
}

fn cluster_by_y(tokens: &[Token], config: &TableConfig) -> Vec<Line> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let tolerance = cluster_tolerance(tokens, config);

    let mut ordered: Vec<Token> = tokens.to_vec();
    ordered.sort_by(|a, b| {
        a.y_center()
            .partial_cmp(&b.y_center())
            .expect("token centers must not be NaN")
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    for token in ordered {
        let center_y = token.y_center();
        match clusters
            .iter_mut()
            .find(|c| (center_y - c.y_center).abs() <= tolerance)
        {
            Some(cluster) => {
                cluster.tokens.push(token);
                cluster.y_center = mean_y_center(&cluster.tokens);
            }
            None => clusters.push(Cluster {
                line_id: clusters.len() as u32 + 1,
                y_center: center_y,
                tokens: vec![token],
            }),
        }
    }

    let mut lines: Vec<Line> = clusters
        .into_iter()
        .map(|mut cluster| {
            cluster.tokens.sort_by_key(|t| t.bbox.x1);
            Line {
                line_id: cluster.line_id,
                y_center: mean_y_center(&cluster.tokens),
                bbox: merged_bbox(&cluster.tokens),
                tokens: cluster.tokens,
            }
        })
        .collect();
    lines.sort_by(|a, b| {
        a.y_center
            .partial_cmp(&b.y_center)
            .expect("line centers must not be NaN")
    });
    lines
}

fn group_by_engine_ids(tokens: &[Token]) -> Vec<Line> {
    let mut groups: BTreeMap<u32, Vec<Token>> = BTreeMap::new();
    for token in tokens {
        groups.entry(token.line_id).or_default().push(token.clone());
    }

    let mut lines: Vec<Line> = groups
        .into_iter()
        .map(|(line_id, mut line_tokens)| {
            line_tokens.sort_by_key(|t| t.bbox.x1);
            Line {
                line_id,
                y_center: mean_y_center(&line_tokens),
                bbox: merged_bbox(&line_tokens),
                tokens: line_tokens,
            }
        })
        .collect();
    lines.sort_by(|a, b| {
        a.y_center
            .partial_cmp(&b.y_center)
            .expect("line centers must not be NaN")
    });
    lines
}

/// Group tokens into ordered lines, tagging which strategy produced them.
///
/// Engine line ids are trusted only when at least two distinct ids exist:
/// a single id over a whole page usually means the engine collapsed the
/// layout, and geometric clustering recovers more structure.
pub fn group_tokens_into_lines(tokens: &[Token], config: &TableConfig) -> (Vec<Line>, LineSource) {
    let with_ids: Vec<Token> = tokens.iter().filter(|t| t.line_id > 0).cloned().collect();
    let distinct_ids: std::collections::BTreeSet<u32> = with_ids.iter().map(|t| t.line_id).collect();

    if !with_ids.is_empty() && distinct_ids.len() >= 2 {
        (group_by_engine_ids(&with_ids), LineSource::EngineIds)
    } else {
        (cluster_by_y(tokens, config), LineSource::YClustering)
    }
}
