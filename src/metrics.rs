//! Distribution statistics over detection areas.
//!
//! All functions are pure: the input slice is copied before sorting and the
//! same areas always produce the same record.

use serde::{Deserialize, Serialize};

/// Sample standard deviation (n - 1 denominator). Zero when `n < 2`.
pub fn desvio_padrao(areas: &[f64]) -> f64 {
    let n = areas.len();
    if n < 2 {
        return 0.0;
    }
    let mean = sum(areas.iter().copied()) / n as f64;
    let squares = sum(areas.iter().map(|a| (a - mean).powi(2)));
    (squares / (n - 1) as f64).sqrt()
}

/// Rank-weighted Gini coefficient: `Σ (2i - n - 1)·a_i / (n·Σa)` over the
/// areas sorted ascending, `i` starting at 1.
///
/// `None` when the total is zero (including no areas at all).
pub fn gini(areas: &[f64]) -> Option<f64> {
    let sorted = sorted(areas);
    let total = positive_total(&sorted)?;
    let n = sorted.len() as f64;
    let weighted = sum(
        sorted
            .iter()
            .enumerate()
            .map(|(idx, a)| (2.0 * (idx + 1) as f64 - n - 1.0) * a),
    );
    Some(weighted / (n * total))
}

/// Percentage of the total area held by the smallest `floor(n / 2)` areas.
///
/// `None` when the total is zero.
pub fn pv50(areas: &[f64]) -> Option<f64> {
    let sorted = sorted(areas);
    let total = positive_total(&sorted)?;
    let half_n = sorted.len() / 2;
    let smallest = sum(sorted[..half_n].iter().copied());
    Some(smallest / total * 100.0)
}

fn sorted(areas: &[f64]) -> Vec<f64> {
    let mut sorted = areas.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Sum starting from `+0.0`, so an empty input never yields `-0.0`.
fn sum(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, |acc, v| acc + v)
}

fn positive_total(areas: &[f64]) -> Option<f64> {
    let total = sum(areas.iter().copied());
    (total.is_finite() && total > 0.0).then_some(total)
}

/// The three area statistics carried by a [`MetricsRecord`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaDistribution {
    pub desvio_padrao: f64,
    pub gini: Option<f64>,
    pub pv50: Option<f64>,
}

impl AreaDistribution {
    pub fn summarize(areas: &[f64]) -> Self {
        Self {
            desvio_padrao: desvio_padrao(areas),
            gini: gini(areas),
            pv50: pv50(areas),
        }
    }
}

/// Detections per hectare, or 0 when no area was surveyed.
pub fn detections_per_ha(total_detections: usize, total_area_ha: f64) -> f64 {
    if total_area_ha > 0.0 {
        total_detections as f64 / total_area_ha
    } else {
        0.0
    }
}

/// Run summary written to `metrics.json`.
///
/// Field names are part of the output contract. Undefined ratios are
/// serialized as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub total_detections: usize,
    pub total_area_ha: f64,
    pub detections_per_ha: f64,
    pub desvio_padrao: f64,
    pub gini: Option<f64>,
    pub pv50: Option<f64>,
}

impl MetricsRecord {
    pub fn assemble(areas: &[f64], total_area_ha: f64) -> Self {
        let distribution = AreaDistribution::summarize(areas);
        let total_detections = areas.len();
        Self {
            total_detections,
            total_area_ha,
            detections_per_ha: detections_per_ha(total_detections, total_area_ha),
            desvio_padrao: distribution.desvio_padrao,
            gini: distribution.gini,
            pv50: distribution.pv50,
        }
    }
}
