// src/selection/dates.rs
use std::collections::HashSet;

use chrono::NaiveDate;

use crate::services::SearchResult;

/// Tuning knobs for acquisition-date selection.
#[derive(Debug, Clone)]
pub struct DateSelectorParams {
    /// Candidates above this reported cloud coverage are discarded.
    pub max_cloud_pct: f64,
    /// Minimum days between two kept acquisitions.
    pub min_interval_days: i64,
    /// Half-width of the window around a growth-stage anchor.
    pub anchor_tolerance_days: i64,
    /// Whether growth-stage anchors may override the spacing rule.
    pub growth_stage_bias: bool,
}

impl Default for DateSelectorParams {
    fn default() -> Self {
        Self {
            max_cloud_pct: 20.0,
            min_interval_days: 7,
            anchor_tolerance_days: 3,
            growth_stage_bias: true,
        }
    }
}

/// Reduce the available acquisition dates to an agriculturally relevant
/// subset.
///
/// 1. Discard candidates above the cloud threshold.
/// 2. Walk chronologically, greedily keeping a candidate only when it is at
///    least `min_interval_days` after the last kept one. The earliest
///    survivor of step 1 is therefore always kept.
/// 3. With growth-stage bias enabled, the lowest-cloud candidate within
///    tolerance of each anchor date is kept even when spacing would drop
///    it; ties go to the earlier date.
///
/// An empty candidate list yields an empty selection; no dates are ever
/// fabricated.
pub fn select_dates(
    candidates: &SearchResult,
    anchors: &[NaiveDate],
    params: &DateSelectorParams,
) -> Vec<NaiveDate> {
    let filtered: Vec<(NaiveDate, f64)> = candidates
        .iter()
        .filter(|(_, scene)| scene.cloud_pct <= params.max_cloud_pct)
        .map(|(&date, scene)| (date, scene.cloud_pct))
        .collect();
    if filtered.is_empty() {
        return Vec::new();
    }

    let anchor_winners = if params.growth_stage_bias {
        anchor_favorites(&filtered, anchors, params.anchor_tolerance_days)
    } else {
        HashSet::new()
    };

    let mut selected = Vec::new();
    let mut last_kept: Option<NaiveDate> = None;
    for &(date, _) in &filtered {
        let spaced = match last_kept {
            None => true,
            Some(last) => (date - last).num_days() >= params.min_interval_days,
        };
        if spaced || anchor_winners.contains(&date) {
            selected.push(date);
            last_kept = Some(date);
        }
    }

    tracing::info!(
        "date selection: {} candidates -> {} kept",
        candidates.len(),
        selected.len()
    );
    selected
}

/// For each anchor, the clearest candidate within tolerance.
fn anchor_favorites(
    filtered: &[(NaiveDate, f64)],
    anchors: &[NaiveDate],
    tolerance_days: i64,
) -> HashSet<NaiveDate> {
    let mut winners = HashSet::new();
    for &anchor in anchors {
        let best = filtered
            .iter()
            .filter(|(date, _)| (*date - anchor).num_days().abs() <= tolerance_days)
            .min_by(|(da, ca), (db, cb)| {
                ca.partial_cmp(cb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(da.cmp(db))
            });
        if let Some(&(date, _)) = best {
            winners.insert(date);
        }
    }
    winners
}
