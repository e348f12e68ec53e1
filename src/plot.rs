// src/plot.rs
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Days the availability search extends beyond the growing season on each
/// side, so acquisitions right at planting/harvest are not missed.
pub const SEASON_MARGIN_DAYS: i64 = 7;

/// Growth stages worth anchoring acquisitions to, as day offsets from the
/// planting date: germination, early/mid vegetative, reproductive, maturity.
pub const GROWTH_STAGE_OFFSETS: [i64; 5] = [14, 30, 60, 90, 120];

/// A georeferenced agricultural plot with its growing season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotDescriptor {
    pub id: String,
    /// Closed polygon ring of (lon, lat) pairs; first point equals last.
    pub ring: Vec<(f64, f64)>,
    pub planting: NaiveDate,
    pub harvest: NaiveDate,
}

impl PlotDescriptor {
    /// Enforce the structural invariants: at least 4 ring points, closed
    /// ring, harvest not before planting.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ring.len() < 4 {
            return Err(PipelineError::DataFormat(format!(
                "plot {}: polygon ring has {} points, need at least 4",
                self.id,
                self.ring.len()
            )));
        }
        let first = self.ring[0];
        let last = self.ring[self.ring.len() - 1];
        let dist = ((first.0 - last.0).powi(2) + (first.1 - last.1).powi(2)).sqrt();
        if dist > 1e-10 {
            return Err(PipelineError::DataFormat(format!(
                "plot {}: polygon ring is not closed",
                self.id
            )));
        }
        if self.harvest < self.planting {
            return Err(PipelineError::DataFormat(format!(
                "plot {}: harvest {} precedes planting {}",
                self.id, self.harvest, self.planting
            )));
        }
        Ok(())
    }

    /// Ring with a guaranteed closing point, for request payloads.
    pub fn closed_ring(&self) -> Vec<(f64, f64)> {
        let mut ring = self.ring.clone();
        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            let dist = ((first.0 - last.0).powi(2) + (first.1 - last.1).powi(2)).sqrt();
            if dist > 1e-10 {
                ring.push(first);
            }
        }
        ring
    }

    /// Date range to search for acquisitions, the season widened by a week
    /// on each side.
    pub fn search_window(&self) -> (NaiveDate, NaiveDate) {
        (
            self.planting - Duration::days(SEASON_MARGIN_DAYS),
            self.harvest + Duration::days(SEASON_MARGIN_DAYS),
        )
    }

    /// Key growth-stage dates for this plot's season.
    pub fn growth_stage_anchors(&self) -> Vec<NaiveDate> {
        GROWTH_STAGE_OFFSETS
            .iter()
            .map(|&days| self.planting + Duration::days(days))
            .collect()
    }

    /// Axis-aligned bounding box as (min_lon, min_lat, max_lon, max_lat).
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let mut min_lon = f64::INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        for &(lon, lat) in &self.ring {
            min_lon = min_lon.min(lon);
            min_lat = min_lat.min(lat);
            max_lon = max_lon.max(lon);
            max_lat = max_lat.max(lat);
        }
        (min_lon, min_lat, max_lon, max_lat)
    }

    /// Parse one GeoJSON Feature with `plot_id`, `planting_date` and
    /// `harvest_date` properties and a Polygon geometry.
    pub fn from_geojson_feature(feature: &serde_json::Value) -> Result<Self, PipelineError> {
        let props = feature
            .get("properties")
            .ok_or_else(|| PipelineError::DataFormat("feature missing properties".to_string()))?;
        let id = props
            .get("plot_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::DataFormat("feature missing plot_id".to_string()))?
            .to_string();
        let raw_planting = props
            .get("planting_date")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::DataFormat(format!("plot {id}: missing planting_date")))?;
        let planting = parse_date(&id, "planting_date", raw_planting)?;
        let harvest = match props.get("harvest_date").and_then(|v| v.as_str()) {
            Some(s) => parse_date(&id, "harvest_date", s)?,
            // Season defaults to 120 days when no harvest date is given.
            None => planting + Duration::days(120),
        };

        let coords = feature
            .get("geometry")
            .and_then(|g| g.get("coordinates"))
            .and_then(|c| c.get(0))
            .and_then(|ring| ring.as_array())
            .ok_or_else(|| {
                PipelineError::DataFormat(format!("plot {id}: missing polygon coordinates"))
            })?;
        let mut ring = Vec::with_capacity(coords.len());
        for pair in coords {
            let lon = pair.get(0).and_then(|v| v.as_f64());
            let lat = pair.get(1).and_then(|v| v.as_f64());
            match (lon, lat) {
                (Some(lon), Some(lat)) => ring.push((lon, lat)),
                _ => {
                    return Err(PipelineError::DataFormat(format!(
                        "plot {id}: malformed coordinate pair"
                    )))
                }
            }
        }

        let plot = PlotDescriptor {
            id,
            ring,
            planting,
            harvest,
        };
        plot.validate()?;
        Ok(plot)
    }
}

fn parse_date(id: &str, key: &str, raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        PipelineError::DataFormat(format!("plot {id}: {key} {raw:?} is not YYYY-MM-DD"))
    })
}

/// Parse a plots document: either a bare JSON array of features or a
/// GeoJSON FeatureCollection.
pub fn parse_plots_json(raw: &str) -> Result<Vec<PlotDescriptor>, PipelineError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| PipelineError::DataFormat(format!("invalid plots JSON: {e}")))?;
    let features = if let Some(arr) = value.as_array() {
        arr.clone()
    } else if let Some(arr) = value.get("features").and_then(|f| f.as_array()) {
        arr.clone()
    } else {
        return Err(PipelineError::DataFormat(
            "plots document is neither a feature array nor a FeatureCollection".to_string(),
        ));
    };
    features.iter().map(PlotDescriptor::from_geojson_feature).collect()
}
