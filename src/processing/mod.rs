// src/processing/mod.rs
pub mod indices;
pub mod scheduler;

pub use scheduler::{AcquisitionScheduler, DateOutcome, PlotReport};

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::PipelineError;
use crate::processing::indices::{IndexKind, IndexOutput, ValueRange};
use crate::raster::{BandId, BandSet};
use crate::utils::fixed_point::{self, NODATA_F32};

/// Per-plane descriptive statistics over the valid pixels of a raw
/// index raster.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub valid_pixels: usize,
    pub total_pixels: usize,
    pub coverage_pct: f64,
}

/// Statistics over one plane of raw values, ignoring the no-data
/// sentinel. An all-sentinel plane yields zeroed stats with
/// valid_pixels = 0.
pub fn summarize(raw: &[f32]) -> SummaryStats {
    let total_pixels = raw.len();
    let mut valid: Vec<f64> = raw
        .iter()
        .filter(|&&v| !v.is_nan() && v != NODATA_F32)
        .map(|&v| v as f64)
        .collect();
    if valid.is_empty() {
        return SummaryStats {
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
            median: 0.0,
            valid_pixels: 0,
            total_pixels,
            coverage_pct: 0.0,
        };
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let n = valid.len();
    let sum: f64 = valid.iter().sum();
    let mean = sum / n as f64;
    let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        valid[n / 2]
    } else {
        (valid[n / 2 - 1] + valid[n / 2]) / 2.0
    };
    SummaryStats {
        mean,
        std: var.sqrt(),
        min: valid[0],
        max: valid[n - 1],
        median,
        valid_pixels: n,
        total_pixels,
        coverage_pct: if total_pixels == 0 {
            0.0
        } else {
            n as f64 / total_pixels as f64 * 100.0
        },
    }
}

/// A finished, integer-scaled index raster ready for output.
#[derive(Debug, Clone)]
pub struct IndexResult {
    pub name: String,
    pub formula: String,
    pub bands_used: Vec<BandId>,
    /// Plane-major i16 pixels, -10000 as the no-data sentinel.
    pub data: Vec<i16>,
    pub planes: usize,
    pub shape: (usize, usize),
    pub stats: SummaryStats,
    pub clamped_pixels: usize,
    /// physical = stored * scale + offset
    pub scale: f64,
    pub offset: f64,
}

fn scale_params(range: ValueRange) -> (f64, f64) {
    match range {
        ValueRange::SignedUnit => (1.0 / 5000.0, -1.0),
        ValueRange::Unit => (1.0 / 10000.0, 0.0),
        ValueRange::Reflectance => (1.0, 0.0),
    }
}

fn scale_output(output: &IndexOutput) -> Vec<i16> {
    match output.range {
        ValueRange::SignedUnit => fixed_point::scale_signed_unit(&output.raw),
        ValueRange::Unit => fixed_point::scale_unit(&output.raw),
        ValueRange::Reflectance => fixed_point::scale_reflectance(&output.raw),
    }
}

/// Runs a configured set of index calculators over one masked band set.
///
/// Failures are isolated per index: a missing band fails that index and
/// leaves the others untouched.
pub struct BandAlgebraEngine {
    indices: Vec<IndexKind>,
}

impl BandAlgebraEngine {
    pub fn new(indices: Vec<IndexKind>) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &[IndexKind] {
        &self.indices
    }

    /// Every band any configured index needs, plus SCL when requested.
    pub fn required_bands(&self, with_scl: bool) -> Vec<BandId> {
        let mut set = BTreeSet::new();
        for kind in &self.indices {
            for &band in kind.calculator().required_bands() {
                set.insert(band);
            }
        }
        if with_scl {
            set.insert(BandId::Scl);
        }
        set.into_iter().collect()
    }

    pub fn compute(&self, bands: &BandSet) -> (Vec<IndexResult>, Vec<PipelineError>) {
        let mut results = Vec::with_capacity(self.indices.len());
        let mut failures = Vec::new();
        for kind in &self.indices {
            let calc = kind.calculator();
            match calc.calculate(bands) {
                Ok(output) => {
                    let data = scale_output(&output);
                    let (scale, offset) = scale_params(output.range);
                    results.push(IndexResult {
                        name: calc.name().to_string(),
                        formula: calc.formula().to_string(),
                        bands_used: calc.required_bands().to_vec(),
                        data,
                        planes: output.planes,
                        shape: output.shape,
                        stats: summarize(&output.raw),
                        clamped_pixels: output.clamped_pixels,
                        scale,
                        offset,
                    });
                }
                Err(err) => {
                    tracing::warn!(index = calc.name(), error = %err, "index computation failed");
                    failures.push(err);
                }
            }
        }
        (results, failures)
    }
}
