// src/processing/indices/mod.rs
pub mod msavi;
pub mod ndi;
pub mod true_color;

pub use msavi::Msavi;
pub use ndi::NormalizedDifference;
pub use true_color::TrueColor;

use crate::error::PipelineError;
use crate::raster::{BandId, BandSet};

/// Value domain of a raw index raster, which picks the integer scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRange {
    /// [-1, 1], scaled as (v + 1) * 5000
    SignedUnit,
    /// [0, 1], scaled as v * 10000
    Unit,
    /// Raw digital numbers, clamped into 0..10000
    Reflectance,
}

/// Raw (pre-scaling) output of one index calculation.
#[derive(Debug, Clone)]
pub struct IndexOutput {
    /// Plane-major pixel values with -999.0 as the no-data sentinel.
    pub raw: Vec<f32>,
    pub planes: usize,
    pub shape: (usize, usize),
    pub range: ValueRange,
    /// Pixels where a numeric guard (e.g. the MSAVI discriminant clamp)
    /// altered the formula result.
    pub clamped_pixels: usize,
}

/// A vegetation-index calculator over one masked scene.
///
/// Calculators are pure: excluded (NaN) input pixels propagate to the
/// sentinel, a missing required band is a per-index failure that leaves
/// the rest of the scene untouched.
pub trait IndexCalculator: Send + Sync {
    fn name(&self) -> &str;

    /// Human-readable formula recorded in the output sidecar.
    fn formula(&self) -> &str;

    fn required_bands(&self) -> &[BandId];

    fn calculate(&self, bands: &BandSet) -> Result<IndexOutput, PipelineError>;
}

/// The indices this pipeline knows how to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Ndvi,
    Ndre,
    Ndwi,
    Ndmi,
    Msavi,
    TrueColor,
}

impl IndexKind {
    pub fn parse(name: &str) -> Option<IndexKind> {
        match name.to_ascii_uppercase().as_str() {
            "NDVI" => Some(IndexKind::Ndvi),
            "NDRE" => Some(IndexKind::Ndre),
            "NDWI" => Some(IndexKind::Ndwi),
            "NDMI" => Some(IndexKind::Ndmi),
            "MSAVI" => Some(IndexKind::Msavi),
            "TRUECOLOR" => Some(IndexKind::TrueColor),
            _ => None,
        }
    }

    pub fn calculator(&self) -> Box<dyn IndexCalculator> {
        match self {
            IndexKind::Ndvi => Box::new(NormalizedDifference::ndvi()),
            IndexKind::Ndre => Box::new(NormalizedDifference::ndre()),
            IndexKind::Ndwi => Box::new(NormalizedDifference::ndwi()),
            IndexKind::Ndmi => Box::new(NormalizedDifference::ndmi()),
            IndexKind::Msavi => Box::new(Msavi::new()),
            IndexKind::TrueColor => Box::new(TrueColor::new()),
        }
    }
}
