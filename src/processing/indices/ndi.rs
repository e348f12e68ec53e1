// src/processing/indices/ndi.rs
use rayon::prelude::*;

use crate::error::PipelineError;
use crate::processing::indices::{IndexCalculator, IndexOutput, ValueRange};
use crate::raster::{BandId, BandSet};
use crate::utils::fixed_point::NODATA_F32;

/// Normalized-difference family: (A - B) / (A + B) over a band pair.
///
/// The four named instances are deliberately distinct indices and must not
/// be conflated: NDVI (B08/B04), NDRE (B08/B05), NDWI in the McFeeters
/// water form (B03/B08) and NDMI in the Gao moisture form (B08/B11).
pub struct NormalizedDifference {
    plus: BandId,
    minus: BandId,
    name: &'static str,
    formula: &'static str,
    bands: [BandId; 2],
}

impl NormalizedDifference {
    pub fn ndvi() -> Self {
        Self::new(BandId::B08, BandId::B04, "NDVI", "(NIR - RED) / (NIR + RED)")
    }

    pub fn ndre() -> Self {
        Self::new(
            BandId::B08,
            BandId::B05,
            "NDRE",
            "(NIR - RedEdge) / (NIR + RedEdge)",
        )
    }

    /// McFeeters water index, green over NIR.
    pub fn ndwi() -> Self {
        Self::new(
            BandId::B03,
            BandId::B08,
            "NDWI",
            "(GREEN - NIR) / (GREEN + NIR)",
        )
    }

    /// Gao moisture index, NIR over SWIR1.
    pub fn ndmi() -> Self {
        Self::new(
            BandId::B08,
            BandId::B11,
            "NDMI",
            "(NIR - SWIR1) / (NIR + SWIR1)",
        )
    }

    fn new(plus: BandId, minus: BandId, name: &'static str, formula: &'static str) -> Self {
        Self {
            plus,
            minus,
            name,
            formula,
            bands: [plus, minus],
        }
    }
}

impl IndexCalculator for NormalizedDifference {
    fn name(&self) -> &str {
        self.name
    }

    fn formula(&self) -> &str {
        self.formula
    }

    fn required_bands(&self) -> &[BandId] {
        &self.bands
    }

    fn calculate(&self, bands: &BandSet) -> Result<IndexOutput, PipelineError> {
        let a = bands.require(self.plus, self.name)?;
        let b = bands.require(self.minus, self.name)?;
        let shape = a.shape();
        let a_data = a.data();
        let b_data = b.data();

        let mut raw = vec![0.0f32; a_data.len()];
        raw.par_iter_mut().enumerate().for_each(|(i, out)| {
            let a_val = a_data[i];
            let b_val = b_data[i];
            *out = if a_val.is_nan() || b_val.is_nan() || a_val + b_val == 0.0 {
                NODATA_F32
            } else {
                ((a_val - b_val) / (a_val + b_val)).clamp(-1.0, 1.0)
            };
        });

        Ok(IndexOutput {
            raw,
            planes: 1,
            shape,
            range: ValueRange::SignedUnit,
            clamped_pixels: 0,
        })
    }
}
