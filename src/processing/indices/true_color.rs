// src/processing/indices/true_color.rs
use crate::error::PipelineError;
use crate::processing::indices::{IndexCalculator, IndexOutput, ValueRange};
use crate::raster::{BandId, BandSet};
use crate::utils::fixed_point::NODATA_F32;

/// RGB composite: not band algebra but a 3-plane stack of (RED, GREEN,
/// BLUE) in that channel order, each independently clamped into the
/// storage range.
pub struct TrueColor {
    bands: [BandId; 3],
}

impl TrueColor {
    pub fn new() -> Self {
        Self {
            bands: [BandId::B04, BandId::B03, BandId::B02],
        }
    }
}

impl Default for TrueColor {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexCalculator for TrueColor {
    fn name(&self) -> &str {
        "TrueColor"
    }

    fn formula(&self) -> &str {
        "stack(RED, GREEN, BLUE)"
    }

    fn required_bands(&self) -> &[BandId] {
        &self.bands
    }

    fn calculate(&self, bands: &BandSet) -> Result<IndexOutput, PipelineError> {
        let shape = bands.shape();
        let mut raw = Vec::with_capacity(3 * shape.0 * shape.1);
        for &band_id in &self.bands {
            let band = bands.require(band_id, "TrueColor")?;
            raw.extend(band.data().iter().map(|&v| {
                if v.is_nan() {
                    NODATA_F32
                } else {
                    v
                }
            }));
        }
        Ok(IndexOutput {
            raw,
            planes: 3,
            shape,
            range: ValueRange::Reflectance,
            clamped_pixels: 0,
        })
    }
}
