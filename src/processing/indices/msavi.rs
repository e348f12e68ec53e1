// src/processing/indices/msavi.rs
use rayon::prelude::*;

use crate::error::PipelineError;
use crate::processing::indices::{IndexCalculator, IndexOutput, ValueRange};
use crate::raster::{BandId, BandSet};
use crate::utils::fixed_point::NODATA_F32;

/// Conversion from digital numbers to surface reflectance.
const DN_SCALE: f32 = 10000.0;

/// Modified Soil Adjusted Vegetation Index.
///
/// MSAVI = (2*NIR + 1 - sqrt((2*NIR + 1)^2 - 8*(NIR - RED))) / 2, computed
/// on reflectance. Near extreme band values the discriminant can go
/// negative; it is clamped to zero before the root (result = (2*NIR+1)/2)
/// instead of propagating NaN, and the affected pixels are counted as a
/// quality signal.
pub struct Msavi {
    bands: [BandId; 2],
}

impl Msavi {
    pub fn new() -> Self {
        Self {
            bands: [BandId::B08, BandId::B04],
        }
    }
}

impl Default for Msavi {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexCalculator for Msavi {
    fn name(&self) -> &str {
        "MSAVI"
    }

    fn formula(&self) -> &str {
        "(2*NIR + 1 - sqrt((2*NIR + 1)^2 - 8*(NIR - RED))) / 2"
    }

    fn required_bands(&self) -> &[BandId] {
        &self.bands
    }

    fn calculate(&self, bands: &BandSet) -> Result<IndexOutput, PipelineError> {
        let nir = bands.require(BandId::B08, "MSAVI")?;
        let red = bands.require(BandId::B04, "MSAVI")?;
        let shape = nir.shape();
        let nir_data = nir.data();
        let red_data = red.data();

        let mut raw = vec![0.0f32; nir_data.len()];
        raw.par_iter_mut().enumerate().for_each(|(i, out)| {
            let n = nir_data[i] / DN_SCALE;
            let r = red_data[i] / DN_SCALE;
            *out = if n.is_nan() || r.is_nan() {
                NODATA_F32
            } else {
                let two_nir_plus_one = 2.0 * n + 1.0;
                let discriminant = two_nir_plus_one * two_nir_plus_one - 8.0 * (n - r);
                let root = discriminant.max(0.0).sqrt();
                ((two_nir_plus_one - root) / 2.0).clamp(0.0, 1.0)
            };
        });

        let clamped_pixels = (0..nir_data.len())
            .into_par_iter()
            .filter(|&i| {
                let n = nir_data[i] / DN_SCALE;
                let r = red_data[i] / DN_SCALE;
                if n.is_nan() || r.is_nan() {
                    return false;
                }
                let two_nir_plus_one = 2.0 * n + 1.0;
                two_nir_plus_one * two_nir_plus_one - 8.0 * (n - r) < 0.0
            })
            .count();

        Ok(IndexOutput {
            raw,
            planes: 1,
            shape,
            range: ValueRange::Unit,
            clamped_pixels,
        })
    }
}
