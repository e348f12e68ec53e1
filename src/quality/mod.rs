// src/quality/mod.rs
pub mod morphology;

use serde::Serialize;

use crate::error::PipelineError;
use crate::raster::{BandId, BandSet, Raster};

/// SCL classes excluded as clouds: shadow, medium/high probability cloud,
/// thin cirrus.
const SCL_CLOUD_CLASSES: [u8; 4] = [3, 8, 9, 10];
/// SCL classes excluded as invalid: no-data and saturated/defective.
const SCL_INVALID_CLASSES: [u8; 2] = [0, 1];

/// Spectral fallback thresholds (digital numbers).
const BRIGHTNESS_THRESHOLD: f32 = 3000.0;
const LOW_NDVI_THRESHOLD: f32 = 0.2;
const BLUE_DOMINANCE_RATIO: f32 = 1.1;

/// How the exclusion mask was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Scl,
    SpectralFallback,
}

/// Overall scene grade, from the measured coverage figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

/// Terminal state of the masking state machine. Rejection is a normal
/// outcome, not an error; the statistics are reported either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskState {
    Accepted,
    Rejected,
}

/// Exclusion mask plus the derived coverage scalars for one scene.
#[derive(Debug, Clone)]
pub struct CloudMaskResult {
    pub excluded: Raster<bool>,
    pub cloud_coverage_pct: f64,
    pub data_coverage_pct: f64,
    pub method: DetectionMethod,
    pub grade: QualityGrade,
    pub state: MaskState,
}

/// Acceptance thresholds and morphology radii.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub max_cloud_pct: f64,
    pub min_data_pct: f64,
    pub opening_radius: usize,
    pub closing_radius: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_cloud_pct: 20.0,
            min_data_pct: 80.0,
            opening_radius: 1,
            closing_radius: 1,
        }
    }
}

/// Per-scene quality filter.
///
/// One scene moves Pending -> {SclClassified | SpectralFallback} -> Masked
/// -> {Accepted | Rejected}: the classification layer drives the mask when
/// present, otherwise a spectral heuristic takes over, and the cleaned mask
/// plus coverage figures decide the terminal state.
pub struct QualityFilter {
    thresholds: QualityThresholds,
}

impl QualityFilter {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Build the exclusion mask and coverage statistics for one scene.
    pub fn evaluate(&self, bands: &BandSet) -> Result<CloudMaskResult, PipelineError> {
        let (raw_mask, no_data, method) = match bands.scl() {
            Some(scl) => {
                tracing::debug!("cloud detection via scene classification layer");
                let (mask, no_data) = scl_masks(scl);
                (mask, no_data, DetectionMethod::Scl)
            }
            None => {
                tracing::debug!("no SCL band, falling back to spectral cloud detection");
                let (mask, no_data) = self.spectral_masks(bands)?;
                (mask, no_data, DetectionMethod::SpectralFallback)
            }
        };

        // Opening strips isolated false positives, closing fills pinholes
        // inside larger cloud regions.
        let opened = morphology::opening(&raw_mask, self.thresholds.opening_radius);
        let cleaned = morphology::closing(&opened, self.thresholds.closing_radius);

        let total = cleaned.len() as f64;
        let excluded_count = cleaned.data().iter().filter(|&&v| v).count() as f64;
        let no_data_count = no_data.data().iter().filter(|&&v| v).count() as f64;
        let cloud_coverage_pct = excluded_count / total * 100.0;
        let data_coverage_pct = (total - no_data_count) / total * 100.0;

        let usable = cloud_coverage_pct <= self.thresholds.max_cloud_pct
            && data_coverage_pct >= self.thresholds.min_data_pct;
        let grade = grade(cloud_coverage_pct, data_coverage_pct, usable);
        let state = if usable {
            MaskState::Accepted
        } else {
            MaskState::Rejected
        };

        tracing::info!(
            "scene quality: {grade:?} (cloud {cloud_coverage_pct:.1}%, data {data_coverage_pct:.1}%) -> {state:?}"
        );

        Ok(CloudMaskResult {
            excluded: cleaned,
            cloud_coverage_pct,
            data_coverage_pct,
            method,
            grade,
            state,
        })
    }

    /// Set excluded pixels to NaN across all spectral bands so the band
    /// algebra propagates them as no-data, never as silent zeros.
    pub fn apply(&self, bands: &mut BandSet, mask: &CloudMaskResult) {
        bands.mask_excluded(&mask.excluded);
    }

    /// Fallback when no classification layer is available: a pixel is
    /// cloud when all visible bands are bright, NDVI is low, and blue
    /// dominates red.
    fn spectral_masks(
        &self,
        bands: &BandSet,
    ) -> Result<(Raster<bool>, Raster<bool>), PipelineError> {
        let blue = bands.require(BandId::B02, "cloud-mask")?;
        let green = bands.require(BandId::B03, "cloud-mask")?;
        let red = bands.require(BandId::B04, "cloud-mask")?;
        let nir = bands.require(BandId::B08, "cloud-mask")?;

        let (width, height) = bands.shape();
        let mut cloud = Vec::with_capacity(width * height);
        let mut no_data = Vec::with_capacity(width * height);
        for i in 0..width * height {
            let (b, g, r, n) = (blue.data()[i], green.data()[i], red.data()[i], nir.data()[i]);
            let empty = b == 0.0 && g == 0.0 && r == 0.0 && n == 0.0;
            no_data.push(empty);

            let bright = b > BRIGHTNESS_THRESHOLD && g > BRIGHTNESS_THRESHOLD && r > BRIGHTNESS_THRESHOLD;
            let ndvi = if n + r != 0.0 { (n - r) / (n + r) } else { 0.0 };
            let blue_dominant = b > r * BLUE_DOMINANCE_RATIO;
            cloud.push(empty || (bright && ndvi < LOW_NDVI_THRESHOLD && blue_dominant));
        }
        Ok((
            Raster::new(width, height, cloud)?,
            Raster::new(width, height, no_data)?,
        ))
    }
}

/// Exclusion and no-data masks from the classification layer.
fn scl_masks(scl: &Raster<u8>) -> (Raster<bool>, Raster<bool>) {
    let (width, height) = scl.shape();
    let mut excluded = Vec::with_capacity(scl.len());
    let mut no_data = Vec::with_capacity(scl.len());
    for &class in scl.data() {
        let invalid = SCL_INVALID_CLASSES.contains(&class);
        excluded.push(invalid || SCL_CLOUD_CLASSES.contains(&class));
        no_data.push(invalid);
    }
    // Lengths match the source raster by construction.
    (
        Raster::new(width, height, excluded).expect("mask shape"),
        Raster::new(width, height, no_data).expect("mask shape"),
    )
}

fn grade(cloud_pct: f64, data_pct: f64, usable: bool) -> QualityGrade {
    if cloud_pct <= 10.0 && data_pct >= 95.0 {
        QualityGrade::Excellent
    } else if cloud_pct <= 20.0 && data_pct >= 85.0 {
        QualityGrade::Good
    } else if usable {
        QualityGrade::Acceptable
    } else {
        QualityGrade::Poor
    }
}
