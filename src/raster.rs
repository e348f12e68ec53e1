// src/raster.rs
use std::collections::HashMap;

use serde::Serialize;

use crate::error::PipelineError;

/// Sentinel-2 band labels used by the pipeline, plus the scene
/// classification layer (SCL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BandId {
    /// Blue, for TrueColor and the spectral cloud heuristic
    B02,
    /// Green, for NDWI and TrueColor
    B03,
    /// Red, for NDVI, MSAVI and TrueColor
    B04,
    /// Red edge, for NDRE
    B05,
    /// NIR, for NDVI, NDRE, NDWI, NDMI and MSAVI
    B08,
    /// SWIR1, for NDMI
    B11,
    /// Scene classification layer, for cloud masking
    Scl,
}

impl BandId {
    pub fn label(&self) -> &'static str {
        match self {
            BandId::B02 => "B02",
            BandId::B03 => "B03",
            BandId::B04 => "B04",
            BandId::B05 => "B05",
            BandId::B08 => "B08",
            BandId::B11 => "B11",
            BandId::Scl => "SCL",
        }
    }

    pub fn parse(label: &str) -> Option<BandId> {
        match label {
            "B02" => Some(BandId::B02),
            "B03" => Some(BandId::B03),
            "B04" => Some(BandId::B04),
            "B05" => Some(BandId::B05),
            "B08" => Some(BandId::B08),
            "B11" => Some(BandId::B11),
            "SCL" => Some(BandId::Scl),
            _ => None,
        }
    }
}

impl std::fmt::Display for BandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A 2-D grid of pixel values in row-major order.
#[derive(Debug, Clone)]
pub struct Raster<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Raster<T> {
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self, PipelineError> {
        if data.len() != width * height {
            return Err(PipelineError::DataFormat(format!(
                "raster data length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }
}

/// All bands of one scene. Spectral bands are stored as f32 rasters so
/// masked pixels can be carried as NaN; the classification layer keeps its
/// raw u8 class values.
///
/// Invariant: every raster in the set shares the same width and height.
#[derive(Debug, Clone)]
pub struct BandSet {
    width: usize,
    height: usize,
    bands: HashMap<BandId, Raster<f32>>,
    scl: Option<Raster<u8>>,
}

impl BandSet {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bands: HashMap::new(),
            scl: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn insert(&mut self, id: BandId, raster: Raster<f32>) -> Result<(), PipelineError> {
        if raster.shape() != (self.width, self.height) {
            return Err(PipelineError::DataFormat(format!(
                "band {} shape {:?} does not match scene shape {:?}",
                id,
                raster.shape(),
                (self.width, self.height)
            )));
        }
        if id == BandId::Scl {
            return Err(PipelineError::DataFormat(
                "SCL must be inserted through insert_scl".to_string(),
            ));
        }
        self.bands.insert(id, raster);
        Ok(())
    }

    pub fn insert_scl(&mut self, raster: Raster<u8>) -> Result<(), PipelineError> {
        if raster.shape() != (self.width, self.height) {
            return Err(PipelineError::DataFormat(format!(
                "SCL shape {:?} does not match scene shape {:?}",
                raster.shape(),
                (self.width, self.height)
            )));
        }
        self.scl = Some(raster);
        Ok(())
    }

    pub fn band(&self, id: BandId) -> Option<&Raster<f32>> {
        self.bands.get(&id)
    }

    /// Band lookup that reports a per-index failure when the band is absent.
    pub fn require(&self, id: BandId, index: &str) -> Result<&Raster<f32>, PipelineError> {
        self.bands.get(&id).ok_or_else(|| PipelineError::IndexComputation {
            index: index.to_string(),
            band: id.label().to_string(),
        })
    }

    pub fn scl(&self) -> Option<&Raster<u8>> {
        self.scl.as_ref()
    }

    /// Sorted labels of all present bands, SCL last.
    pub fn band_labels(&self) -> Vec<&'static str> {
        let mut ids: Vec<BandId> = self.bands.keys().copied().collect();
        ids.sort();
        let mut labels: Vec<&'static str> = ids.iter().map(|b| b.label()).collect();
        if self.scl.is_some() {
            labels.push(BandId::Scl.label());
        }
        labels
    }

    /// Set every excluded pixel to NaN across all spectral bands.
    pub fn mask_excluded(&mut self, excluded: &Raster<bool>) {
        for raster in self.bands.values_mut() {
            for (px, &gone) in raster.data_mut().iter_mut().zip(excluded.data()) {
                if gone {
                    *px = f32::NAN;
                }
            }
        }
    }
}
