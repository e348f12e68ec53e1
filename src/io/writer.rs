// src/io/writer.rs
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};

use crate::error::PipelineError;
use crate::plot::PlotDescriptor;
use crate::processing::IndexResult;
use crate::quality::CloudMaskResult;
use crate::services::OutputWriter;
use crate::utils::fixed_point::NODATA_I16;

/// Sidecar metadata written next to the GeoTIFFs for one (plot, date).
pub fn sidecar_metadata(
    plot: &PlotDescriptor,
    date: NaiveDate,
    results: &[IndexResult],
    quality: &CloudMaskResult,
    elapsed_secs: f64,
) -> serde_json::Value {
    let indices: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.name,
                "formula": r.formula,
                "bands": r.bands_used.iter().map(|b| b.label()).collect::<Vec<_>>(),
                "planes": r.planes,
                "scale": r.scale,
                "offset": r.offset,
                "clamped_pixels": r.clamped_pixels,
                "stats": r.stats,
            })
        })
        .collect();
    serde_json::json!({
        "plot_id": plot.id,
        "satellite_date": date.to_string(),
        "planting_date": plot.planting.to_string(),
        "harvest_date": plot.harvest.to_string(),
        "quality": {
            "grade": quality.grade,
            "state": quality.state,
            "detection_method": quality.method,
            "cloud_coverage_pct": quality.cloud_coverage_pct,
            "data_coverage_pct": quality.data_coverage_pct,
        },
        "elapsed_secs": elapsed_secs,
        "indices": indices,
    })
}

/// Writes each index as an i16 GeoTIFF under base/plot_id/date/, plus a
/// metadata.json sidecar.
pub struct GeoTiffWriter {
    base_dir: PathBuf,
}

impl GeoTiffWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// North-up geotransform covering the plot bounding box.
    fn geo_transform(plot: &PlotDescriptor, width: usize, height: usize) -> [f64; 6] {
        let (min_lon, min_lat, max_lon, max_lat) = plot.bounding_box();
        [
            min_lon,
            (max_lon - min_lon) / width as f64,
            0.0,
            max_lat,
            0.0,
            -(max_lat - min_lat) / height as f64,
        ]
    }

    fn write_index(
        &self,
        path: &Path,
        plot: &PlotDescriptor,
        result: &IndexResult,
    ) -> Result<(), PipelineError> {
        let (width, height) = result.shape;
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let creation_options = RasterCreationOptions::from_iter(["COMPRESS=DEFLATE"]);
        let mut dataset = driver.create_with_band_type_with_options::<i16, _>(
            path,
            width,
            height,
            result.planes,
            &creation_options,
        )?;

        dataset.set_geo_transform(&Self::geo_transform(plot, width, height))?;
        let srs = SpatialRef::from_epsg(4326)?;
        dataset.set_projection(&srs.to_wkt()?)?;

        let pixels = width * height;
        for plane in 0..result.planes {
            let mut band = dataset.rasterband(plane + 1)?;
            band.set_no_data_value(Some(NODATA_I16 as f64))?;
            band.set_metadata_item("SCALE", &result.scale.to_string(), "")?;
            band.set_metadata_item("OFFSET", &result.offset.to_string(), "")?;
            band.set_description(&format!("{} (scaled)", result.name))?;
            let plane_data = result.data[plane * pixels..(plane + 1) * pixels].to_vec();
            let mut buffer = Buffer::new((width, height), plane_data);
            band.write((0, 0), (width, height), &mut buffer)?;
        }
        dataset.flush_cache()?;
        Ok(())
    }
}

impl OutputWriter for GeoTiffWriter {
    fn write(
        &self,
        plot: &PlotDescriptor,
        date: NaiveDate,
        results: &[IndexResult],
        quality: &CloudMaskResult,
        elapsed_secs: f64,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let dir = self.base_dir.join(&plot.id).join(date.to_string());
        fs::create_dir_all(&dir).map_err(|e| {
            PipelineError::DataFormat(format!("cannot create {}: {e}", dir.display()))
        })?;

        for result in results {
            let path = dir.join(format!("{}.tif", result.name.to_lowercase()));
            self.write_index(&path, plot, result)?;
            tracing::debug!("wrote {}", path.display());
        }

        let metadata = sidecar_metadata(plot, date, results, quality, elapsed_secs);
        let sidecar = dir.join("metadata.json");
        fs::write(&sidecar, serde_json::to_vec_pretty(&metadata).map_err(|e| {
            PipelineError::DataFormat(format!("metadata serialization: {e}"))
        })?)
        .map_err(|e| {
            PipelineError::DataFormat(format!("cannot write {}: {e}", sidecar.display()))
        })?;

        tracing::info!(
            plot = %plot.id,
            %date,
            indices = results.len(),
            "outputs written to {}",
            dir.display()
        );
        Ok(Some(dir))
    }
}
