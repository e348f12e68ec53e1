// src/services/download.rs
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use chrono::NaiveDate;
use gdal::Dataset;

use crate::error::PipelineError;
use crate::raster::{BandId, BandSet, Raster};
use crate::services::search::{classify_status, classify_transport};
use crate::services::{ImageryDownload, SceneRef, TokenProvider};

/// Download client for the Sentinel Hub process API.
///
/// Requests only the bands the active index set and masking mode need
/// (6 spectral + SCL by default instead of the 12 native bands) and decodes
/// either a direct `image/tiff` response or a zip archive containing one.
pub struct ProcessApiDownload {
    download_url: String,
    http: reqwest::blocking::Client,
    tokens: Arc<dyn TokenProvider>,
    width: usize,
    height: usize,
    max_cloud_pct: f64,
}

impl ProcessApiDownload {
    pub fn new(
        download_url: &str,
        tokens: Arc<dyn TokenProvider>,
        width: usize,
        height: usize,
        max_cloud_pct: f64,
        timeout_secs: u64,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            download_url: download_url.to_string(),
            http,
            tokens,
            width,
            height,
            max_cloud_pct,
        })
    }

    fn evalscript(bands: &[BandId]) -> String {
        let inputs: Vec<String> = bands.iter().map(|b| format!("\"{}\"", b.label())).collect();
        let outputs: Vec<String> = bands.iter().map(|b| format!("sample.{}", b.label())).collect();
        format!(
            "//VERSION=3\n\
             function setup() {{\n\
               return {{\n\
                 input: [{{ bands: [{inputs}], units: \"DN\" }}],\n\
                 output: {{ id: \"default\", bands: {count}, sampleType: SampleType.UINT16 }},\n\
               }};\n\
             }}\n\
             function evaluatePixel(sample) {{\n\
               return [{outputs}];\n\
             }}\n",
            inputs = inputs.join(", "),
            outputs = outputs.join(", "),
            count = bands.len()
        )
    }

    fn request_payload(
        &self,
        ring: &[(f64, f64)],
        date: NaiveDate,
        bands: &[BandId],
    ) -> serde_json::Value {
        let coordinates: Vec<[f64; 2]> = ring.iter().map(|&(lon, lat)| [lon, lat]).collect();
        serde_json::json!({
            "input": {
                "bounds": {
                    "properties": { "crs": "http://www.opengis.net/def/crs/EPSG/0/4326" },
                    "geometry": { "type": "Polygon", "coordinates": [coordinates] }
                },
                "data": [{
                    "type": "sentinel-2-l2a",
                    "dataFilter": {
                        "timeRange": {
                            "from": format!("{date}T00:00:00Z"),
                            "to": format!("{date}T23:59:59Z"),
                        },
                        "maxCloudCoverage": self.max_cloud_pct,
                    },
                    "processing": { "harmonizeValues": false }
                }]
            },
            "output": {
                "width": self.width,
                "height": self.height,
                "responses": [{ "identifier": "default", "format": { "type": "image/tiff" } }]
            },
            "evalscript": Self::evalscript(bands),
        })
    }

    /// Decode the GeoTIFF bytes into a band set, band order matching the
    /// requested list (the evalscript fixes the order).
    fn decode_geotiff(&self, bytes: &[u8], bands: &[BandId]) -> Result<BandSet, PipelineError> {
        // GDAL wants a file path; stage the payload in a temp file.
        let mut tmp = tempfile::Builder::new()
            .suffix(".tif")
            .tempfile()
            .map_err(|e| PipelineError::DataFormat(format!("temp file: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| PipelineError::DataFormat(format!("temp file: {e}")))?;
        tmp.flush()
            .map_err(|e| PipelineError::DataFormat(format!("temp file: {e}")))?;

        let dataset = Dataset::open(tmp.path())?;
        let (width, height) = dataset.raster_size();
        let raster_count = dataset.raster_count() as usize;
        if raster_count < bands.len() {
            return Err(PipelineError::DataFormat(format!(
                "scene has {} bands, requested {}",
                raster_count,
                bands.len()
            )));
        }

        let mut set = BandSet::new(width, height);
        for (i, &band_id) in bands.iter().enumerate() {
            let band = dataset.rasterband(i + 1)?;
            let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            if band_id == BandId::Scl {
                let classes: Vec<u8> = buffer.data().iter().map(|&v| v as u8).collect();
                set.insert_scl(Raster::new(width, height, classes)?)?;
            } else {
                set.insert(band_id, Raster::new(width, height, buffer.data().to_vec())?)?;
            }
        }
        Ok(set)
    }

    /// Pull the first .tif entry out of an archive response.
    fn extract_from_zip(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PipelineError::DataFormat(format!("bad archive response: {e}")))?;
        let name = (0..archive.len())
            .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
            .find(|name| name.ends_with(".tif") || name.ends_with(".tiff"))
            .ok_or_else(|| {
                PipelineError::DataFormat("archive response contains no raster".to_string())
            })?;
        let mut file = archive
            .by_name(&name)
            .map_err(|e| PipelineError::DataFormat(format!("bad archive entry: {e}")))?;
        let mut out = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut out)
            .map_err(|e| PipelineError::DataFormat(format!("bad archive entry: {e}")))?;
        Ok(out)
    }
}

impl ImageryDownload for ProcessApiDownload {
    fn fetch(
        &self,
        scene: &SceneRef,
        ring: &[(f64, f64)],
        date: NaiveDate,
        bands: &[BandId],
    ) -> Result<BandSet, PipelineError> {
        let token = self.tokens.bearer_token()?;
        tracing::info!("downloading scene {} for {date}", scene.scene_id);

        let response = self
            .http
            .post(&self.download_url)
            .json(&self.request_payload(ring, date, bands))
            .bearer_auth(token)
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "scene download"));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response
            .bytes()
            .map_err(classify_transport)?
            .to_vec();

        // Some deployments wrap multi-band output in a zip archive.
        let tiff = if content_type.contains("zip") || bytes.starts_with(b"PK") {
            Self::extract_from_zip(&bytes)?
        } else {
            bytes
        };

        self.decode_geotiff(&tiff, bands)
    }
}
