// src/config.rs
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::processing::indices::IndexKind;

/// Credentials for the Copernicus identity service. Username and password
/// may be left blank in the file and supplied via COPERNICUS_USERNAME /
/// COPERNICUS_PASSWORD instead.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_client_id() -> String {
    "cdse-public".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl AuthConfig {
    /// Environment variables win over file values when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COPERNICUS_USERNAME") {
            self.username = v;
        }
        if let Ok(v) = std::env::var("COPERNICUS_PASSWORD") {
            self.password = v;
        }
        if let Ok(v) = std::env::var("COPERNICUS_CLIENT_ID") {
            self.client_id = v;
        }
        if let Ok(v) = std::env::var("COPERNICUS_CLIENT_SECRET") {
            self.client_secret = v;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Per-request timeout for imagery downloads, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_token_url() -> String {
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token"
        .to_string()
}

fn default_search_url() -> String {
    "https://catalogue.dataspace.copernicus.eu/odata/v1/Products".to_string()
}

fn default_download_url() -> String {
    "https://sh.dataspace.copernicus.eu/api/v1/process".to_string()
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            search_url: default_search_url(),
            download_url: default_download_url(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Index names to derive per scene, case-insensitive.
    #[serde(default = "default_indices")]
    pub indices: Vec<String>,
    #[serde(default = "default_image_dim")]
    pub image_width: usize,
    #[serde(default = "default_image_dim")]
    pub image_height: usize,
}

fn default_indices() -> Vec<String> {
    ["NDVI", "NDRE", "MSAVI", "NDMI", "TrueColor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_image_dim() -> usize {
    256
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            indices: default_indices(),
            image_width: default_image_dim(),
            image_height: default_image_dim(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_max_cloud")]
    pub max_cloud_pct: f64,
    #[serde(default = "default_min_data")]
    pub min_data_pct: f64,
    #[serde(default = "default_morph_radius")]
    pub opening_radius: usize,
    #[serde(default = "default_morph_radius")]
    pub closing_radius: usize,
}

fn default_max_cloud() -> f64 {
    20.0
}

fn default_min_data() -> f64 {
    80.0
}

fn default_morph_radius() -> usize {
    1
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_cloud_pct: default_max_cloud(),
            min_data_pct: default_min_data(),
            opening_radius: default_morph_radius(),
            closing_radius: default_morph_radius(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_min_interval")]
    pub min_interval_days: i64,
    #[serde(default = "default_anchor_tolerance")]
    pub anchor_tolerance_days: i64,
    #[serde(default = "default_true")]
    pub growth_stage_bias: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_hours: i64,
}

fn default_min_interval() -> i64 {
    7
}

fn default_anchor_tolerance() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> i64 {
    24
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_interval_days: default_min_interval(),
            anchor_tolerance_days: default_anchor_tolerance(),
            growth_stage_bias: default_true(),
            cache_ttl_hours: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Concurrent outbound provider calls across all workers.
    #[serde(default = "default_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Seconds between consecutive provider call admissions.
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Worker spawning pauses while free memory is below this floor.
    #[serde(default = "default_min_free_memory")]
    pub min_free_memory_mb: u64,
}

fn default_concurrent_calls() -> usize {
    2
}

fn default_request_delay() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_size() -> usize {
    2
}

fn default_max_workers() -> usize {
    4
}

fn default_min_free_memory() -> u64 {
    512
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_concurrent_calls(),
            request_delay_secs: default_request_delay(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            min_free_memory_mb: default_min_free_memory(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

/// Top-level pipeline configuration, loaded from a JSON file. Every field
/// has a default so a partial or missing file still yields a runnable
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.auth.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.processing.indices.is_empty() {
            return Err(PipelineError::Config("no indices configured".to_string()));
        }
        for name in &self.processing.indices {
            if IndexKind::parse(name).is_none() {
                return Err(PipelineError::Config(format!("unknown index '{name}'")));
            }
        }
        if self.processing.image_width == 0 || self.processing.image_height == 0 {
            return Err(PipelineError::Config(
                "image dimensions must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.quality.max_cloud_pct) {
            return Err(PipelineError::Config(
                "max_cloud_pct must be within 0..100".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.quality.min_data_pct) {
            return Err(PipelineError::Config(
                "min_data_pct must be within 0..100".to_string(),
            ));
        }
        if self.limits.batch_size == 0 || self.limits.max_workers == 0 {
            return Err(PipelineError::Config(
                "batch_size and max_workers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn index_kinds(&self) -> Vec<IndexKind> {
        self.processing
            .indices
            .iter()
            .filter_map(|name| IndexKind::parse(name))
            .collect()
    }
}
