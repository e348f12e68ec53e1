// src/services/mod.rs
pub mod auth;
pub mod download;
pub mod rate_limit;
pub mod search;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::plot::PlotDescriptor;
use crate::processing::IndexResult;
use crate::quality::CloudMaskResult;
use crate::raster::{BandId, BandSet};

pub use auth::CopernicusAuth;
pub use download::ProcessApiDownload;
pub use rate_limit::{RateLimitPermit, RateLimiter};
pub use search::CopernicusSearch;

/// One available acquisition over the plot on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRef {
    pub scene_id: String,
    /// Cloud coverage percent reported by the catalogue, not yet measured
    /// by our own masking.
    pub cloud_pct: f64,
}

/// Availability per acquisition date, chronologically ordered. Immutable
/// once cached.
pub type SearchResult = BTreeMap<NaiveDate, SceneRef>;

/// Supplies a currently-valid bearer token, refreshing internally.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, PipelineError>;
}

/// Queries the imagery catalogue for scenes intersecting a plot.
pub trait ImagerySearch: Send + Sync {
    fn search(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
    ) -> Result<SearchResult, PipelineError>;
}

/// Downloads the requested bands of one scene as an in-memory band set.
pub trait ImageryDownload: Send + Sync {
    fn fetch(
        &self,
        scene: &SceneRef,
        ring: &[(f64, f64)],
        date: NaiveDate,
        bands: &[BandId],
    ) -> Result<BandSet, PipelineError>;
}

/// Persists one date's index results plus metadata. The exact file layout
/// is the writer's concern; the pipeline only hands results over.
pub trait OutputWriter: Send + Sync {
    fn write(
        &self,
        plot: &PlotDescriptor,
        date: NaiveDate,
        results: &[IndexResult],
        quality: &CloudMaskResult,
        elapsed_secs: f64,
    ) -> Result<Option<std::path::PathBuf>, PipelineError>;
}
