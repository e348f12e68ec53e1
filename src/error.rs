// src/error.rs
use thiserror::Error;

/// Error taxonomy for the acquisition pipeline.
///
/// Quality rejection is deliberately absent: a scene that is usable but
/// below threshold is a normal terminal outcome, reported through
/// `DateOutcome::QualityRejected`, not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Token acquisition or refresh failure. Retryable a bounded number of
    /// times, then fatal for the current run.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Timeout or connection failure talking to the imagery provider.
    /// Retryable with backoff.
    #[error("network error: {0}")]
    Network(String),

    /// Unparseable scene response or malformed input data. Not retried.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// A required band is missing for one index. Isolated to that index;
    /// the rest of the scene still proceeds.
    #[error("cannot compute {index}: required band {band} not present")]
    IndexComputation { index: String, band: String },

    /// Another worker already claimed this (plot, date) key. Treated as a
    /// successful skip by callers.
    #[error("processing key already claimed by another worker")]
    StoreConflict,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether the retry machinery should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Auth(_) | PipelineError::Network(_))
    }
}

impl From<gdal::errors::GdalError> for PipelineError {
    fn from(err: gdal::errors::GdalError) -> Self {
        PipelineError::DataFormat(err.to_string())
    }
}
