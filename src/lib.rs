// src/lib.rs
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod plot;
pub mod processing;
pub mod quality;
pub mod raster;
pub mod selection;
pub mod services;
pub mod store;
pub mod utils;

pub use batch::{BatchCoordinator, BatchSummary};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use plot::PlotDescriptor;
pub use processing::{AcquisitionScheduler, BandAlgebraEngine};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
