// src/io/mod.rs
pub mod writer;

pub use writer::{sidecar_metadata, GeoTiffWriter};
