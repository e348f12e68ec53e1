// src/utils/mod.rs
pub mod fixed_point;
pub mod retry;
