// src/selection/mod.rs
pub mod cache;
pub mod dates;

pub use cache::SearchCache;
pub use dates::{select_dates, DateSelectorParams};
