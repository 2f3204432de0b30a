//! Turns directories of simulation runs into a validated, cached and indexed training dataset.

pub mod batch;
pub mod cache;
mod compress;
pub mod config;
pub mod dataset;
pub mod error;
pub mod index;
pub mod progress;
pub mod scan;
pub mod stats;

#[cfg(test)]
mod fixtures;

pub use batch::{AppliedAugmentation, Batch, BatchBuilder};
pub use cache::FrameCache;
pub use config::{AugmentConfig, CompressionConfig, DatasetConfig};
pub use dataset::Dataset;
pub use error::DataError;
pub use index::{SampleIndex, SampleRef};
pub use scan::RunInfo;
pub use stats::{compute_statistics, KeyStatistics, Moments, SampleStats, StatKey, Statistics};
