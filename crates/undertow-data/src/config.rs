use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_error, DataError};

/// Everything the data pipeline needs to locate, validate, cache and batch a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding every dataset.
    pub data_root: PathBuf,
    /// Name of the dataset directory under `data_root`.
    pub dataset: String,
    /// Prefix of run subdirectories, e.g. `tr` for `tr_000000`.
    pub run_prefix: String,
    /// Number of leading frames skipped in every run.
    pub ignore_frames: usize,
    /// Cells stripped from each side of every field on load.
    pub border_width: usize,
    pub batch_size: usize,
    /// Worker threads used when gathering statistics.
    pub workers: usize,
    /// Runs whose target velocity diverges more than this are dropped.
    pub divergence_threshold: f32,
    /// Seed for augmentation draws.
    pub seed: u64,
    /// Overrides the default `<data_root>/cache/<dataset>_<run_prefix>` location.
    pub cache_dir: Option<PathBuf>,
    pub augment: AugmentConfig,
    pub compression: CompressionConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            dataset: String::from("datasets"),
            run_prefix: String::from("tr"),
            ignore_frames: 0,
            border_width: 1,
            batch_size: 16,
            workers: 1,
            divergence_threshold: 100.0,
            seed: 0,
            cache_dir: None,
            augment: AugmentConfig::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl DatasetConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<DatasetConfig, DataError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(io_error(path))?;

        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Directory whose subdirectories are the runs.
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_root.join(&self.dataset)
    }

    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => self
                .data_root
                .join("cache")
                .join(format!("{}_{}", self.dataset, self.run_prefix)),
        }
    }
}

/// Batch augmentation settings. Only axis flips are implemented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub enabled: bool,
    /// Probability of mirroring a sample along each axis.
    pub flip_probability: f32,
    /// Maximum rotation, in degrees.
    pub rotation: f32,
    /// Maximum deviation of the scale factor from one.
    pub scale: f32,
    /// Maximum translation, in cells.
    pub translation: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            flip_probability: 0.5,
            rotation: 0.0,
            scale: 0.0,
            translation: 0.0,
        }
    }
}

impl AugmentConfig {
    /// Rejects every setting the batch builder cannot honour.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.rotation != 0.0 {
            return Err(DataError::UnsupportedAugmentation("rotation"));
        }
        if self.scale != 0.0 {
            return Err(DataError::UnsupportedAugmentation("scale"));
        }
        if self.translation != 0.0 {
            return Err(DataError::UnsupportedAugmentation("translation"));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(DataError::FlipProbability(self.flip_probability));
        }

        Ok(())
    }
}

/// Lossy compression of cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Maximum reconstruction error, relative to the largest magnitude in each field.
    pub accuracy: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            accuracy: 1e-5,
        }
    }
}
