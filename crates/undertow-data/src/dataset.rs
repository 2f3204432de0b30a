use std::{fs::{self, File}, io::{BufReader, BufWriter}, path::PathBuf};

use glam::UVec3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use undertow_fields::{Divergence, FieldSet};

use crate::{
    cache::FrameCache,
    config::{CompressionConfig, DatasetConfig},
    error::{io_error, DataError},
    index::{SampleIndex, SampleRef},
    scan::{RunInfo, RunScanner},
};

const MANIFEST: &str = "manifest.bin";
const MANIFEST_STAGING: &str = "manifest.bin.tmp";

/// The configuration values that decide what ends up in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fingerprint {
    dataset_dir: PathBuf,
    run_prefix: String,
    ignore_frames: usize,
    border_width: usize,
    divergence_threshold: f32,
    compression: CompressionConfig,
}

impl From<&DatasetConfig> for Fingerprint {
    fn from(config: &DatasetConfig) -> Self {
        Self {
            dataset_dir: config.dataset_dir(),
            run_prefix: config.run_prefix.clone(),
            ignore_frames: config.ignore_frames,
            border_width: config.border_width,
            divergence_threshold: config.divergence_threshold,
            compression: config.compression,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    fingerprint: Fingerprint,
    runs: Vec<RunInfo>,
    rejected: Vec<String>,
    index: SampleIndex,
    dims: UVec3,
    two_dim: bool,
    min_value: f32,
}

/// Validated runs, their cached frames and the flat sample index over them.
#[derive(Debug, Clone)]
pub struct Dataset {
    config: DatasetConfig,
    cache: FrameCache,
    runs: Vec<RunInfo>,
    /// Runs dropped during validation.
    rejected: Vec<String>,
    index: SampleIndex,
    /// Grid size shared by every run, as `(x, y, z)`.
    dims: UVec3,
    two_dim: bool,
    min_value: f32,
}

impl Dataset {
    /// Scans and validates every run, writing accepted frames and a manifest to the cache.
    pub fn build<D: Divergence>(config: DatasetConfig, divergence: &D) -> Result<Dataset, DataError> {
        let cache = FrameCache::new(config.cache_dir(), config.compression)?;
        info!(cache = %cache.root().display(), "building dataset");

        let outcome = RunScanner::new(&config, divergence).scan(&cache)?;
        let index = SampleIndex::build(outcome.runs.iter().map(|run| run.frame_count));

        if index.is_empty() {
            warn!(rejected = outcome.rejected.len(), "no runs survived validation, dataset is empty");
        } else {
            info!(
                runs = outcome.runs.len(),
                rejected = outcome.rejected.len(),
                samples = index.len(),
                dims = %outcome.dims,
                "dataset ready"
            );
        }

        let dataset = Self {
            config,
            cache,
            runs: outcome.runs,
            rejected: outcome.rejected,
            index,
            dims: outcome.dims,
            two_dim: outcome.two_dim,
            min_value: outcome.min_value,
        };
        dataset.write_manifest()?;

        Ok(dataset)
    }

    /// Reopens a previously built dataset, if its manifest matches `config` and every cache
    /// entry is still present.
    pub fn open(config: DatasetConfig) -> Result<Option<Dataset>, DataError> {
        let path = config.cache_dir().join(MANIFEST);
        if !path.is_file() {
            return Ok(None);
        }

        let mut reader = BufReader::new(File::open(&path).map_err(io_error(&path))?);
        let decoded: Result<Manifest, _> = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard());
        let manifest = match decoded {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(manifest = %path.display(), error = %err, "manifest is unreadable, ignoring it");
                return Ok(None);
            }
        };

        if manifest.fingerprint != Fingerprint::from(&config) {
            info!(manifest = %path.display(), "manifest was built with other settings, ignoring it");
            return Ok(None);
        }

        let cache = FrameCache::new(config.cache_dir(), config.compression)?;
        let complete = manifest
            .runs
            .iter()
            .all(|run| (0..run.frame_count).all(|frame| cache.contains(&run.name, frame)));

        if !complete {
            warn!(cache = %cache.root().display(), "cache entries are missing, ignoring manifest");
            return Ok(None);
        }

        info!(samples = manifest.index.len(), runs = manifest.runs.len(), "reusing cached dataset");

        Ok(Some(Self {
            config,
            cache,
            runs: manifest.runs,
            rejected: manifest.rejected,
            index: manifest.index,
            dims: manifest.dims,
            two_dim: manifest.two_dim,
            min_value: manifest.min_value,
        }))
    }

    pub fn load_or_build<D: Divergence>(config: DatasetConfig, divergence: &D) -> Result<Dataset, DataError> {
        match Self::open(config.clone())? {
            Some(dataset) => Ok(dataset),
            None => Self::build(config, divergence),
        }
    }

    fn write_manifest(&self) -> Result<(), DataError> {
        let manifest = Manifest {
            fingerprint: Fingerprint::from(&self.config),
            runs: self.runs.clone(),
            rejected: self.rejected.clone(),
            index: self.index.clone(),
            dims: self.dims,
            two_dim: self.two_dim,
            min_value: self.min_value,
        };

        // Staged beside the final path, then renamed over it.
        let staging = self.cache.root().join(MANIFEST_STAGING);
        let mut writer = BufWriter::new(File::create(&staging).map_err(io_error(&staging))?);
        bincode::serde::encode_into_std_write(&manifest, &mut writer, bincode::config::standard())?;
        writer.into_inner().map_err(|e| DataError::Io {
            path: staging.clone(),
            source: e.into_error(),
        })?;

        let path = self.cache.root().join(MANIFEST);
        fs::rename(&staging, &path).map_err(io_error(&path))
    }

    /// Total number of samples.
    #[inline(always)]
    pub fn nsamples(&self) -> usize {
        self.index.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn runs(&self) -> &[RunInfo] {
        &self.runs
    }

    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    pub fn index(&self) -> &SampleIndex {
        &self.index
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    #[inline(always)]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// `(nz, ny, nx)` shape of every field.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.dims.z as usize, self.dims.y as usize, self.dims.x as usize)
    }

    #[inline(always)]
    pub fn is_2d(&self) -> bool {
        self.two_dim
    }

    /// Minimum pressure or velocity value seen in any accepted run.
    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn resolve(&self, sample: usize) -> Result<SampleRef, DataError> {
        self.index.get(sample).ok_or(DataError::SampleOutOfRange {
            index: sample,
            len: self.index.len(),
        })
    }

    pub fn load_sample(&self, sample: usize) -> Result<FieldSet, DataError> {
        let SampleRef { run, frame } = self.resolve(sample)?;
        self.load_frame(run, frame)
    }

    pub fn load_frame(&self, run: usize, frame: usize) -> Result<FieldSet, DataError> {
        let info = self
            .runs
            .get(run)
            .filter(|info| frame < info.frame_count)
            .ok_or(DataError::FrameOutOfRange { run, frame })?;

        self.cache.load(&info.name, frame)
    }
}
