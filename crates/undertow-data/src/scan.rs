use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use glam::UVec3;
use indicatif::ProgressIterator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use undertow_fields::{Divergence, FieldKey, FieldSet};
use undertow_io::{decode_frame_file, FrameData};

use crate::{
    cache::FrameCache,
    config::DatasetConfig,
    error::{io_error, DataError},
    progress::progress_bar,
};

/// A target frame file and its divergent counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    /// Numeric id shared by both file names.
    pub number: u64,
    pub main: PathBuf,
    pub divergent: PathBuf,
}

/// A run that passed validation and was written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run directory name, also the cache key prefix.
    pub name: String,
    pub frame_count: usize,
    /// Grid size as `(x, y, z)`, after cropping.
    pub dims: UVec3,
    /// Largest absolute divergence of the target velocity over all frames.
    pub max_divergence: f32,
}

/// The frames of one run, fully loaded.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub name: String,
    pub frames: Vec<FieldSet>,
    /// Minimum over pressure and velocity of every frame, target and divergent.
    pub min_value: f32,
}

impl LoadedRun {
    pub fn dims(&self) -> Option<UVec3> {
        self.frames.first().map(FieldSet::dims)
    }

    /// Largest absolute divergence of the target velocity, over every cell of every frame.
    pub fn max_divergence<D: Divergence>(&self, divergence: &D) -> f32 {
        self.frames
            .iter()
            .map(|frame| divergence.max_abs_divergence(frame.velocity(false), frame[FieldKey::Geometry].view()))
            .fold(0.0, f32::max)
    }
}

/// Result of scanning a dataset directory.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub runs: Vec<RunInfo>,
    /// Names of runs dropped for exceeding the divergence threshold.
    pub rejected: Vec<String>,
    /// Grid size shared by every accepted run, zero when none was accepted.
    pub dims: UVec3,
    pub two_dim: bool,
    /// Minimum value over accepted runs, infinite when none was accepted.
    pub min_value: f32,
}

/// Run subdirectories of `dataset_dir` whose names start with `prefix`, sorted by name.
pub fn discover_runs(dataset_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, DataError> {
    let mut runs = Vec::new();

    for entry in fs::read_dir(dataset_dir).map_err(io_error(dataset_dir))? {
        let path = entry.map_err(io_error(dataset_dir))?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix));

        if matches && path.is_dir() {
            runs.push(path);
        }
    }

    runs.sort();
    Ok(runs)
}

/// Splits a frame file name into its numeric id and whether it is the divergent variant.
///
/// Target frames are named `<digits>.bin`, divergent frames `<digits>_divergent.bin`.
fn frame_number(path: &Path) -> Option<(u64, bool)> {
    if path.extension()? != "bin" {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    let (digits, divergent) = match stem.strip_suffix("_divergent") {
        Some(digits) => (digits, true),
        None => (stem, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((digits.parse().ok()?, divergent))
}

fn run_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Pairs every target frame file in `run_dir` with its divergent counterpart, ordered by id.
pub fn pair_frames(run_dir: &Path) -> Result<Vec<FramePair>, DataError> {
    let mut main = BTreeMap::new();
    let mut divergent = BTreeMap::new();

    for entry in fs::read_dir(run_dir).map_err(io_error(run_dir))? {
        let path = entry.map_err(io_error(run_dir))?.path();

        match frame_number(&path) {
            Some((number, false)) => main.insert(number, path),
            Some((number, true)) => divergent.insert(number, path),
            None => None,
        };
    }

    let run = run_name(run_dir);
    if main.len() != divergent.len() {
        return Err(DataError::FrameCountMismatch {
            run,
            main: main.len(),
            divergent: divergent.len(),
        });
    }

    main.into_iter()
        .map(|(number, main)| match divergent.remove(&number) {
            Some(divergent) => Ok(FramePair { number, main, divergent }),
            None => Err(DataError::UnpairedFrame { run: run.clone(), frame: number }),
        })
        .collect()
}

fn decode(path: &Path, border: usize) -> Result<FrameData, DataError> {
    decode_frame_file(path, border).map_err(|source| DataError::Frame {
        path: path.to_path_buf(),
        source,
    })
}

/// Decodes both files of a pair into one field set. The target file supplies geometry.
pub fn load_frame_pair(pair: &FramePair, border: usize) -> Result<(FieldSet, f32), DataError> {
    let target = decode(&pair.main, border)?;
    let input = decode(&pair.divergent, border)?;

    if input.dims() != target.dims() {
        return Err(DataError::DimensionMismatch {
            what: pair.divergent.display().to_string(),
            expected: target.dims(),
            found: input.dims(),
        });
    }

    let min_value = target.min_value.min(input.min_value);
    let FrameData { time, pressure, velocity: [ux, uy, uz], geometry, .. } = target;
    let FrameData { pressure: p_div, velocity: [ux_div, uy_div, uz_div], .. } = input;

    let mut slots = [
        Some(pressure),
        Some(ux),
        Some(uy),
        Some(uz),
        Some(geometry),
        Some(p_div),
        Some(ux_div),
        Some(uy_div),
        Some(uz_div),
    ];

    let fields = FieldSet::from_fn(time, |key| {
        slots[key.index()].take().unwrap_or_default()
    });

    Ok((fields, min_value))
}

/// Discovers, loads and validates runs, caching the frames of every accepted run.
pub struct RunScanner<'a, D> {
    config: &'a DatasetConfig,
    divergence: &'a D,
}

impl<'a, D: Divergence> RunScanner<'a, D> {
    pub fn new(config: &'a DatasetConfig, divergence: &'a D) -> RunScanner<'a, D> {
        Self { config, divergence }
    }

    /// Loads every frame of a run after the ignored leading frames.
    pub fn load_run(&self, dir: &Path) -> Result<LoadedRun, DataError> {
        let name = run_name(dir);
        let pairs = pair_frames(dir)?;
        debug!(run = %name, pairs = pairs.len(), "found frame pairs");

        let mut frames = Vec::with_capacity(pairs.len().saturating_sub(self.config.ignore_frames));
        let mut min_value = f32::INFINITY;

        for pair in pairs.iter().skip(self.config.ignore_frames) {
            let (fields, min) = load_frame_pair(pair, self.config.border_width)?;

            if let Some(first) = frames.first().map(FieldSet::dims) {
                if fields.dims() != first {
                    return Err(DataError::DimensionMismatch {
                        what: pair.main.display().to_string(),
                        expected: first,
                        found: fields.dims(),
                    });
                }
            }

            min_value = min_value.min(min);
            frames.push(fields);
        }

        Ok(LoadedRun { name, frames, min_value })
    }

    pub fn scan(&self, cache: &FrameCache) -> Result<ScanOutcome, DataError> {
        let dataset_dir = self.config.dataset_dir();
        let dirs = discover_runs(&dataset_dir, &self.config.run_prefix)?;
        info!(dataset = %dataset_dir.display(), runs = dirs.len(), "scanning runs");

        let mut runs = Vec::new();
        let mut rejected = Vec::new();
        let mut min_value = f32::INFINITY;

        let progress = progress_bar("Scanning runs", dirs.len() as u64);

        for dir in dirs.iter().progress_with(progress) {
            let run = self.load_run(dir)?;

            let Some(dims) = run.dims() else {
                warn!(run = %run.name, "run has no frames left after skipping, ignoring it");
                continue;
            };

            let max_divergence = run.max_divergence(self.divergence);
            if max_divergence > self.config.divergence_threshold {
                warn!(
                    run = %run.name,
                    max_divergence,
                    threshold = self.config.divergence_threshold,
                    "target velocity diverges, dropping run"
                );
                rejected.push(run.name);
                continue;
            }

            for (frame, fields) in run.frames.iter().enumerate() {
                cache.store(&run.name, frame, fields)?;
            }

            min_value = min_value.min(run.min_value);
            info!(run = %run.name, frames = run.frames.len(), max_divergence, "accepted run");

            runs.push(RunInfo {
                name: run.name.clone(),
                frame_count: run.frames.len(),
                dims,
                max_divergence,
            });

            // Release the run's frames before the next one is loaded.
            drop(run);
        }

        let dims = runs.first().map(|run| run.dims).unwrap_or(UVec3::ZERO);
        if let Some(run) = runs.iter().find(|run| run.dims != dims) {
            return Err(DataError::DimensionMismatch {
                what: format!("run {}", run.name),
                expected: dims,
                found: run.dims,
            });
        }

        Ok(ScanOutcome {
            runs,
            rejected,
            dims,
            two_dim: dims.z == 1,
            min_value,
        })
    }
}
