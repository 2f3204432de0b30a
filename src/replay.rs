use std::{fs::File, path::{Path, PathBuf}};

use glam::UVec3;
use indicatif::ProgressIterator;
use tracing::info;
use undertow_data::{progress::progress_bar, Dataset};
use undertow_fields::{FieldKey, FieldSet};
use undertow_io::voxel_box::{write_geometry, VoxelBoxWriter};

use crate::error::{io_error, AppError};

/// Supplies the simulation state one step at a time.
pub trait FrameSource {
    /// Grid size as `(x, y, z)`.
    fn dims(&self) -> UVec3;

    fn frame_count(&self) -> usize;

    /// Produces the state of step `frame`. Steps are requested in order.
    fn step(&mut self, frame: usize) -> Result<FieldSet, AppError>;
}

/// Replays the cached target frames of one accepted run.
pub struct CachedRun<'a> {
    dataset: &'a Dataset,
    run: usize,
}

impl<'a> CachedRun<'a> {
    pub fn new(dataset: &'a Dataset, name: &str) -> Result<CachedRun<'a>, AppError> {
        let run = dataset
            .runs()
            .iter()
            .position(|info| info.name == name)
            .ok_or_else(|| AppError::UnknownRun(name.to_string()))?;

        Ok(Self { dataset, run })
    }

    pub fn first(dataset: &'a Dataset) -> Result<CachedRun<'a>, AppError> {
        if dataset.runs().is_empty() {
            return Err(undertow_data::DataError::EmptyDataset.into());
        }

        Ok(Self { dataset, run: 0 })
    }

    pub fn name(&self) -> &str {
        &self.dataset.runs()[self.run].name
    }
}

impl FrameSource for CachedRun<'_> {
    fn dims(&self) -> UVec3 {
        self.dataset.dims()
    }

    fn frame_count(&self) -> usize {
        self.dataset.runs()[self.run].frame_count
    }

    fn step(&mut self, frame: usize) -> Result<FieldSet, AppError> {
        Ok(self.dataset.load_frame(self.run, frame)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub saved: usize,
}

pub fn pressure_path(output: &Path) -> PathBuf {
    output.join("pressure.vbox")
}

pub fn geometry_path(output: &Path) -> PathBuf {
    output.join("geom.vbox")
}

/// Steps through every frame of `source`, appending the pressure of every `every`th step to
/// `<output>/pressure.vbox`. The geometry of the first step goes to `<output>/geom.vbox`.
pub fn replay<S: FrameSource>(source: &mut S, output: &Path, every: usize) -> Result<ReplaySummary, AppError> {
    std::fs::create_dir_all(output).map_err(io_error(output))?;

    let frames = source.frame_count();
    let pressure_path = pressure_path(output);
    let file = File::create(&pressure_path).map_err(io_error(&pressure_path))?;
    let mut pressure = VoxelBoxWriter::new(file, source.dims(), frames, every)?;

    info!(frames, every, saved = pressure.frame_count(), output = %output.display(), "replaying");

    let progress = progress_bar("Replaying", frames as u64);

    let mut saved = 0;

    for frame in (0..frames).progress_with(progress) {
        let state = source.step(frame)?;

        if frame == 0 {
            let geometry_path = geometry_path(output);
            let file = File::create(&geometry_path).map_err(io_error(&geometry_path))?;
            write_geometry(file, state[FieldKey::Geometry].view())?;
        }

        if pressure.push_frame(state[FieldKey::Pressure].view())? {
            saved += 1;
        }

        // Release the step's volumes before the next one is produced.
        drop(state);
    }

    pressure.finish()?;

    Ok(ReplaySummary { steps: frames, saved })
}
