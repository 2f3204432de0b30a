use std::path::{Path, PathBuf};

use ndarray::Array3;
use tracing::info;
use undertow_data::{compute_statistics, Batch, BatchBuilder, Dataset, DatasetConfig, StatKey};
use undertow_fields::{Axis, FieldKey, MacDivergence};
use undertow_io::{encode_frame_file, FrameRecord};

use crate::{
    error::{io_error, AppError},
    replay::{replay, CachedRun},
};

pub fn build(config: DatasetConfig, force: bool) -> Result<Dataset, AppError> {
    let dataset = if force {
        Dataset::build(config, &MacDivergence)?
    } else {
        Dataset::load_or_build(config, &MacDivergence)?
    };

    for run in dataset.runs() {
        info!(run = %run.name, frames = run.frame_count, max_divergence = run.max_divergence, "accepted");
    }
    info!(
        samples = dataset.nsamples(),
        rejected = dataset.rejected().len(),
        dims = %dataset.dims(),
        min_value = dataset.min_value(),
        "dataset"
    );

    Ok(dataset)
}

pub fn stats(config: DatasetConfig) -> Result<(), AppError> {
    let (batch_size, workers) = (config.batch_size, config.workers);
    let dataset = Dataset::load_or_build(config, &MacDivergence)?;
    let statistics = compute_statistics(&dataset, batch_size, workers, &MacDivergence)?;

    println!("{:<10} {:>14} {:>14} {:>14}", "field", "mean", "std", "l2");
    for (key, stats) in &statistics.keys {
        let total = stats.total.stats();
        println!("{:<10} {:>14.6e} {:>14.6e} {:>14.6e}", key.name(), total.mean, total.std, total.l2);
    }

    if let Some(div) = statistics.keys.get(&StatKey::Divergence { divergent: false }) {
        let worst = div
            .l2
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1));

        if let Some((position, l2)) = worst {
            info!(sample = statistics.samples[position], l2, "largest target divergence");
        }
    }

    Ok(())
}

pub fn batch(config: DatasetConfig, start: usize, dump: Option<PathBuf>) -> Result<(), AppError> {
    let dataset = Dataset::load_or_build(config, &MacDivergence)?;
    let params = dataset.config().augment;

    let end = (start + dataset.config().batch_size).min(dataset.nsamples());
    let samples: Vec<usize> = (start..end.max(start)).collect();

    let mut builder = BatchBuilder::new(dataset.config().seed);
    let mut batch = Batch::for_dataset(&dataset, dataset.config().batch_size);
    let applied = builder.fill(&dataset, &mut batch, &samples, params.enabled, &params)?;

    for (&sample, augmentation) in samples.iter().zip(&applied) {
        info!(sample, flips = ?augmentation.flips.as_slice(), "filled");
    }

    if let Some(dir) = dump {
        dump_batch(&batch, &samples, &dir)?;
        info!(samples = samples.len(), dir = %dir.display(), "dumped batch");
    }

    Ok(())
}

/// Writes each filled row back out as a `<sample>.bin` / `<sample>_divergent.bin` frame pair.
fn dump_batch(batch: &Batch, samples: &[usize], dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let [_, nz, ny, nx] = batch.sample_shape();
    let zero = Array3::zeros((nz, ny, nx));

    for (row, &sample) in samples.iter().enumerate() {
        let field = |key: FieldKey| batch.field(key, row).unwrap_or_else(|| zero.view());

        for (divergent, suffix) in [(false, ""), (true, "_divergent")] {
            let record = FrameRecord {
                time: sample as f32,
                pressure: field(FieldKey::pressure(divergent)),
                velocity: Axis::ALL.map(|axis| field(FieldKey::velocity(axis, divergent))),
                geometry: field(FieldKey::Geometry),
            };

            encode_frame_file(dir.join(format!("{sample:06}{suffix}.bin")), &record)?;
        }
    }

    Ok(())
}

pub fn replay_run(config: DatasetConfig, run: Option<String>, output: PathBuf, every: usize) -> Result<(), AppError> {
    let dataset = Dataset::load_or_build(config, &MacDivergence)?;

    let mut source = match run {
        Some(name) => CachedRun::new(&dataset, &name)?,
        None => CachedRun::first(&dataset)?,
    };
    let name = source.name().to_string();

    let summary = replay(&mut source, &output, every)?;
    info!(run = %name, steps = summary.steps, saved = summary.saved, "replay finished");

    Ok(())
}
