use std::{
    collections::{BTreeMap, VecDeque},
    ops::Range,
    sync::{mpsc, Mutex},
    thread,
};

use ndarray::{Array3, ArrayView3};
use tracing::{debug, info};
use undertow_fields::{Axis, Divergence, FieldKey};

use crate::{
    batch::{Batch, BatchBuilder},
    config::AugmentConfig,
    dataset::Dataset,
    error::DataError,
    progress::progress_bar,
};

/// A quantity summarised per sample: a stored field or the divergence of a velocity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKey {
    Field(FieldKey),
    Divergence { divergent: bool },
}

impl StatKey {
    /// Every key that carries data for the given dimensionality.
    pub fn keys(two_dim: bool) -> Vec<StatKey> {
        FieldKey::active(two_dim)
            .map(StatKey::Field)
            .chain([StatKey::Divergence { divergent: false }, StatKey::Divergence { divergent: true }])
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            StatKey::Field(key) => key.name(),
            StatKey::Divergence { divergent: false } => "divU",
            StatKey::Divergence { divergent: true } => "divUDiv",
        }
    }
}

/// Mean, standard deviation and L2 norm of one flattened field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleStats {
    pub mean: f32,
    pub std: f32,
    pub l2: f32,
}

/// Count, sum and sum of squares. Merging is plain addition, so the result does not depend on
/// the order in which batches finish.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
}

impl Moments {
    pub fn of<'a, I: IntoIterator<Item = &'a f32>>(values: I) -> Moments {
        values.into_iter().fold(Moments::default(), |m, &v| Moments {
            count: m.count + 1,
            sum: m.sum + v as f64,
            sum_sq: m.sum_sq + (v as f64) * (v as f64),
        })
    }

    pub fn merge(&mut self, other: &Moments) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation: divides by `count`, not `count - 1`.
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let mean = self.mean();
        (self.sum_sq / self.count as f64 - mean * mean).max(0.0).sqrt()
    }

    pub fn l2(&self) -> f64 {
        self.sum_sq.sqrt()
    }

    pub fn stats(&self) -> SampleStats {
        SampleStats {
            mean: self.mean() as f32,
            std: self.std() as f32,
            l2: self.l2() as f32,
        }
    }
}

/// Per-sample sequences for one key, in sample order, plus the dataset-wide reduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyStatistics {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub l2: Vec<f32>,
    pub total: Moments,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    /// Every visited sample, in order.
    pub samples: Vec<usize>,
    pub keys: BTreeMap<StatKey, KeyStatistics>,
}

struct SampleRecord {
    sample: usize,
    moments: Vec<(StatKey, Moments)>,
}

/// Splits `0..len` into consecutive ranges of at most `batch_size` samples.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// One worker's view of the pipeline. Each worker owns its builder and buffers.
struct Worker<'a, D> {
    dataset: &'a Dataset,
    divergence: &'a D,
    keys: Vec<StatKey>,
    builder: BatchBuilder,
    batch: Batch,
    /// Stands in for the missing `z` velocity of 2D data.
    zero: Array3<f32>,
}

impl<'a, D: Divergence> Worker<'a, D> {
    fn new(dataset: &'a Dataset, divergence: &'a D, batch_size: usize) -> Worker<'a, D> {
        Self {
            dataset,
            divergence,
            keys: StatKey::keys(dataset.is_2d()),
            builder: BatchBuilder::new(dataset.config().seed),
            batch: Batch::for_dataset(dataset, batch_size),
            zero: Array3::zeros(dataset.shape()),
        }
    }

    fn velocity(&self, row: usize, divergent: bool) -> [ArrayView3<f32>; 3] {
        Axis::ALL.map(|axis| {
            self.batch
                .field(FieldKey::velocity(axis, divergent), row)
                .unwrap_or_else(|| self.zero.view())
        })
    }

    fn process(&mut self, range: Range<usize>) -> Result<Vec<SampleRecord>, DataError> {
        let samples: Vec<usize> = range.collect();
        self.builder.fill(self.dataset, &mut self.batch, &samples, false, &AugmentConfig::default())?;

        let mut records = Vec::with_capacity(samples.len());

        for (row, &sample) in samples.iter().enumerate() {
            let geometry = self.batch.geometry.index_axis(ndarray::Axis(0), row);

            let moments = self
                .keys
                .iter()
                .map(|&key| {
                    let moments = match key {
                        StatKey::Field(field) => self
                            .batch
                            .field(field, row)
                            .map(|view| Moments::of(view.iter()))
                            .unwrap_or_default(),
                        StatKey::Divergence { divergent } => {
                            let div = self.divergence.divergence(self.velocity(row, divergent), geometry);
                            Moments::of(div.iter())
                        }
                    };

                    (key, moments)
                })
                .collect();

            records.push(SampleRecord { sample, moments });
        }

        Ok(records)
    }
}

/// Streams every sample through the batch builder and summarises each field and velocity
/// divergence per sample.
///
/// Batches of `batch_size` consecutive samples are handed out from a shared queue to `workers`
/// threads. Results are merged by sample index, so the output is identical for any worker count.
pub fn compute_statistics<D: Divergence + Sync>(
    dataset: &Dataset,
    batch_size: usize,
    workers: usize,
    divergence: &D,
) -> Result<Statistics, DataError> {
    if dataset.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    let batch_size = batch_size.max(1);
    let ranges = partition(dataset.nsamples(), batch_size);
    let workers = workers.clamp(1, ranges.len());
    info!(samples = dataset.nsamples(), batches = ranges.len(), workers, "gathering statistics");

    let queue = Mutex::new(VecDeque::from(ranges));
    let progress = progress_bar("Gathering statistics", dataset.nsamples() as u64);
    let (tx, rx) = mpsc::channel();

    let mut records = Vec::with_capacity(dataset.nsamples());

    thread::scope(|scope| -> Result<(), DataError> {
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let tx = tx.clone();
                let queue = &queue;

                scope.spawn(move || {
                    let mut worker = Worker::new(dataset, divergence, batch_size);

                    loop {
                        let next = match queue.lock() {
                            Ok(mut queue) => queue.pop_front(),
                            Err(_) => None,
                        };
                        let Some(range) = next else {
                            break;
                        };

                        debug!(worker = id, start = range.start, end = range.end, "processing batch");
                        let result = worker.process(range);
                        let failed = result.is_err();

                        if tx.send(result).is_err() || failed {
                            break;
                        }
                    }
                })
            })
            .collect();

        drop(tx);

        let mut first_error = None;
        for result in rx {
            match result {
                Ok(batch) => {
                    progress.inc(batch.len() as u64);
                    records.extend(batch);
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                    // Stop handing out work; workers finish their current batch and exit.
                    if let Ok(mut queue) = queue.lock() {
                        queue.clear();
                    }
                }
            }
        }

        // Join every handle before reporting a panic.
        let panicked = handles.into_iter().map(|handle| handle.join()).filter(Result::is_err).count();
        if panicked > 0 {
            return Err(DataError::WorkerPanicked);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })?;

    progress.finish();

    Ok(merge(records, dataset.is_2d()))
}

fn merge(mut records: Vec<SampleRecord>, two_dim: bool) -> Statistics {
    records.sort_by_key(|record| record.sample);

    let mut keys: BTreeMap<StatKey, KeyStatistics> = StatKey::keys(two_dim)
        .into_iter()
        .map(|key| (key, KeyStatistics::default()))
        .collect();

    let mut samples = Vec::with_capacity(records.len());

    for record in records {
        samples.push(record.sample);

        for (key, moments) in record.moments {
            let entry = keys.entry(key).or_default();
            let stats = moments.stats();

            entry.mean.push(stats.mean);
            entry.std.push(stats.std);
            entry.l2.push(stats.l2);
            entry.total.merge(&moments);
        }
    }

    Statistics { samples, keys }
}
