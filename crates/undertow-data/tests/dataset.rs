use std::path::Path;

use ndarray::Array3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use undertow_data::{
    compute_statistics, AugmentConfig, Batch, BatchBuilder, CompressionConfig, DataError, Dataset, DatasetConfig,
    SampleRef, StatKey,
};
use undertow_fields::{FieldKey, MacDivergence};
use undertow_io::{encode_frame_file, FrameRecord};

const SHAPE: (usize, usize, usize) = (6, 6, 6);

/// Writes a run whose target velocity is either divergence-free or strongly divergent.
fn write_run(dataset_dir: &Path, name: &str, frames: usize, divergent: bool, rng: &mut StdRng) {
    let dir = dataset_dir.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let geometry = Array3::<f32>::zeros(SHAPE);

    for frame in 0..frames {
        let pressure = Array3::from_shape_simple_fn(SHAPE, || rng.gen_range(-1.0..1.0));
        let ux = if divergent {
            Array3::from_shape_fn(SHAPE, |(_, _, x)| 500.0 * x as f32)
        } else {
            Array3::from_elem(SHAPE, 0.5)
        };
        let uy = Array3::from_shape_fn(SHAPE, |(z, _, x)| (z + x) as f32);
        let uz = Array3::from_shape_fn(SHAPE, |(_, y, _)| -(y as f32));

        encode_frame_file(
            dir.join(format!("{frame:06}.bin")),
            &FrameRecord {
                time: frame as f32 * 0.1,
                pressure: pressure.view(),
                velocity: [ux.view(), uy.view(), uz.view()],
                geometry: geometry.view(),
            },
        )
        .unwrap();

        let noise = Array3::from_shape_simple_fn(SHAPE, || rng.gen_range(-3.0..3.0));
        encode_frame_file(
            dir.join(format!("{frame:06}_divergent.bin")),
            &FrameRecord {
                time: frame as f32 * 0.1,
                pressure: pressure.view(),
                velocity: [noise.view(), uy.view(), noise.view()],
                geometry: geometry.view(),
            },
        )
        .unwrap();
    }
}

fn config(root: &Path) -> DatasetConfig {
    DatasetConfig {
        data_root: root.to_path_buf(),
        dataset: String::from("runs"),
        batch_size: 4,
        workers: 2,
        ..Default::default()
    }
}

fn dataset(root: &Path) -> Dataset {
    let config = config(root);
    let mut rng = StdRng::seed_from_u64(42);
    write_run(&config.dataset_dir(), "tr_000000", 5, false, &mut rng);
    write_run(&config.dataset_dir(), "tr_000001", 5, true, &mut rng);

    Dataset::build(config, &MacDivergence).unwrap()
}

#[test]
fn divergent_run_is_dropped_and_the_rest_is_indexed() {
    let root = tempfile::tempdir().unwrap();
    let dataset = dataset(root.path());

    assert_eq!(dataset.nsamples(), 5);
    assert_eq!(dataset.rejected(), ["tr_000001"]);
    assert_eq!(dataset.shape(), (4, 4, 4));

    let refs: Vec<SampleRef> = dataset.index().iter().collect();
    assert_eq!(refs, (0..5).map(|frame| SampleRef { run: 0, frame }).collect::<Vec<_>>());
}

#[test]
fn every_sample_is_batched_exactly_once() {
    let root = tempfile::tempdir().unwrap();
    let dataset = dataset(root.path());

    let mut builder = BatchBuilder::new(1);
    let mut batch = Batch::for_dataset(&dataset, 4);
    let mut seen = Vec::new();

    for start in (0..dataset.nsamples()).step_by(batch.capacity()) {
        let samples: Vec<usize> = (start..(start + batch.capacity()).min(dataset.nsamples())).collect();
        builder.fill(&dataset, &mut batch, &samples, false, &AugmentConfig::default()).unwrap();

        for (row, &sample) in samples.iter().enumerate() {
            let expected = dataset.load_sample(sample).unwrap();
            assert_eq!(batch.field(FieldKey::Pressure, row).unwrap(), expected[FieldKey::Pressure]);
            seen.push(sample);
        }
    }

    assert_eq!(seen, (0..5).collect::<Vec<_>>());
}

#[test]
fn statistics_cover_every_sample() {
    let root = tempfile::tempdir().unwrap();
    let dataset = dataset(root.path());

    let stats = compute_statistics(&dataset, 2, 3, &MacDivergence).unwrap();

    assert_eq!(stats.samples, (0..5).collect::<Vec<_>>());
    for key in stats.keys.values() {
        assert_eq!(key.mean.len(), 5);
        assert_eq!(key.total.count, 5 * 64);
    }

    // Constant Ux and Uy/Uz independent of their own axis: no target divergence.
    let div = &stats.keys[&StatKey::Divergence { divergent: false }];
    assert!(div.l2.iter().all(|&l2| l2 == 0.0));
}

#[test]
fn compressed_cache_stays_within_accuracy() {
    let root = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let raw_config = config(root.path());
    write_run(&raw_config.dataset_dir(), "tr_000000", 2, false, &mut rng);

    let raw = Dataset::build(raw_config.clone(), &MacDivergence).unwrap();

    let compressed_config = DatasetConfig {
        cache_dir: Some(root.path().join("compressed")),
        compression: CompressionConfig { enabled: true, accuracy: 1e-3 },
        ..raw_config
    };
    let compressed = Dataset::build(compressed_config, &MacDivergence).unwrap();

    for sample in 0..raw.nsamples() {
        let exact = raw.load_sample(sample).unwrap();
        let lossy = compressed.load_sample(sample).unwrap();

        for (key, field) in exact.iter() {
            let bound = 1e-3 * field.iter().fold(0f32, |m, v| m.max(v.abs())) + 1e-6;
            let error = field
                .iter()
                .zip(lossy[key].iter())
                .fold(0f32, |m, (a, b)| m.max((a - b).abs()));

            assert!(error <= bound, "{} error {error} exceeds {bound}", key.name());
        }
    }
}

#[test]
fn out_of_range_sample_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let dataset = dataset(root.path());

    let mut batch = Batch::for_dataset(&dataset, 2);
    let result = BatchBuilder::new(0).fill(&dataset, &mut batch, &[1, 5], false, &AugmentConfig::default());

    assert!(matches!(result, Err(DataError::SampleOutOfRange { index: 5, len: 5 })));
}
