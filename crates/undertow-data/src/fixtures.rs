//! Synthetic runs written in the on-disk frame format.

use std::path::Path;

use ndarray::Array3;
use undertow_io::{encode_frame_file, FrameRecord};

use crate::config::DatasetConfig;

/// Writes `frames` frame pairs into `<dataset_dir>/<name>`.
///
/// Target pressure is `marker + frame`, so every sample can be told apart after loading. With
/// `divergent` set, the target x velocity grows by 200 per cell, far above the default threshold.
pub fn write_run(dataset_dir: &Path, name: &str, frames: usize, shape: (usize, usize, usize), marker: f32, divergent: bool) {
    let dir = dataset_dir.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let zero = Array3::<f32>::zeros(shape);
    let geometry = zero.clone();

    for frame in 0..frames {
        let pressure = Array3::from_elem(shape, marker + frame as f32);
        let ux = if divergent {
            Array3::from_shape_fn(shape, |(_, _, x)| 200.0 * x as f32)
        } else {
            Array3::from_elem(shape, 1.0)
        };
        let uy = Array3::from_shape_fn(shape, |(z, y, x)| (z + 2 * y + 3 * x) as f32);

        let target = FrameRecord {
            time: frame as f32,
            pressure: pressure.view(),
            velocity: [ux.view(), uy.view(), zero.view()],
            geometry: geometry.view(),
        };
        encode_frame_file(dir.join(format!("{frame:06}.bin")), &target).unwrap();

        let pressure_div = Array3::from_elem(shape, -(marker + frame as f32));
        let ux_div = Array3::from_shape_fn(shape, |(z, y, x)| (x * y + z) as f32);
        let input = FrameRecord {
            time: frame as f32,
            pressure: pressure_div.view(),
            velocity: [ux_div.view(), uy.view(), ux_div.view()],
            geometry: geometry.view(),
        };
        encode_frame_file(dir.join(format!("{frame:06}_divergent.bin")), &input).unwrap();
    }
}

pub fn config(root: &Path) -> DatasetConfig {
    DatasetConfig {
        data_root: root.to_path_buf(),
        dataset: String::from("synthetic"),
        run_prefix: String::from("tr"),
        ..Default::default()
    }
}
