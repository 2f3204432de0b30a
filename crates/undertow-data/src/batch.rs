use glam::UVec3;
use ndarray::{s, Array3, Array4, Array5, ArrayView3, Axis as ArrayAxis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use undertow_fields::{augment::{flip_all, FlipAxes}, Axis, FieldKey, FieldSet};

use crate::{config::AugmentConfig, dataset::Dataset, error::DataError};

/// Reusable batch buffers, filled in place.
///
/// Scalar fields have shape `(capacity, nz, ny, nx)`, velocities `(capacity, channels, nz, ny, nx)`
/// with two channels for 2D data and three for 3D.
#[derive(Debug, Clone)]
pub struct Batch {
    pub pressure_div: Array4<f32>,
    pub velocity_div: Array5<f32>,
    pub geometry: Array4<f32>,
    pub pressure: Array4<f32>,
    pub velocity: Array5<f32>,
}

impl Batch {
    pub fn new(capacity: usize, dims: UVec3, two_dim: bool) -> Batch {
        let (nz, ny, nx) = (dims.z as usize, dims.y as usize, dims.x as usize);
        let channels = if two_dim { 2 } else { 3 };

        Self {
            pressure_div: Array4::zeros((capacity, nz, ny, nx)),
            velocity_div: Array5::zeros((capacity, channels, nz, ny, nx)),
            geometry: Array4::zeros((capacity, nz, ny, nx)),
            pressure: Array4::zeros((capacity, nz, ny, nx)),
            velocity: Array5::zeros((capacity, channels, nz, ny, nx)),
        }
    }

    /// Buffers sized for `dataset`.
    pub fn for_dataset(dataset: &Dataset, capacity: usize) -> Batch {
        Self::new(capacity, dataset.dims(), dataset.is_2d())
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.pressure.dim().0
    }

    /// Number of velocity components per sample.
    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.velocity.dim().1
    }

    /// `[channels, nz, ny, nx]` of one sample.
    pub fn sample_shape(&self) -> [usize; 4] {
        let (_, c, nz, ny, nx) = self.velocity.dim();
        [c, nz, ny, nx]
    }

    /// View of one field of one row, or `None` for a velocity component the batch does not carry.
    pub fn field(&self, key: FieldKey, row: usize) -> Option<ArrayView3<f32>> {
        let channels = self.channels();
        let view = match key {
            FieldKey::Pressure => self.pressure.index_axis(ArrayAxis(0), row),
            FieldKey::PressureDiv => self.pressure_div.index_axis(ArrayAxis(0), row),
            FieldKey::Geometry => self.geometry.index_axis(ArrayAxis(0), row),
            FieldKey::VelocityX
            | FieldKey::VelocityY
            | FieldKey::VelocityZ
            | FieldKey::VelocityDivX
            | FieldKey::VelocityDivY
            | FieldKey::VelocityDivZ => {
                let axis = key.velocity_axis()?;
                if axis.component() >= channels {
                    return None;
                }

                let velocity = if key.is_divergent() { &self.velocity_div } else { &self.velocity };
                velocity.slice(s![row, axis.component(), .., .., ..])
            }
        };

        Some(view)
    }

    fn write_sample(&mut self, row: usize, fields: &FieldSet) {
        self.pressure.index_axis_mut(ArrayAxis(0), row).assign(&fields[FieldKey::Pressure]);
        self.pressure_div.index_axis_mut(ArrayAxis(0), row).assign(&fields[FieldKey::PressureDiv]);
        self.geometry.index_axis_mut(ArrayAxis(0), row).assign(&fields[FieldKey::Geometry]);

        for &axis in &Axis::ALL[..self.channels()] {
            let c = axis.component();
            self.velocity
                .slice_mut(s![row, c, .., .., ..])
                .assign(&fields[FieldKey::velocity(axis, false)]);
            self.velocity_div
                .slice_mut(s![row, c, .., .., ..])
                .assign(&fields[FieldKey::velocity(axis, true)]);
        }
    }
}

/// Augmentation actually applied to one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAugmentation {
    pub rotation: f32,
    pub scale: f32,
    pub translation: [f32; 3],
    pub flips: FlipAxes,
}

impl AppliedAugmentation {
    pub fn flipped(flips: FlipAxes) -> AppliedAugmentation {
        Self {
            rotation: 0.0,
            scale: 1.0,
            translation: [0.0; 3],
            flips,
        }
    }
}

/// Loads samples from a [`Dataset`] into [`Batch`] buffers, optionally mirroring them.
pub struct BatchBuilder {
    rng: StdRng,
    /// Staging buffer for flips, reused across calls.
    scratch: Array3<f32>,
}

impl BatchBuilder {
    pub fn new(seed: u64) -> BatchBuilder {
        Self {
            rng: StdRng::seed_from_u64(seed),
            scratch: Array3::zeros((0, 0, 0)),
        }
    }

    fn draw_flips(&mut self, probability: f32, two_dim: bool) -> FlipAxes {
        Axis::active(two_dim)
            .iter()
            .copied()
            .filter(|_| self.rng.gen_bool(probability as f64))
            .collect()
    }

    /// Fills the first `samples.len()` rows of `batch`; later rows keep their previous contents.
    ///
    /// With `augment` set, each sample is mirrored along every axis independently with
    /// `params.flip_probability`, and the same flips are applied to its input and target fields.
    pub fn fill(
        &mut self,
        dataset: &Dataset,
        batch: &mut Batch,
        samples: &[usize],
        augment: bool,
        params: &AugmentConfig,
    ) -> Result<Vec<AppliedAugmentation>, DataError> {
        if augment {
            params.validate()?;
        }

        if dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        if samples.len() > batch.capacity() {
            return Err(DataError::BatchOverflow {
                samples: samples.len(),
                capacity: batch.capacity(),
            });
        }

        let (nz, ny, nx) = dataset.shape();
        let expected = [if dataset.is_2d() { 2 } else { 3 }, nz, ny, nx];
        if batch.sample_shape() != expected {
            return Err(DataError::BatchShape {
                expected,
                found: batch.sample_shape(),
            });
        }

        let mut applied = Vec::with_capacity(samples.len());

        for (row, &sample) in samples.iter().enumerate() {
            let mut fields = dataset.load_sample(sample)?;

            let flips = if augment {
                self.draw_flips(params.flip_probability, dataset.is_2d())
            } else {
                FlipAxes::new()
            };
            flip_all(&mut fields, &flips, &mut self.scratch);

            batch.write_sample(row, &fields);
            applied.push(AppliedAugmentation::flipped(flips));
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::s;
    use undertow_fields::MacDivergence;

    use super::*;
    use crate::fixtures::{config, write_run};

    fn dataset(root: &std::path::Path, shape: (usize, usize, usize)) -> Dataset {
        let config = config(root);
        write_run(&config.dataset_dir(), "tr_000000", 3, shape, 0.0, false);
        write_run(&config.dataset_dir(), "tr_000001", 3, shape, 10.0, false);
        Dataset::build(config, &MacDivergence).unwrap()
    }

    #[test]
    fn rows_follow_the_sample_list() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (6, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 4);
        let mut builder = BatchBuilder::new(0);

        let applied = builder
            .fill(&dataset, &mut batch, &[4, 1], false, &AugmentConfig::default())
            .unwrap();

        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|a| a.flips.is_empty() && a.scale == 1.0));
        assert_eq!(batch.pressure[(0, 0, 0, 0)], 11.0);
        assert_eq!(batch.pressure_div[(0, 0, 0, 0)], -11.0);
        assert_eq!(batch.pressure[(1, 0, 0, 0)], 1.0);
        assert_eq!(batch.channels(), 3);

        let target = dataset.load_sample(4).unwrap();
        assert_eq!(batch.velocity.slice(s![0, 1, .., .., ..]), target[FieldKey::VelocityY]);
        assert_eq!(batch.field(FieldKey::VelocityDivZ, 0).unwrap(), target[FieldKey::VelocityDivZ]);
    }

    #[test]
    fn trailing_rows_keep_previous_contents() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (1, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 3);
        let mut builder = BatchBuilder::new(0);
        let params = AugmentConfig::default();

        builder.fill(&dataset, &mut batch, &[0, 1, 2], false, &params).unwrap();
        builder.fill(&dataset, &mut batch, &[5], false, &params).unwrap();

        assert_eq!(batch.pressure[(0, 0, 0, 0)], 12.0);
        assert_eq!(batch.pressure[(1, 0, 0, 0)], 1.0);
        assert_eq!(batch.pressure[(2, 0, 0, 0)], 2.0);
        assert_eq!(batch.channels(), 2);
        assert!(batch.field(FieldKey::VelocityZ, 0).is_none());
    }

    #[test]
    fn flips_apply_to_input_and_target_alike() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (6, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 1);
        let mut builder = BatchBuilder::new(0);
        let params = AugmentConfig { enabled: true, flip_probability: 1.0, ..Default::default() };

        let applied = builder.fill(&dataset, &mut batch, &[2], true, &params).unwrap();
        assert_eq!(applied[0].flips.as_slice(), &Axis::ALL);

        let original = dataset.load_sample(2).unwrap();
        let (nz, ny, nx) = original.shape();
        let mirrored = |z: usize, y: usize, x: usize| (nz - 1 - z, ny - 1 - y, nx - 1 - x);

        for (z, y, x) in [(0, 0, 0), (1, 2, 3), (3, 0, 2)] {
            let m = mirrored(z, y, x);
            assert_eq!(batch.velocity[(0, 0, z, y, x)], -original[FieldKey::VelocityX][m]);
            assert_eq!(batch.velocity[(0, 1, z, y, x)], -original[FieldKey::VelocityY][m]);
            assert_eq!(batch.velocity_div[(0, 0, z, y, x)], -original[FieldKey::VelocityDivX][m]);
            assert_eq!(batch.velocity_div[(0, 2, z, y, x)], -original[FieldKey::VelocityDivZ][m]);
            assert_eq!(batch.geometry[(0, z, y, x)], original[FieldKey::Geometry][m]);
        }
    }

    #[test]
    fn zero_probability_never_flips() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (1, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 6);
        let mut builder = BatchBuilder::new(3);
        let params = AugmentConfig { enabled: true, flip_probability: 0.0, ..Default::default() };

        let applied = builder.fill(&dataset, &mut batch, &[0, 1, 2, 3, 4, 5], true, &params).unwrap();

        assert!(applied.iter().all(|a| a.flips.is_empty()));
    }

    #[test]
    fn equal_seeds_draw_equal_flips() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (6, 6, 6));
        let params = AugmentConfig { enabled: true, flip_probability: 0.5, ..Default::default() };
        let samples = [0, 1, 2, 3, 4, 5];

        let mut draws = Vec::new();
        for _ in 0..2 {
            let mut batch = Batch::for_dataset(&dataset, samples.len());
            let mut builder = BatchBuilder::new(7);
            let applied = builder.fill(&dataset, &mut batch, &samples, true, &params).unwrap();
            draws.push((applied, batch));
        }

        let (first, first_batch) = &draws[0];
        let (second, second_batch) = &draws[1];
        assert_eq!(first, second);
        assert_eq!(first_batch.velocity, second_batch.velocity);
        assert_eq!(first_batch.pressure_div, second_batch.pressure_div);

        // Eighteen independent draws at one half are neither all hits nor all misses.
        let flipped: usize = first.iter().map(|a| a.flips.len()).sum();
        assert!(flipped > 0 && flipped < 18);
    }

    #[test]
    fn two_dim_data_is_never_flipped_in_z() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (1, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 1);
        let mut builder = BatchBuilder::new(0);
        let params = AugmentConfig { enabled: true, flip_probability: 1.0, ..Default::default() };

        let applied = builder.fill(&dataset, &mut batch, &[0], true, &params).unwrap();

        assert_eq!(applied[0].flips.as_slice(), &[Axis::X, Axis::Y]);
    }

    #[test]
    fn unsupported_augmentation_fails_fast() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (1, 6, 6));
        let mut batch = Batch::for_dataset(&dataset, 1);
        let mut builder = BatchBuilder::new(0);
        let params = AugmentConfig { rotation: 15.0, ..Default::default() };

        let result = builder.fill(&dataset, &mut batch, &[0], true, &params);

        assert!(matches!(result, Err(DataError::UnsupportedAugmentation("rotation"))));
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dataset = dataset(root.path(), (1, 6, 6));
        let mut builder = BatchBuilder::new(0);
        let params = AugmentConfig::default();

        let mut wrong = Batch::new(2, UVec3::new(5, 4, 1), true);
        let result = builder.fill(&dataset, &mut wrong, &[0], false, &params);
        assert!(matches!(result, Err(DataError::BatchShape { .. })));

        let mut small = Batch::for_dataset(&dataset, 1);
        let result = builder.fill(&dataset, &mut small, &[0, 1], false, &params);
        assert!(matches!(result, Err(DataError::BatchOverflow { samples: 2, capacity: 1 })));
    }
}
