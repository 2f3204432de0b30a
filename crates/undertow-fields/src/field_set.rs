use std::ops::{Index, IndexMut};

use glam::UVec3;
use ndarray::{Array3, ArrayView3};

use crate::key::{Axis, FieldKey};

/// The full set of fields for one frame, all sharing a `(nz, ny, nx)` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    /// Simulation time of the frame.
    pub time: f32,
    fields: [Array3<f32>; FieldKey::COUNT],
}

impl FieldSet {
    /// Builds a set by asking `f` for every key.
    ///
    /// Panics if the produced fields do not share one shape.
    pub fn from_fn<F: FnMut(FieldKey) -> Array3<f32>>(time: f32, mut f: F) -> FieldSet {
        let fields: [Array3<f32>; FieldKey::COUNT] = std::array::from_fn(|i| f(FieldKey::ALL[i]));

        let shape = fields[0].dim();
        for key in FieldKey::ALL {
            assert_eq!(
                fields[key.index()].dim(),
                shape,
                "field {} does not match the frame shape",
                key.name(),
            );
        }

        Self { time, fields }
    }

    pub fn zeros(shape: (usize, usize, usize)) -> FieldSet {
        Self::from_fn(0.0, |_| Array3::zeros(shape))
    }

    /// Shape shared by every field, as `(nz, ny, nx)`.
    #[inline(always)]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.fields[0].dim()
    }

    /// Grid size in cells, as `(x, y, z)`.
    pub fn dims(&self) -> UVec3 {
        let (nz, ny, nx) = self.shape();
        UVec3::new(nx as u32, ny as u32, nz as u32)
    }

    #[inline(always)]
    pub fn get(&self, key: FieldKey) -> &Array3<f32> {
        &self.fields[key.index()]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, key: FieldKey) -> &mut Array3<f32> {
        &mut self.fields[key.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &Array3<f32>)> {
        FieldKey::ALL.into_iter().zip(self.fields.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FieldKey, &mut Array3<f32>)> {
        FieldKey::ALL.into_iter().zip(self.fields.iter_mut())
    }

    /// The target or divergent velocity as an `(x, y, z)` triple of views.
    pub fn velocity(&self, divergent: bool) -> [ArrayView3<f32>; 3] {
        Axis::ALL.map(|axis| self.get(FieldKey::velocity(axis, divergent)).view())
    }

    pub fn into_fields(self) -> [Array3<f32>; FieldKey::COUNT] {
        self.fields
    }
}

impl Index<FieldKey> for FieldSet {
    type Output = Array3<f32>;

    fn index(&self, key: FieldKey) -> &Self::Output {
        self.get(key)
    }
}

impl IndexMut<FieldKey> for FieldSet {
    fn index_mut(&mut self, key: FieldKey) -> &mut Self::Output {
        self.get_mut(key)
    }
}
