use ndarray::{Array3, ArrayViewMut3, Slice};
use smallvec::SmallVec;

use crate::{field_set::FieldSet, key::{Axis, FieldKey}};

/// Axes a sample was mirrored along.
pub type FlipAxes = SmallVec<[Axis; 3]>;

/// Reverses `field` along `axis` in place, staging the copy through `scratch`.
///
/// `scratch` is reshaped only when its shape differs from the field's.
pub fn flip_field(mut field: ArrayViewMut3<f32>, axis: Axis, scratch: &mut Array3<f32>) {
    if scratch.dim() != field.dim() {
        *scratch = Array3::zeros(field.dim());
    }

    scratch.assign(&field);
    field.assign(&scratch.slice_axis(axis.array_axis(), Slice::new(0, None, -1)));
}

/// Mirrors a whole frame along `axis`: every field is reversed and the velocity components
/// aligned with `axis` change sign.
pub fn flip_field_set(set: &mut FieldSet, axis: Axis, scratch: &mut Array3<f32>) {
    for (key, field) in set.iter_mut() {
        flip_field(field.view_mut(), axis, scratch);

        if negates(key, axis) {
            field.mapv_inplace(|v| -v);
        }
    }
}

/// Applies [`flip_field_set`] for every axis in `axes`.
pub fn flip_all(set: &mut FieldSet, axes: &[Axis], scratch: &mut Array3<f32>) {
    for &axis in axes {
        flip_field_set(set, axis, scratch);
    }
}

/// Whether the component stored under `key` flips sign when mirrored along `axis`.
#[inline(always)]
pub fn negates(key: FieldKey, axis: Axis) -> bool {
    key.velocity_axis() == Some(axis)
}
