use ndarray::{Array3, ArrayView3};

/// Computes the divergence of a velocity field against a geometry mask.
///
/// Fields are laid out as `(nz, ny, nx)`, velocity given as `(x, y, z)` components. A grid with
/// `nz == 1` is treated as 2D and its `z` component ignored.
pub trait Divergence {
    fn divergence(&self, velocity: [ArrayView3<f32>; 3], geometry: ArrayView3<f32>) -> Array3<f32>;

    /// Largest absolute divergence anywhere in the field.
    fn max_abs_divergence(&self, velocity: [ArrayView3<f32>; 3], geometry: ArrayView3<f32>) -> f32 {
        max_abs(self.divergence(velocity, geometry).view())
    }
}

/// Forward-difference divergence on a MAC grid, with unit cell spacing.
///
/// Solid cells (geometry above one half) and the last cell along every differentiated axis get
/// zero divergence.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacDivergence;

impl Divergence for MacDivergence {
    fn divergence(&self, velocity: [ArrayView3<f32>; 3], geometry: ArrayView3<f32>) -> Array3<f32> {
        let [u, v, w] = velocity;
        let (nz, ny, nx) = geometry.dim();
        let two_dim = nz == 1;

        let mut div = Array3::zeros((nz, ny, nx));
        let kz = if two_dim { 1 } else { nz.saturating_sub(1) };

        for k in 0..kz {
            for j in 0..ny.saturating_sub(1) {
                for i in 0..nx.saturating_sub(1) {
                    if geometry[(k, j, i)] > 0.5 {
                        continue;
                    }

                    let mut d = u[(k, j, i + 1)] - u[(k, j, i)] + v[(k, j + 1, i)] - v[(k, j, i)];
                    if !two_dim {
                        d += w[(k + 1, j, i)] - w[(k, j, i)];
                    }

                    div[(k, j, i)] = d;
                }
            }
        }

        div
    }
}

#[inline]
pub fn max_abs(field: ArrayView3<f32>) -> f32 {
    field.iter().fold(0.0, |m: f32, v| m.max(v.abs()))
}
