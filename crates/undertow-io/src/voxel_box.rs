//! Voxel-box volume files.
//!
//! Layout: `int32 nx | int32 ny | int32 nz | int32 frame_count`, followed by `frame_count`
//! volumes of `nx * ny * nz` floats stored with `x` as the slowest axis and `z` the fastest.

use std::io::{BufWriter, Read, Write};

use glam::UVec3;
use ndarray::{Array3, ArrayView3};

use crate::{
    as_bytes::{f32_byte_len, f32s_to_bytes, read_f32s, AsBytes},
    decode::DecodingError,
    encode::EncodingError,
};

/// Writes every `every`th pushed volume to a voxel-box stream.
pub struct VoxelBoxWriter<W: Write> {
    writer: BufWriter<W>,
    /// Grid size as `(x, y, z)`.
    dims: UVec3,
    every: usize,
    /// Number of volumes announced in the header.
    frame_count: usize,
    current_frame: usize,
    written: usize,
}

impl<W: Write> VoxelBoxWriter<W> {
    /// Starts a stream for `total_frames` pushed volumes, keeping frames `0, every, 2 * every, ...`.
    pub fn new(writer: W, dims: UVec3, total_frames: usize, every: usize) -> Result<VoxelBoxWriter<W>, EncodingError> {
        let every = every.max(1);
        let frame_count = total_frames.div_ceil(every);

        let mut writer = BufWriter::new(writer);
        write_header(&mut writer, dims, frame_count)?;

        Ok(Self {
            writer,
            dims,
            every,
            frame_count,
            current_frame: 0,
            written: 0,
        })
    }

    #[inline(always)]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Pushes the next simulated volume, with shape `(nz, ny, nx)`. Returns whether it was written.
    pub fn push_frame(&mut self, volume: ArrayView3<f32>) -> Result<bool, EncodingError> {
        let keep = self.current_frame % self.every == 0;
        self.current_frame += 1;

        if !keep {
            return Ok(false);
        }

        write_volume(&mut self.writer, self.dims, volume)?;
        self.written += 1;

        Ok(true)
    }

    pub fn finish(self) -> Result<W, EncodingError> {
        if self.written != self.frame_count {
            return Err(EncodingError::FrameCount {
                announced: self.frame_count,
                written: self.written,
            });
        }

        self.writer.into_inner().map_err(|e| EncodingError::Io(e.into_error()))
    }
}

/// Writes a single-volume voxel box, used for the geometry companion file.
pub fn write_geometry<W: Write>(writer: W, geometry: ArrayView3<f32>) -> Result<W, EncodingError> {
    let (nz, ny, nx) = geometry.dim();
    let mut writer = VoxelBoxWriter::new(writer, UVec3::new(nx as u32, ny as u32, nz as u32), 1, 1)?;
    writer.push_frame(geometry)?;
    writer.finish()
}

fn write_header<W: Write>(writer: &mut W, dims: UVec3, frame_count: usize) -> Result<(), EncodingError> {
    for v in [dims.x as i32, dims.y as i32, dims.z as i32, frame_count as i32] {
        writer.write_all(&v.to_bytes())?;
    }

    Ok(())
}

fn write_volume<W: Write>(writer: &mut W, dims: UVec3, volume: ArrayView3<f32>) -> Result<(), EncodingError> {
    let (nz, ny, nx) = volume.dim();
    if [nx, ny, nz] != [dims.x as usize, dims.y as usize, dims.z as usize] {
        return Err(EncodingError::ShapeMismatch {
            expected: [dims.z as usize, dims.y as usize, dims.x as usize],
            found: [nz, ny, nx],
        });
    }

    // (z, y, x) -> (x, y, z)
    writer.write_all(&f32s_to_bytes(volume.t().iter().copied()))?;

    Ok(())
}

/// A fully decoded voxel box. Volumes are returned in `(nz, ny, nx)` shape.
#[derive(Debug, Clone)]
pub struct VoxelBox {
    pub dims: UVec3,
    pub frames: Vec<Array3<f32>>,
}

pub fn read_voxel_box<R: Read>(mut reader: R) -> Result<VoxelBox, DecodingError> {
    let mut header = [0i32; 4];
    for (axis, value) in ["x", "y", "z", "frames"].into_iter().zip(header.iter_mut()) {
        let mut bytes = [0; 4];
        reader.read_exact(&mut bytes)?;
        *value = i32::from_bytes(bytes);

        if *value < 0 {
            return Err(DecodingError::InvalidDimension { axis, value: *value });
        }
    }

    let [nx, ny, nz, count] = header.map(|v| v as usize);
    let len = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .and_then(f32_byte_len)
        .ok_or(DecodingError::TooLarge { dims: [nx, ny, nz] })?;
    let mut frames = Vec::new();

    for _ in 0..count {
        let values = read_f32s(&mut reader, len)?;

        frames.push(Array3::from_shape_vec((nx, ny, nz), values)?.reversed_axes());
    }

    Ok(VoxelBox {
        dims: UVec3::new(nx as u32, ny as u32, nz as u32),
        frames,
    })
}
