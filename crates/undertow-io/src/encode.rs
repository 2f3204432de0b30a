use std::{fs::File, io::{BufWriter, Write}, path::Path};

use ndarray::ArrayView3;
use thiserror::Error;

use crate::as_bytes::{f32s_to_bytes, AsBytes};

/// Borrowed fields of one frame, each with shape `(nz, ny, nx)`.
#[derive(Debug, Clone, Copy)]
pub struct FrameRecord<'a> {
    pub time: f32,
    pub pressure: ArrayView3<'a, f32>,
    /// Velocity components in `x`, `y`, `z` order.
    pub velocity: [ArrayView3<'a, f32>; 3],
    pub geometry: ArrayView3<'a, f32>,
}

pub struct FrameEncoder<W: Write> {
    writer: BufWriter<W>,
    /// Whether to store planes x-major instead of z-major.
    transpose: bool,
}

impl<W: Write> FrameEncoder<W> {
    pub fn new(writer: W) -> FrameEncoder<W> {
        Self {
            writer: BufWriter::new(writer),
            transpose: false,
        }
    }

    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    fn encode_plane(&mut self, plane: ArrayView3<f32>) -> Result<(), EncodingError> {
        let bytes = if self.transpose {
            f32s_to_bytes(plane.t().iter().copied())
        } else {
            f32s_to_bytes(plane.iter().copied())
        };
        self.writer.write_all(&bytes)?;

        Ok(())
    }

    pub fn encode(&mut self, record: &FrameRecord) -> Result<(), EncodingError> {
        let shape = record.pressure.dim();
        let planes = [
            record.velocity[0],
            record.velocity[1],
            record.velocity[2],
            record.pressure,
            record.geometry,
        ];

        if let Some(plane) = planes.iter().find(|p| p.dim() != shape) {
            return Err(EncodingError::ShapeMismatch {
                expected: [shape.0, shape.1, shape.2],
                found: [plane.dim().0, plane.dim().1, plane.dim().2],
            });
        }

        let (nz, ny, nx) = shape;
        self.writer.write_all(&(self.transpose as i32).to_bytes())?;
        self.writer.write_all(&(nx as i32).to_bytes())?;
        self.writer.write_all(&(ny as i32).to_bytes())?;
        self.writer.write_all(&(nz as i32).to_bytes())?;
        self.writer.write_all(&record.time.to_bytes())?;

        for plane in planes {
            self.encode_plane(plane)?;
        }

        Ok(())
    }

    /// Flushes buffered output and returns the inner writer.
    pub fn finish(self) -> Result<W, EncodingError> {
        self.writer.into_inner().map_err(|e| EncodingError::Io(e.into_error()))
    }
}

/// Creates (or truncates) `path` and writes a single frame record into it.
pub fn encode_frame_file<P: AsRef<Path>>(path: P, record: &FrameRecord) -> Result<(), EncodingError> {
    let mut encoder = FrameEncoder::new(File::create(path)?);
    encoder.encode(record)?;
    encoder.finish()?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("field shape {found:?} does not match {expected:?}")]
    ShapeMismatch { expected: [usize; 3], found: [usize; 3] },
    #[error("{written} volumes were written but the header announced {announced}")]
    FrameCount { announced: usize, written: usize },
}
