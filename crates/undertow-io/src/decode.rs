use std::{fs::File, io::{BufReader, Read}, path::Path};

use glam::UVec3;
use ndarray::{s, Array3};
use thiserror::Error;

use crate::as_bytes::{f32_byte_len, read_f32s, AsBytes};

/// The fixed header at the start of every frame record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Whether the planes were stored x-major, i.e. with shape `(nx, ny, nz)`.
    pub transpose: bool,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Simulation time of the frame.
    pub time: f32,
}

impl FrameHeader {
    /// Number of cells in one plane, or `None` if it overflows `usize`.
    #[inline(always)]
    pub fn cell_count(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// Size in bytes of one stored plane.
    pub fn plane_len(&self) -> Result<usize, DecodingError> {
        self.cell_count()
            .and_then(f32_byte_len)
            .ok_or(DecodingError::TooLarge {
                dims: [self.nx, self.ny, self.nz],
            })
    }
}

/// One decoded simulation frame. Every field has shape `(nz, ny, nx)` after cropping.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Simulation time of the frame.
    pub time: f32,
    pub pressure: Array3<f32>,
    /// Velocity components in `x`, `y`, `z` order.
    pub velocity: [Array3<f32>; 3],
    /// Solid/obstacle mask.
    pub geometry: Array3<f32>,
    /// Minimum over the pressure and velocity fields, after cropping.
    pub min_value: f32,
}

impl FrameData {
    /// Grid size in cells, as `(x, y, z)`.
    pub fn dims(&self) -> UVec3 {
        let (nz, ny, nx) = self.pressure.dim();
        UVec3::new(nx as u32, ny as u32, nz as u32)
    }

    #[inline(always)]
    pub fn is_2d(&self) -> bool {
        self.pressure.dim().0 == 1
    }
}

/// Reads a single frame record from any byte source.
pub struct FrameDecoder<R: Read> {
    reader: R,
    /// Number of cells stripped from each side of every cropped axis.
    border: usize,
}

impl<R: Read> FrameDecoder<R> {
    pub fn new(reader: R, border: usize) -> FrameDecoder<R> {
        Self { reader, border }
    }

    fn read_value<const N: usize, T: AsBytes<N>>(&mut self) -> Result<T, DecodingError> {
        let mut bytes = [0; N];
        self.reader.read_exact(&mut bytes)?;

        Ok(T::from_bytes(bytes))
    }

    fn read_dim(&mut self, axis: &'static str) -> Result<usize, DecodingError> {
        let value = self.read_value::<4, i32>()?;
        if value <= 0 {
            return Err(DecodingError::InvalidDimension { axis, value });
        }

        Ok(value as usize)
    }

    pub fn decode_header(&mut self) -> Result<FrameHeader, DecodingError> {
        let transpose = self.read_value::<4, i32>()? != 0;
        let nx = self.read_dim("x")?;
        let ny = self.read_dim("y")?;
        let nz = self.read_dim("z")?;
        let time = self.read_value::<4, f32>()?;

        Ok(FrameHeader { transpose, nx, ny, nz, time })
    }

    fn read_plane(&mut self, header: &FrameHeader, len: usize) -> Result<Array3<f32>, DecodingError> {
        let values = read_f32s(&mut self.reader, len)?;

        let plane = if header.transpose {
            Array3::from_shape_vec((header.nx, header.ny, header.nz), values)?
                .reversed_axes()
                .as_standard_layout()
                .into_owned()
        } else {
            Array3::from_shape_vec((header.nz, header.ny, header.nx), values)?
        };

        Ok(self.crop(plane))
    }

    /// Strips the border from `x` and `y`, and from `z` only for 3D frames.
    fn crop(&self, field: Array3<f32>) -> Array3<f32> {
        let b = self.border;
        if b == 0 {
            return field;
        }

        let (nz, ny, nx) = field.dim();
        let bz = if nz > 1 { b } else { 0 };

        field.slice(s![bz..nz - bz, b..ny - b, b..nx - b]).to_owned()
    }

    fn check_crop(&self, header: &FrameHeader) -> Result<(), DecodingError> {
        let limit = 2 * self.border;
        let too_small = header.nx <= limit
            || header.ny <= limit
            || (header.nz > 1 && header.nz <= limit);

        if too_small {
            return Err(DecodingError::CropTooLarge {
                border: self.border,
                dims: [header.nx, header.ny, header.nz],
            });
        }

        Ok(())
    }

    /// Decodes the whole record. Planes are stored as `Ux`, `Uy`, `Uz`, pressure, geometry.
    pub fn decode(mut self) -> Result<FrameData, DecodingError> {
        let header = self.decode_header()?;
        self.check_crop(&header)?;
        let len = header.plane_len()?;

        let ux = self.read_plane(&header, len)?;
        let uy = self.read_plane(&header, len)?;
        let uz = self.read_plane(&header, len)?;
        let pressure = self.read_plane(&header, len)?;
        let geometry = self.read_plane(&header, len)?;

        let min_value = [&pressure, &ux, &uy, &uz]
            .iter()
            .flat_map(|field| field.iter().copied())
            .fold(f32::INFINITY, f32::min);

        Ok(FrameData {
            time: header.time,
            pressure,
            velocity: [ux, uy, uz],
            geometry,
            min_value,
        })
    }
}

/// Opens and decodes a frame file.
pub fn decode_frame_file<P: AsRef<Path>>(path: P, border: usize) -> Result<FrameData, DecodingError> {
    let reader = BufReader::new(File::open(path)?);
    FrameDecoder::new(reader, border).decode()
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error("invalid {axis} dimension {value} in frame header")]
    InvalidDimension { axis: &'static str, value: i32 },
    #[error("border of {border} cells does not fit a {dims:?} grid")]
    CropTooLarge { border: usize, dims: [usize; 3] },
    #[error("a {dims:?} grid is too large to address")]
    TooLarge { dims: [usize; 3] },
}
