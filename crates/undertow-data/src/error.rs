use std::path::{Path, PathBuf};

use glam::UVec3;
use thiserror::Error;
use undertow_io::DecodingError;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode frame {}: {source}", path.display())]
    Frame {
        path: PathBuf,
        #[source]
        source: DecodingError,
    },
    #[error(transparent)]
    CacheEncode(#[from] bincode::error::EncodeError),
    #[error(transparent)]
    CacheDecode(#[from] bincode::error::DecodeError),
    #[error("corrupt cache entry {}: {reason}", path.display())]
    CorruptEntry { path: PathBuf, reason: String },
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
    #[error("run {run} has {main} frame files but {divergent} divergent frame files")]
    FrameCountMismatch { run: String, main: usize, divergent: usize },
    #[error("run {run} has no divergent partner for frame {frame}")]
    UnpairedFrame { run: String, frame: u64 },
    #[error("{what} has grid {found} where {expected} was expected")]
    DimensionMismatch { what: String, expected: UVec3, found: UVec3 },
    #[error("dataset has no samples")]
    EmptyDataset,
    #[error("sample {index} is out of range for {len} samples")]
    SampleOutOfRange { index: usize, len: usize },
    #[error("frame {frame} of run {run} is out of range")]
    FrameOutOfRange { run: usize, frame: usize },
    #[error("{0} augmentation is not supported")]
    UnsupportedAugmentation(&'static str),
    #[error("flip probability {0} is outside [0, 1]")]
    FlipProbability(f32),
    #[error("batch buffers have shape {found:?} where the dataset needs {expected:?}")]
    BatchShape { expected: [usize; 4], found: [usize; 4] },
    #[error("{samples} samples do not fit a batch of {capacity}")]
    BatchOverflow { samples: usize, capacity: usize },
    #[error("statistics worker panicked")]
    WorkerPanicked,
}

/// Attaches `path` to an I/O error.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataError + '_ {
    move |source| DataError::Io {
        path: path.to_path_buf(),
        source,
    }
}
