use std::path::PathBuf;

use thiserror::Error;
use undertow_data::DataError;
use undertow_io::EncodingError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no accepted run is named {0}")]
    UnknownRun(String),
}

pub fn io_error(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> AppError + '_ {
    move |source| AppError::Io { path: path.to_path_buf(), source }
}
