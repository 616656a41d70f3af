use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Buffer name pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Buffer file name {path:?} does not encode a valid {bucket:?} bucket date")]
    MalformedFileName {
        path: PathBuf,
        bucket: super::TimeBucket,
    },

    #[error("Invalid index name format {format:?}")]
    InvalidIndexFormat { format: String },

    #[error("Failed to encode bulk action: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Buffer file {path:?} is locked by another writer")]
    FileBusy { path: PathBuf },
}

impl BufferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BufferError::Io {
            path: path.into(),
            source,
        }
    }
}
