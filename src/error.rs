use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the dataset loaders.
#[derive(Error, Debug)]
pub enum PertDataError {
    /// The identifier names no known dataset.
    #[error("Dataset {0} not supported")]
    UnsupportedDataset(String),

    /// A keyword option was malformed or not accepted by the loader.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The perturbation source failed to load, process or split the data.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    #[error("cache file {path}: {source:#}")]
    Cache {
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PertDataError {
    /// Whether the error stems from a bad argument rather than from I/O.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PertDataError::UnsupportedDataset(_) | PertDataError::InvalidArgument(_)
        )
    }
}

pub type Result<T, E = PertDataError> = std::result::Result<T, E>;
