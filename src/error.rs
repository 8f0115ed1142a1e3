use std::path::{Path, PathBuf};

use thiserror::Error;

/// Category of a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    Load,
    Transform,
    Write,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input directory could not be listed, or it holds no shapefiles.
    #[error("Discovery failed in {dir:?}: {reason}")]
    Discovery { dir: PathBuf, reason: String },

    #[error("Could not load {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Reprojection or simplification failed.
    #[error("Could not transform {path:?}: {reason}")]
    Transform { path: PathBuf, reason: String },

    #[error("Could not write {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::Discovery { .. } => ErrorKind::Discovery,
            ConversionError::Load { .. } => ErrorKind::Load,
            ConversionError::Transform { .. } => ErrorKind::Transform,
            ConversionError::Write { .. } => ErrorKind::Write,
        }
    }

    pub fn discovery(dir: &Path, reason: impl ToString) -> Self {
        ConversionError::Discovery {
            dir: dir.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn load(path: &Path, reason: impl ToString) -> Self {
        ConversionError::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn transform(path: &Path, reason: impl ToString) -> Self {
        ConversionError::Transform {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: &Path, reason: impl ToString) -> Self {
        ConversionError::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;
