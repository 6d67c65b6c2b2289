//! Error types for talkface-assets.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use talkface_core::{BundleName, ErrorKind};

/// All errors that can arise while fetching, extracting or normalizing a bundle.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Network failure, HTTP error status or empty download.
    #[error("failed to fetch archive '{remote_id}': {reason}")]
    FetchFailed { remote_id: String, reason: String },

    /// The downloaded archive does not match the configured digest.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Corrupt archive, unsupported format or unsafe entry path.
    #[error("failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: PathBuf, reason: String },

    /// The archive produced several candidate folders and none matches the
    /// canonical name. Nothing was renamed; the staging directory is kept.
    #[error("ambiguous asset layout in {staging}: candidates {candidates:?}, expected '{expected}'")]
    AmbiguousAssetLayout {
        staging: PathBuf,
        expected: String,
        candidates: Vec<String>,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The provisioning task ended without reporting a result.
    #[error("provisioning task failed: {0}")]
    Task(String),
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssetError::FetchFailed { .. } | AssetError::ChecksumMismatch { .. } => {
                ErrorKind::FetchFailed
            }
            AssetError::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            AssetError::AmbiguousAssetLayout { .. } => ErrorKind::AmbiguousAssetLayout,
            AssetError::Io { .. } | AssetError::Task(_) => ErrorKind::Io,
        }
    }
}

/// Failure to provision one bundle. Every caller waiting on the same
/// in-flight provisioning receives a clone sharing the same source.
#[derive(Debug, Clone, Error)]
#[error("failed to provision bundle '{bundle}': {source}")]
pub struct ProvisionError {
    pub bundle: BundleName,
    #[source]
    pub source: Arc<AssetError>,
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Convenience constructor for [`AssetError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> AssetError {
    AssetError::Io {
        path: path.into(),
        source,
    }
}
