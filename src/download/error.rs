//! Error types for the download module.
//!
//! [`AttemptError`] describes why one captcha round failed. These are
//! expected and frequent, so the attempt loop only logs them; the caller
//! sees the last one inside [`DownloadError::Exhausted`].

use std::path::PathBuf;

use thiserror::Error;

use super::decoder::PayloadDecodeError;
use crate::config::ConfigError;
use crate::model::ModelError;
use crate::portal::PortalError;

/// Why a single captcha round failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The captcha image could not be fetched or decoded.
    #[error("captcha fetch failed: {source}")]
    CaptchaFetch {
        /// Underlying portal error.
        #[source]
        source: PortalError,
    },

    /// The solver's guess does not have the expected length.
    #[error("captcha guess {guess:?} has {len} characters, expected {expected}")]
    CaptchaLength {
        /// The discarded guess.
        guess: String,
        /// Its character count.
        len: usize,
        /// Required character count.
        expected: usize,
    },

    /// The portal answered, but not with an archive (usually a wrong captcha).
    #[error("portal rejected the request (HTTP {status}): {reason}")]
    Rejected {
        /// HTTP status of the answer.
        status: u16,
        /// What failed the acceptance check.
        reason: String,
    },

    /// The protected request itself failed in transit.
    #[error("transport error: {source}")]
    Transport {
        /// Underlying portal error.
        #[source]
        source: PortalError,
    },

    /// A data-URL body could not be unwrapped.
    #[error("payload decode failed: {source}")]
    Decode {
        /// Underlying decoder error.
        #[source]
        source: PayloadDecodeError,
    },

    /// The archive could not be written locally. Not retried.
    #[error("could not write {path}: {source}")]
    Storage {
        /// Partial file being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl AttemptError {
    /// Creates a rejection error.
    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            reason: reason.into(),
        }
    }
}

/// Terminal outcome of a failed download.
///
/// Precondition failures ([`InvalidTarget`](Self::InvalidTarget),
/// [`Config`](Self::Config), [`Session`](Self::Session),
/// [`PropertyLookup`](Self::PropertyLookup)) are raised before the captcha
/// loop starts; [`Exhausted`](Self::Exhausted) means the portal stayed
/// uncooperative for the whole attempt budget.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A region, layer or CAR number failed validation.
    #[error("invalid download target: {0}")]
    InvalidTarget(#[from] ModelError),

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The portal session could not be established.
    #[error("could not establish portal session: {source}")]
    Session {
        /// Underlying portal error.
        #[source]
        source: PortalError,
    },

    /// The CAR number could not be resolved to an internal property id.
    #[error("property lookup failed: {source}")]
    PropertyLookup {
        /// Underlying portal error.
        #[source]
        source: PortalError,
    },

    /// Every attempt failed.
    #[error("{target}: giving up after {attempts} attempts, last error: {last_error}")]
    Exhausted {
        /// Target description.
        target: String,
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last_error: AttemptError,
    },

    /// The interrupt flag was raised before the download finished.
    #[error("{target}: interrupted after {attempts} attempts")]
    Interrupted {
        /// Target description.
        target: String,
        /// Attempts completed before the interrupt was observed.
        attempts: u32,
    },

    /// A batch task ended without reporting (panic or cancellation).
    #[error("{target}: download task failed: {reason}")]
    TaskFailed {
        /// Target description.
        target: String,
        /// Join error text.
        reason: String,
    },

    /// Writing the archive to disk failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a session error.
    pub fn session(source: PortalError) -> Self {
        Self::Session { source }
    }

    /// Creates a property lookup error.
    pub fn property_lookup(source: PortalError) -> Self {
        Self::PropertyLookup { source }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for failures raised before any captcha was fetched.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidTarget(_) | Self::Config(_) | Self::Session { .. } | Self::PropertyLookup { .. }
        )
    }
}
