//! Response body normalization for export payloads.
//!
//! The property export endpoint sometimes answers with the raw ZIP archive
//! and sometimes with a `data:application/zip;base64,` text wrapper around
//! it. [`normalize`] turns either form into raw archive bytes. The prefix is
//! matched on bytes, so binary bodies are never decoded as text.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Literal prefix of a data-URL wrapped archive.
pub const DATA_URL_PREFIX: &[u8] = b"data:application/zip;base64,";

/// Length of the leading signature [`has_zip_signature`] inspects.
pub(crate) const ZIP_SIGNATURE_LEN: usize = 4;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";

/// Errors raised while unwrapping a data-URL payload.
#[derive(Debug, Error)]
pub enum PayloadDecodeError {
    /// The text after the data-URL prefix is not valid base64.
    #[error("invalid base64 in data URL payload: {source}")]
    Base64 {
        /// Decoder error.
        #[source]
        source: base64::DecodeError,
    },
}

/// Shape of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Raw archive starting with a ZIP signature.
    Zip,
    /// `data:application/zip;base64,...` wrapper.
    DataUrl,
    /// Anything else (HTML error pages, empty bodies, ...).
    Other,
}

impl PayloadFormat {
    /// Classifies `body` from its leading bytes.
    #[must_use]
    pub fn detect(body: &[u8]) -> Self {
        if body.starts_with(DATA_URL_PREFIX) {
            Self::DataUrl
        } else if has_zip_signature(body) {
            Self::Zip
        } else {
            Self::Other
        }
    }
}

/// Returns `true` when `body` opens with a ZIP local-file or
/// end-of-central-directory signature.
#[must_use]
pub fn has_zip_signature(body: &[u8]) -> bool {
    body.starts_with(ZIP_LOCAL_HEADER) || body.starts_with(ZIP_EMPTY_ARCHIVE)
}

/// Unwraps a data-URL payload, or returns `body` untouched.
///
/// ASCII whitespace inside the base64 text (line wrapping, trailing
/// newline) is ignored.
///
/// # Errors
///
/// Returns [`PayloadDecodeError::Base64`] if the wrapped payload is not
/// valid base64.
pub fn normalize(body: Vec<u8>) -> Result<Vec<u8>, PayloadDecodeError> {
    let Some(encoded) = body.strip_prefix(DATA_URL_PREFIX) else {
        return Ok(body);
    };
    let compact: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|source| PayloadDecodeError::Base64 { source })
}
