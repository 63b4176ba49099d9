//! Error types for target parsing.

use thiserror::Error;

/// Errors raised when user-supplied text does not name a valid download target.
///
/// These are caller errors: they are detected before any network activity
/// and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The text is not one of the portal's region codes.
    #[error("unknown region '{input}': expected a two-letter state code such as SP or MG")]
    UnknownRegion {
        /// The rejected input.
        input: String,
    },

    /// The text is neither a polygon wire token nor a polygon variant name.
    #[error("unknown polygon kind '{input}': expected one of {expected}")]
    UnknownPolygonKind {
        /// The rejected input.
        input: String,
        /// Comma-separated list of accepted wire tokens.
        expected: String,
    },

    /// The text does not look like a public CAR registration number.
    #[error("invalid CAR number '{input}': {reason}")]
    InvalidCarNumber {
        /// The rejected input.
        input: String,
        /// Why the input was rejected.
        reason: &'static str,
    },
}

impl ModelError {
    /// Creates an unknown-region error.
    pub fn unknown_region(input: impl Into<String>) -> Self {
        Self::UnknownRegion {
            input: input.into(),
        }
    }

    /// Creates an unknown-polygon-kind error listing the accepted tokens.
    pub fn unknown_polygon_kind(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::UnknownPolygonKind {
            input: input.into(),
            expected: expected.into(),
        }
    }

    /// Creates an invalid CAR number error.
    pub fn invalid_car_number(input: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidCarNumber {
            input: input.into(),
            reason,
        }
    }
}
