//! Error types for portal transport and endpoint calls.

use thiserror::Error;

/// Errors raised by the HTTP session and the portal endpoints it reaches.
///
/// Transport errors from `reqwest` are wrapped with the URL that failed so
/// callers never match on the transport's own error type.
#[derive(Debug, Error)]
pub enum PortalError {
    /// The session bootstrap request to the index page failed.
    #[error("portal unreachable at {url}: {reason}")]
    SiteUnreachable {
        /// Index URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A checked request returned a status outside {200, 302}.
    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Network-level failure (DNS, connection refused, TLS, reset).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the connect or overall timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// An endpoint URL could not be built from the configured base.
    #[error("invalid portal URL '{url}': {source}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The captcha endpoint did not return a decodable image.
    #[error("captcha fetch failed: {reason}")]
    CaptchaFetchFailed {
        /// What went wrong.
        reason: String,
    },

    /// The search endpoint returned no feature for the CAR number.
    #[error("property not found for CAR number {car_number}")]
    PropertyNotFound {
        /// The searched CAR number.
        car_number: String,
    },

    /// The search request failed or returned an unusable body.
    #[error("property lookup failed for CAR number {car_number}: {reason}")]
    PropertyLookupFailed {
        /// The searched CAR number.
        car_number: String,
        /// What went wrong.
        reason: String,
    },

    /// The release-dates page could not be fetched.
    #[error("release dates unavailable: {reason}")]
    ReleaseDatesUnavailable {
        /// What went wrong.
        reason: String,
    },
}

impl PortalError {
    /// Wraps a transport error, promoting timeouts to [`PortalError::Timeout`].
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an unexpected-status error.
    pub fn unexpected_status(url: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a site-unreachable error.
    pub fn site_unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SiteUnreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a captcha fetch failure.
    pub fn captcha_fetch_failed(reason: impl Into<String>) -> Self {
        Self::CaptchaFetchFailed {
            reason: reason.into(),
        }
    }

    /// Creates a property-not-found error.
    pub fn property_not_found(car_number: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            car_number: car_number.into(),
        }
    }

    /// Creates a property lookup failure.
    pub fn property_lookup_failed(car_number: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PropertyLookupFailed {
            car_number: car_number.into(),
            reason: reason.into(),
        }
    }
}
