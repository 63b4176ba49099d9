//! Constants for the download module (attempt budget, pacing, wire names).

use std::time::Duration;

/// Default number of captcha rounds per download.
pub const DEFAULT_MAX_ATTEMPTS: u32 = crate::config::DEFAULT_MAX_ATTEMPTS;

/// Default upper bound of the sleep between failed rounds (2 seconds).
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(crate::config::DEFAULT_JITTER_MAX_MS);

/// Content type prefix the region download endpoint uses for archives.
pub(crate) const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Query parameter carrying the region code.
pub(crate) const PARAM_REGION: &str = "idEstado";

/// Query parameter carrying the polygon layer token.
pub(crate) const PARAM_POLYGON: &str = "tipoBase";

/// Parameter carrying the solved captcha on both protected endpoints.
pub(crate) const PARAM_CAPTCHA: &str = "ReCaptcha";

/// Form field carrying the internal property id.
pub(crate) const PARAM_PROPERTY_ID: &str = "idImovel";

/// Ceiling on the buffer reserved up front from a declared `Content-Length`.
/// The header is untrusted, so larger bodies grow the buffer as bytes arrive.
pub(crate) const MAX_BODY_PREALLOCATION: usize = 8 << 20;
