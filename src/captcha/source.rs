//! Captcha image retrieval.

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use super::CaptchaImage;
use crate::portal::{HttpSession, PortalError};

/// Fetches fresh captcha images through the orchestrator's session.
///
/// No retry happens here; a failed fetch costs the caller one attempt.
#[derive(Debug, Clone)]
pub struct CaptchaSource {
    session: HttpSession,
}

impl CaptchaSource {
    /// Creates a source bound to `session` (the captcha is tied to its cookies).
    #[must_use]
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    /// Requests a new image with a random cache-busting `id` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::CaptchaFetchFailed`] for a non-200 status or an
    /// undecodable body, or a wrapped transport error.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self) -> Result<CaptchaImage, PortalError> {
        let cache_buster: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let endpoint = self.session.urls().captcha();
        let response = self
            .session
            .get_with_query(&endpoint, &[("id", &cache_buster.to_string())])
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PortalError::captcha_fetch_failed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PortalError::transport(&endpoint, e))?;

        let image = CaptchaImage::decode(body.to_vec()).map_err(|e| {
            PortalError::captcha_fetch_failed(format!("undecodable image ({} bytes): {e}", body.len()))
        })?;

        debug!(
            format = ?image.format(),
            width = image.dimensions().0,
            height = image.dimensions().1,
            "captcha fetched"
        );
        Ok(image)
    }
}
