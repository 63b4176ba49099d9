//! Cookie-bearing HTTP session for one orchestrator.
//!
//! The portal binds captcha challenges to the session cookie set by its index
//! page, so every request of one download must travel through the same
//! [`HttpSession`]. Clones share the cookie jar; independent downloads must
//! each construct their own session.
//!
//! Two timeouts apply. Every read on a connection must make progress within
//! `request_timeout`; pages, captchas and property exports are additionally
//! bounded as a whole by the same duration. Archive streams opened with
//! [`HttpSession::get_stream_with_query`] only carry the per-read bound, so a
//! slow but steady transfer of a large state layer is never cut off.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::tls::Version;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;
use url::form_urlencoded;

use super::PortalError;
use super::urls::{PortalUrls, with_query};
use crate::config::{SicarConfig, TlsPolicy};
use crate::user_agent::browser_headers;

/// Long-lived HTTP client with the portal's cookie jar and header policy.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    urls: PortalUrls,
    request_timeout: Duration,
}

impl HttpSession {
    /// Builds a session from config without contacting the portal.
    ///
    /// Call [`initialize`](Self::initialize) before any captcha request.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::InvalidUrl`] for a malformed base URL and
    /// [`PortalError::ClientBuild`] when the TLS backend rejects the policy.
    #[instrument(level = "debug", skip(config), fields(base_url = %config.base_url, tls = ?config.tls))]
    pub fn new(config: &SicarConfig) -> Result<Self, PortalError> {
        let urls = PortalUrls::new(&config.base_url)?;
        let jar = Arc::new(Jar::default());

        let mut builder = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.request_timeout())
            .gzip(true)
            .user_agent(config.user_agent.as_str())
            .default_headers(browser_headers(&config.headers));

        if config.tls == TlsPolicy::Legacy {
            warn!("legacy TLS policy: pinning TLS 1.2 and skipping certificate verification");
            builder = builder
                .min_tls_version(Version::TLS_1_2)
                .max_tls_version(Version::TLS_1_2)
                .danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|source| PortalError::ClientBuild { source })?;

        Ok(Self {
            client,
            jar,
            urls,
            request_timeout: config.request_timeout(),
        })
    }

    /// Endpoint layout this session talks to.
    #[must_use]
    pub fn urls(&self) -> &PortalUrls {
        &self.urls
    }

    /// Visits the index page so the portal issues its session cookies.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::SiteUnreachable`] on any transport failure or
    /// a status outside {200, 302}. This is a precondition, never retried.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), PortalError> {
        let index = self.urls.index();
        match self.get(&index).await {
            Ok(response) => {
                info!(status = response.status().as_u16(), "portal session initialized");
                Ok(())
            }
            Err(error) => Err(PortalError::site_unreachable(index, error.to_string())),
        }
    }

    /// Sends a GET and requires a 200 or 302 answer.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::UnexpectedStatus`] for any other status, or a
    /// wrapped transport error.
    pub async fn get(&self, url: &str) -> Result<Response, PortalError> {
        let response = self.send(self.bounded(self.client.get(url)), url).await?;
        require_ok_or_found(response, url)
    }

    /// Sends a GET with encoded query parameters and requires a 200 or 302.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus [`PortalError::InvalidUrl`].
    pub async fn get_checked_with_query(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, PortalError> {
        let url = with_query(endpoint, params)?;
        let response = self
            .send(self.bounded(self.client.get(url.clone())), url.as_str())
            .await?;
        require_ok_or_found(response, url.as_str())
    }

    /// Sends a GET with encoded query parameters, returning any status.
    ///
    /// Used for small responses whose status is classified by the caller,
    /// such as captcha images.
    ///
    /// # Errors
    ///
    /// Returns a wrapped transport error or [`PortalError::InvalidUrl`].
    pub async fn get_with_query(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, PortalError> {
        let url = with_query(endpoint, params)?;
        self.send(self.bounded(self.client.get(url.clone())), url.as_str())
            .await
    }

    /// Like [`get_with_query`](Self::get_with_query), without a bound on the
    /// total transfer time. Only the per-read timeout applies to the body.
    ///
    /// # Errors
    ///
    /// Returns a wrapped transport error or [`PortalError::InvalidUrl`].
    pub async fn get_stream_with_query(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, PortalError> {
        let url = with_query(endpoint, params)?;
        self.send(self.client.get(url.clone()), url.as_str()).await
    }

    /// Sends a form-encoded POST, returning any status.
    ///
    /// # Errors
    ///
    /// Returns a wrapped transport error.
    pub async fn post_form(
        &self,
        endpoint: &str,
        fields: &[(&str, &str)],
    ) -> Result<Response, PortalError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        self.send(self.bounded(request), endpoint).await
    }

    /// Returns the `Cookie` header this session would send to `url`.
    #[must_use]
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        self.jar
            .cookies(&parsed)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        request.timeout(self.request_timeout)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, PortalError> {
        let response = request
            .send()
            .await
            .map_err(|e| PortalError::transport(url, e))?;
        debug!(url, status = response.status().as_u16(), "portal response");
        Ok(response)
    }
}

fn require_ok_or_found(response: Response, url: &str) -> Result<Response, PortalError> {
    let status = response.status();
    if status == StatusCode::OK || status == StatusCode::FOUND {
        Ok(response)
    } else {
        Err(PortalError::unexpected_status(url, status.as_u16()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new_rejects_invalid_base_url() {
        let config = SicarConfig::with_base_url("not a url");
        assert!(matches!(
            HttpSession::new(&config),
            Err(PortalError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_session_new_builds_with_legacy_tls() {
        let mut config = SicarConfig::default();
        config.tls = TlsPolicy::Legacy;
        let session = HttpSession::new(&config).unwrap();
        assert!(session.urls().index().ends_with("/publico/imoveis/index"));
    }

    #[test]
    fn test_fresh_session_has_no_cookies() {
        let session = HttpSession::new(&SicarConfig::default()).unwrap();
        assert_eq!(session.cookie_header(&session.urls().captcha()), None);
    }
}
