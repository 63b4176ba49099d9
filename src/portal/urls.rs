//! Endpoint layout of the public query portal.

use url::Url;

use super::PortalError;

/// Absolute endpoint URLs derived from one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    base: String,
}

impl PortalUrls {
    /// Validates `base` and strips any trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::InvalidUrl`] when `base` is not an absolute URL.
    pub fn new(base: &str) -> Result<Self, PortalError> {
        let trimmed = base.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|source| PortalError::InvalidUrl {
            url: base.to_string(),
            source,
        })?;
        Ok(Self {
            base: trimmed.to_string(),
        })
    }

    /// Session bootstrap page; visiting it sets the session cookies.
    #[must_use]
    pub fn index(&self) -> String {
        format!("{}/imoveis/index", self.base)
    }

    /// Captcha image endpoint.
    #[must_use]
    pub fn captcha(&self) -> String {
        format!("{}/municipios/ReCaptcha", self.base)
    }

    /// Region/polygon shapefile download endpoint (GET, captcha-protected).
    #[must_use]
    pub fn state_download(&self) -> String {
        format!("{}/estados/downloadBase", self.base)
    }

    /// HTML page listing per-region release dates.
    #[must_use]
    pub fn release_dates(&self) -> String {
        format!("{}/estados/downloads", self.base)
    }

    /// Property search endpoint returning a feature collection.
    #[must_use]
    pub fn property_search(&self) -> String {
        format!("{}/imoveis/search", self.base)
    }

    /// Property shapefile export endpoint (POST, captcha-protected).
    #[must_use]
    pub fn property_export(&self) -> String {
        format!("{}/imoveis/exportShapeFile", self.base)
    }
}

/// Appends `params` to `endpoint` as an encoded query string.
pub(crate) fn with_query(endpoint: &str, params: &[(&str, &str)]) -> Result<Url, PortalError> {
    let mut url = Url::parse(endpoint).map_err(|source| PortalError::InvalidUrl {
        url: endpoint.to_string(),
        source,
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
