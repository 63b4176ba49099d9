//! CAR number to internal property id resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::{HttpSession, PortalError};
use crate::model::CarNumber;

/// One property as returned by the portal's search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    /// Opaque internal id required by the export endpoint.
    pub id: String,
    /// Public CAR number that was searched.
    pub car_number: CarNumber,
    /// Feature attributes as published (area, municipality, status, ...).
    pub properties: Map<String, Value>,
    /// GeoJSON geometry, when the portal includes it.
    pub geometry: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Value>,
}

/// Resolves public CAR numbers through the search endpoint.
///
/// A single best-effort call: absence of the property is a data condition,
/// not a transient one, so nothing here retries.
#[derive(Debug, Clone)]
pub struct PropertyLocator {
    session: HttpSession,
}

impl PropertyLocator {
    /// Creates a locator that searches through `session`.
    #[must_use]
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    /// Returns the first matching feature for `car_number`.
    ///
    /// # Errors
    ///
    /// - [`PortalError::PropertyNotFound`] when the feature list is empty
    /// - [`PortalError::PropertyLookupFailed`] for transport errors, bad
    ///   statuses, unparseable bodies, or a feature without an id
    #[instrument(skip(self), fields(car_number = %car_number))]
    pub async fn search(&self, car_number: &CarNumber) -> Result<PropertyRecord, PortalError> {
        let endpoint = self.session.urls().property_search();
        let response = self
            .session
            .get_checked_with_query(&endpoint, &[("text", car_number.as_str())])
            .await
            .map_err(|e| PortalError::property_lookup_failed(car_number.as_str(), e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PortalError::property_lookup_failed(car_number.as_str(), e.to_string()))?;

        let record = parse_search_response(car_number, &body)?;
        info!(internal_id = %record.id, "property resolved");
        Ok(record)
    }

    /// Returns only the internal id for `car_number`.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn resolve(&self, car_number: &CarNumber) -> Result<String, PortalError> {
        self.search(car_number).await.map(|record| record.id)
    }
}

fn parse_search_response(car_number: &CarNumber, body: &[u8]) -> Result<PropertyRecord, PortalError> {
    let collection: FeatureCollection = serde_json::from_slice(body).map_err(|e| {
        PortalError::property_lookup_failed(car_number.as_str(), format!("invalid search response: {e}"))
    })?;

    debug!(features = collection.features.len(), "search response parsed");

    let Some(feature) = collection.features.into_iter().next() else {
        return Err(PortalError::property_not_found(car_number.as_str()));
    };

    let id = feature.id.as_ref().and_then(id_to_string).ok_or_else(|| {
        PortalError::property_lookup_failed(car_number.as_str(), "first feature has no id")
    })?;

    Ok(PropertyRecord {
        id,
        car_number: car_number.clone(),
        properties: feature.properties.unwrap_or_default(),
        geometry: feature.geometry,
    })
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn car() -> CarNumber {
        "SP-3538709-4861E981046E49BC81720C879459E554".parse().unwrap()
    }

    #[test]
    fn test_parse_search_response_returns_first_feature() {
        let body = br#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":123456,"properties":{"municipio":"Piracicaba"},"geometry":null},
            {"type":"Feature","id":999}
        ]}"#;
        let record = parse_search_response(&car(), body).unwrap();
        assert_eq!(record.id, "123456");
        assert_eq!(record.properties.get("municipio").unwrap(), "Piracicaba");
        assert!(record.geometry.is_none());
    }

    #[test]
    fn test_parse_search_response_accepts_string_ids() {
        let body = br#"{"features":[{"id":" SP-abc123 "}]}"#;
        let record = parse_search_response(&car(), body).unwrap();
        assert_eq!(record.id, "SP-abc123");
    }

    #[test]
    fn test_parse_search_response_empty_features_is_not_found() {
        let err = parse_search_response(&car(), br#"{"features":[]}"#).unwrap_err();
        assert!(matches!(err, PortalError::PropertyNotFound { .. }), "got: {err:?}");
    }

    #[test]
    fn test_parse_search_response_missing_id_is_lookup_failure() {
        let err = parse_search_response(&car(), br#"{"features":[{"properties":{}}]}"#).unwrap_err();
        assert!(matches!(err, PortalError::PropertyLookupFailed { .. }), "got: {err:?}");
    }

    #[test]
    fn test_parse_search_response_html_body_is_lookup_failure() {
        let err = parse_search_response(&car(), b"<html>erro</html>").unwrap_err();
        assert!(matches!(err, PortalError::PropertyLookupFailed { .. }));
    }
}
