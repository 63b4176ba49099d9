//! Thematic layers the portal publishes per region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ModelError;

/// A cadastral layer. Each variant carries the exact token the portal
/// expects in the `tipoBase` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PolygonKind {
    /// Property boundary (`AREA_IMOVEL`).
    AreaProperty,
    /// Permanent preservation areas (`APPS`).
    Apps,
    /// Native vegetation remnants (`VEGETACAO_NATIVA`).
    NativeVegetation,
    /// Consolidated area (`AREA_CONSOLIDADA`).
    ConsolidatedArea,
    /// Fallow area (`AREA_POUSIO`).
    AreaFall,
    /// Hydrography (`HIDROGRAFIA`).
    Hydrography,
    /// Restricted-use area (`USO_RESTRITO`).
    RestrictedUse,
    /// Administrative easement (`SERVIDAO_ADMINISTRATIVA`).
    AdministrativeService,
    /// Legal reserve (`RESERVA_LEGAL`).
    LegalReserve,
}

impl PolygonKind {
    /// Every layer the portal serves.
    pub const ALL: [PolygonKind; 9] = [
        Self::AreaProperty,
        Self::Apps,
        Self::NativeVegetation,
        Self::ConsolidatedArea,
        Self::AreaFall,
        Self::Hydrography,
        Self::RestrictedUse,
        Self::AdministrativeService,
        Self::LegalReserve,
    ];

    /// Returns the wire token sent to the portal.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::AreaProperty => "AREA_IMOVEL",
            Self::Apps => "APPS",
            Self::NativeVegetation => "VEGETACAO_NATIVA",
            Self::ConsolidatedArea => "AREA_CONSOLIDADA",
            Self::AreaFall => "AREA_POUSIO",
            Self::Hydrography => "HIDROGRAFIA",
            Self::RestrictedUse => "USO_RESTRITO",
            Self::AdministrativeService => "SERVIDAO_ADMINISTRATIVA",
            Self::LegalReserve => "RESERVA_LEGAL",
        }
    }

    /// Returns the English constant-style name (e.g. `LEGAL_RESERVE`).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AreaProperty => "AREA_PROPERTY",
            Self::Apps => "APPS",
            Self::NativeVegetation => "NATIVE_VEGETATION",
            Self::ConsolidatedArea => "CONSOLIDATED_AREA",
            Self::AreaFall => "AREA_FALL",
            Self::Hydrography => "HYDROGRAPHY",
            Self::RestrictedUse => "RESTRICTED_USE",
            Self::AdministrativeService => "ADMINISTRATIVE_SERVICE",
            Self::LegalReserve => "LEGAL_RESERVE",
        }
    }

    fn expected_tokens() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.token())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for PolygonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for PolygonKind {
    type Err = ModelError;

    /// Accepts either the wire token (`RESERVA_LEGAL`) or the variant name
    /// (`LEGAL_RESERVE`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == normalized || kind.name() == normalized)
            .ok_or_else(|| ModelError::unknown_polygon_kind(s, Self::expected_tokens()))
    }
}

impl TryFrom<String> for PolygonKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PolygonKind> for String {
    fn from(kind: PolygonKind) -> Self {
        kind.token().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_parse_by_wire_token() {
        assert_eq!(
            "RESERVA_LEGAL".parse::<PolygonKind>().unwrap(),
            PolygonKind::LegalReserve
        );
        assert_eq!(
            "area_imovel".parse::<PolygonKind>().unwrap(),
            PolygonKind::AreaProperty
        );
    }

    #[test]
    fn test_polygon_parse_by_variant_name() {
        assert_eq!(
            "LEGAL_RESERVE".parse::<PolygonKind>().unwrap(),
            PolygonKind::LegalReserve
        );
        assert_eq!(
            "native-vegetation".parse::<PolygonKind>().unwrap(),
            PolygonKind::NativeVegetation
        );
    }

    #[test]
    fn test_polygon_parse_unknown_returns_dedicated_error() {
        let err = "RIVERS".parse::<PolygonKind>().unwrap_err();
        match err {
            ModelError::UnknownPolygonKind { input, expected } => {
                assert_eq!(input, "RIVERS");
                assert!(expected.contains("APPS"));
            }
            other => panic!("Expected UnknownPolygonKind, got: {other:?}"),
        }
    }

    #[test]
    fn test_polygon_tokens_are_unique() {
        let mut tokens: Vec<_> = PolygonKind::ALL.iter().map(|k| k.token()).collect();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), PolygonKind::ALL.len());
    }

    #[test]
    fn test_polygon_display_is_wire_token() {
        assert_eq!(PolygonKind::Hydrography.to_string(), "HIDROGRAFIA");
    }
}
