//! What a single orchestration run downloads.

use std::fmt;

use serde::Serialize;

use super::{CarNumber, PolygonKind, Region};

/// One downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadTarget {
    /// A thematic layer for a whole region.
    RegionPolygon {
        /// Federative unit.
        region: Region,
        /// Thematic layer.
        kind: PolygonKind,
    },
    /// A single registered property.
    Property {
        /// Public registration number.
        car: CarNumber,
    },
}

impl DownloadTarget {
    /// Shorthand for [`DownloadTarget::RegionPolygon`].
    #[must_use]
    pub fn region_polygon(region: Region, kind: PolygonKind) -> Self {
        Self::RegionPolygon { region, kind }
    }

    /// Shorthand for [`DownloadTarget::Property`].
    #[must_use]
    pub fn property(car: CarNumber) -> Self {
        Self::Property { car }
    }

    /// Deterministic output file name: `{region}_{token}.zip` or
    /// `{car_stem}.zip`.
    #[must_use]
    pub fn filename(&self) -> String {
        match self {
            Self::RegionPolygon { region, kind } => format!("{region}_{}.zip", kind.token()),
            Self::Property { car } => format!("{}.zip", car.file_stem()),
        }
    }
}

impl fmt::Display for DownloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegionPolygon { region, kind } => write!(f, "{region}/{}", kind.token()),
            Self::Property { car } => write!(f, "car:{car}"),
        }
    }
}
