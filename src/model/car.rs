//! Public CAR registration numbers.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ModelError, Region};

/// `UF-IBGE_MUNICIPALITY-HASH`, where older registrations carry dotted hashes.
#[allow(clippy::expect_used)]
static CAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{2})-(\d{7})-([0-9A-Za-z.]+)$")
        .expect("CAR number regex is valid")
});

/// A public, human-meaningful rural-property registration code such as
/// `SP-3538709-4861E981046E49BC81720C879459E554`.
///
/// Distinct from the portal's internal property id, which must be looked up
/// through the search endpoint before an export can be requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CarNumber {
    raw: String,
    region: Region,
}

impl CarNumber {
    /// Returns the number as the user supplied it (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the region encoded in the number's prefix.
    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    /// File-name-safe rendition: `-`, `/`, `\` and `:` become `_`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.raw
            .chars()
            .map(|c| if matches!(c, '-' | '/' | '\\' | ':') { '_' } else { c })
            .collect()
    }
}

impl fmt::Display for CarNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for CarNumber {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ModelError::invalid_car_number(s, "value is empty"));
        }
        let Some(captures) = CAR_PATTERN.captures(trimmed) else {
            return Err(ModelError::invalid_car_number(
                s,
                "expected UF-MUNICIPALITY-HASH (e.g. SP-3538709-4861E981046E49BC81720C879459E554)",
            ));
        };
        let region = captures[1]
            .parse::<Region>()
            .map_err(|_| ModelError::invalid_car_number(s, "prefix is not a known region"))?;

        Ok(Self {
            raw: trimmed.to_string(),
            region,
        })
    }
}

impl TryFrom<String> for CarNumber {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CarNumber> for String {
    fn from(car: CarNumber) -> Self {
        car.raw
    }
}
