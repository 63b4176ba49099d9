//! Domain values: regions, polygon layers, CAR numbers and download targets.
//!
//! Regions, layers and CAR numbers are closed or validated sets parsed from
//! user text before any network activity, so an invalid token never reaches
//! the captcha loop.

mod car;
mod error;
mod polygon;
mod region;
mod target;

pub use car::CarNumber;
pub use error::ModelError;
pub use polygon::PolygonKind;
pub use region::Region;
pub use target::DownloadTarget;
