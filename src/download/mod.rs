//! Captcha-gated shapefile downloads.
//!
//! This module turns noisy captcha rounds into ZIP archives:
//!
//! - [`Sicar`] drives one session through the attempt loop for region layers
//!   and single properties
//! - [`run_attempts`] is the attempt-bounded loop both variants share
//! - [`normalize`] unwraps data-URL export bodies
//! - [`BatchDownloader`] fans many targets out over independent sessions
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use sicar_core::captcha::build_solver;
//! use sicar_core::download::Sicar;
//! use sicar_core::{PolygonKind, Region, SicarConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SicarConfig::default();
//! let mut sicar = Sicar::connect(&config, build_solver(&config.solver)).await?;
//! let path = sicar
//!     .download_region_polygon_to(Region::SP, PolygonKind::Apps, Path::new("./downloads"))
//!     .await?;
//! println!("Downloaded: {}", path.display());
//! # Ok(())
//! # }
//! ```

mod batch;
mod constants;
mod decoder;
mod error;
mod orchestrator;
mod retry;

pub use batch::{BatchDownloader, BatchReport, BatchStats, TargetReport};
pub use constants::{DEFAULT_JITTER_MAX, DEFAULT_MAX_ATTEMPTS};
pub use decoder::{DATA_URL_PREFIX, PayloadDecodeError, PayloadFormat, has_zip_signature, normalize};
pub use error::{AttemptError, DownloadError};
pub use orchestrator::{DownloadOutcome, Sicar};
pub use retry::{CaptchaRetryPolicy, run_attempts};
