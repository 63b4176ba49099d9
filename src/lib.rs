//! SICAR Core Library
//!
//! This library downloads rural-property cadastral shapefiles from the
//! SICAR public query portal, whose export endpoints are gated behind
//! five-character image captchas.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`model`] - Regions, polygon layers, CAR numbers and download targets
//! - [`config`] - TOML configuration with validated defaults
//! - [`portal`] - Cookie-bearing HTTP session, endpoints and property search
//! - [`captcha`] - Captcha images and pluggable OCR solvers
//! - [`download`] - The captcha attempt loop, payload decoding and batches
//! - [`release`] - Per-region release date scraping
//!
//! # Example
//!
//! ```no_run
//! use sicar_core::captcha::build_solver;
//! use sicar_core::{CarNumber, Sicar, SicarConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SicarConfig::default();
//! let mut sicar = Sicar::connect(&config, build_solver(&config.solver)).await?;
//!
//! let car: CarNumber = "SP-3538709-4861E981046E49BC81720C879459E554".parse()?;
//! let outcome = sicar.download_property(&car).await?;
//! println!("{} ({} bytes, {} attempts)", outcome.filename, outcome.len(), outcome.attempts);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod captcha;
pub mod config;
pub mod download;
pub mod model;
pub mod portal;
pub mod release;
mod user_agent;

// Re-export commonly used types
pub use captcha::{CaptchaSolver, build_solver};
pub use config::{ConfigError, SicarConfig, SolverConfig, SolverKind, TlsPolicy};
pub use download::{
    AttemptError, BatchDownloader, BatchReport, CaptchaRetryPolicy, DownloadError,
    DownloadOutcome, Sicar,
};
pub use model::{CarNumber, DownloadTarget, ModelError, PolygonKind, Region};
pub use portal::{PortalError, PropertyRecord};
pub use release::{ReleaseDates, parse_release_dates};
pub use user_agent::BROWSER_USER_AGENT;
