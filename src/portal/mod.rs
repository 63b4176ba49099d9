//! Portal access: the cookie-bearing session, endpoint layout and the
//! property search.
//!
//! # Example
//!
//! ```no_run
//! use sicar_core::config::SicarConfig;
//! use sicar_core::portal::{HttpSession, PropertyLocator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = HttpSession::new(&SicarConfig::default())?;
//! session.initialize().await?;
//! let locator = PropertyLocator::new(session);
//! let record = locator.search(&"SP-3538709-4861E981046E49BC81720C879459E554".parse()?).await?;
//! println!("internal id: {}", record.id);
//! # Ok(())
//! # }
//! ```

mod error;
mod property;
mod session;
mod urls;

pub use error::PortalError;
pub use property::{PropertyLocator, PropertyRecord};
pub use session::HttpSession;
pub use urls::PortalUrls;
