//! Redfish BMC Client
//!
//! A Rust client library for managing servers through their BMCs over the
//! Redfish HTTPS/JSON protocol. Provides type-safe models and methods for
//! Systems, Managers, BIOS attributes, firmware updates, and event
//! subscriptions.
//!
//! # Example
//!
//! ```no_run
//! use redfish_client::{RedfishClient, RedfishClientTrait, ResetType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client
//! let client = RedfishClient::new(
//!     "https://10.0.0.1:443".to_string(),
//!     "root".to_string(),
//!     "calvin".to_string(),
//!     true,
//! )?;
//!
//! // Enumerate systems and power one on
//! let systems = client.list_systems().await?;
//! if let Some(system) = systems.first() {
//!     client.reset_system(&system.id, ResetType::On).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Systems**: inventory, power control, boot override, indicator LED
//! - **BIOS**: attribute read/patch, attribute-registry reset classification
//! - **Managers**: attribute read/patch, manager reset
//! - **UpdateService**: SimpleUpdate task submission and polling
//! - **test-util**: in-memory [`MockRedfishClient`] for unit tests

pub mod client;
pub mod driver;
pub mod error;
pub mod models;
pub mod pool;
pub mod redfish_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::RedfishClient;
pub use driver::{connect, BmcProtocol};
pub use error::RedfishError;
pub use models::*;
pub use pool::RedfishClientPool;
pub use redfish_trait::RedfishClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockRedfishClient;
