//! MetalOps CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the MetalOps controllers.

pub mod references;
pub mod conditions;
pub mod operation;
pub mod endpoint;
pub mod bmc;
pub mod server;
pub mod server_claim;
pub mod server_boot_configuration;
pub mod server_maintenance;
pub mod bios_settings;
pub mod bmc_settings;
pub mod bios_version;
pub mod bmc_version;
pub mod sets;

pub use references::*;
pub use conditions::*;
pub use operation::*;
pub use endpoint::*;
pub use bmc::*;
pub use server::*;
pub use server_claim::*;
pub use server_boot_configuration::*;
pub use server_maintenance::*;
pub use bios_settings::*;
pub use bmc_settings::*;
pub use bios_version::*;
pub use bmc_version::*;
pub use sets::*;

/// API group shared by all MetalOps CRDs.
pub const API_GROUP: &str = "metal.microscaler.io";
