//! Discovery reconcilers
//!
//! Handles: Endpoint resolution into BMCs, BMC status and Server derivation.

pub mod endpoint;
#[cfg(test)]
pub mod endpoint_test;
pub mod bmc;
#[cfg(test)]
pub mod bmc_test;
