//! RedfishClient trait for mocking
//!
//! This trait abstracts the Redfish client to enable mocking in unit tests.
//! The concrete RedfishClient implements this trait, and tests use the mock
//! implementation behind the `test-util` feature.

use crate::error::RedfishError;
use crate::models::*;

/// Capability set every BMC driver must provide
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait RedfishClientTrait: Send + Sync {
    /// Base address of the managed BMC
    fn address(&self) -> &str;

    /// Fetch the service root (also serves as a connectivity/credentials probe)
    async fn get_service_root(&self) -> Result<ServiceRoot, RedfishError>;

    // Systems
    async fn list_systems(&self) -> Result<Vec<ComputerSystem>, RedfishError>;
    async fn get_system(&self, system_id: &str) -> Result<ComputerSystem, RedfishError>;
    async fn get_power_state(&self, system_id: &str) -> Result<PowerState, RedfishError>;
    async fn reset_system(&self, system_id: &str, reset_type: ResetType) -> Result<(), RedfishError>;
    async fn set_boot_override(&self, system_id: &str, target: &str, enabled: &str) -> Result<(), RedfishError>;
    async fn set_boot_order(&self, system_id: &str, order: &[String]) -> Result<(), RedfishError>;
    async fn set_indicator_led(&self, system_id: &str, led: &str) -> Result<(), RedfishError>;

    // BIOS
    async fn get_bios_attributes(&self, system_id: &str) -> Result<Attributes, RedfishError>;
    async fn get_bios_attribute_registry(&self, system_id: &str) -> Result<AttributeRegistry, RedfishError>;
    async fn patch_bios_attributes(&self, system_id: &str, attributes: &Attributes) -> Result<(), RedfishError>;

    // Managers
    async fn list_managers(&self) -> Result<Vec<Manager>, RedfishError>;
    async fn get_manager(&self, manager_id: &str) -> Result<Manager, RedfishError>;
    async fn get_manager_attributes(&self, manager_id: &str) -> Result<Attributes, RedfishError>;
    async fn patch_manager_attributes(&self, manager_id: &str, attributes: &Attributes) -> Result<(), RedfishError>;
    async fn reset_manager(&self, manager_id: &str) -> Result<(), RedfishError>;

    // UpdateService
    async fn get_firmware_inventory(&self, component_id: &str) -> Result<SoftwareInventory, RedfishError>;
    async fn simple_update(&self, request: &SimpleUpdateRequest) -> Result<String, RedfishError>;
    async fn get_task(&self, task_uri: &str) -> Result<Task, RedfishError>;

    // EventService
    async fn create_event_subscription(&self, destination: &str) -> Result<(), RedfishError>;
}
