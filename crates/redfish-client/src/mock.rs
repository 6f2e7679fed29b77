//! Mock Redfish client for unit testing
//!
//! Stores BMC state in memory and can be scripted to return specific task
//! outcomes. Every trait call is recorded so tests can assert that a
//! reconcile issued no writes.

use crate::error::RedfishError;
use crate::models::*;
use crate::redfish_trait::RedfishClientTrait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Mock Redfish client for testing
#[derive(Clone)]
pub struct MockRedfishClient {
    address: String,
    systems: Arc<Mutex<HashMap<String, ComputerSystem>>>,
    power: Arc<Mutex<HashMap<String, PowerState>>>,
    bios_attributes: Arc<Mutex<HashMap<String, Attributes>>>,
    // Patched attributes staged until the next power-on applies them
    staged_bios: Arc<Mutex<HashMap<String, Attributes>>>,
    registries: Arc<Mutex<HashMap<String, AttributeRegistry>>>,
    managers: Arc<Mutex<HashMap<String, Manager>>>,
    manager_attributes: Arc<Mutex<HashMap<String, Attributes>>>,
    firmware: Arc<Mutex<HashMap<String, SoftwareInventory>>>,
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    // Outcome popped per simple_update submission; defaults to Completed
    task_script: Arc<Mutex<VecDeque<TaskState>>>,
    // (component, version) applied when an update task completes
    pending_firmware: Arc<Mutex<Option<(String, String)>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_auth: Arc<Mutex<bool>>,
    next_task_id: Arc<Mutex<u64>>,
}

impl MockRedfishClient {
    /// Create a new mock client
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            systems: Arc::new(Mutex::new(HashMap::new())),
            power: Arc::new(Mutex::new(HashMap::new())),
            bios_attributes: Arc::new(Mutex::new(HashMap::new())),
            staged_bios: Arc::new(Mutex::new(HashMap::new())),
            registries: Arc::new(Mutex::new(HashMap::new())),
            managers: Arc::new(Mutex::new(HashMap::new())),
            manager_attributes: Arc::new(Mutex::new(HashMap::new())),
            firmware: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            task_script: Arc::new(Mutex::new(VecDeque::new())),
            pending_firmware: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_auth: Arc::new(Mutex::new(false)),
            next_task_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a system to the mock store (for test setup)
    pub fn add_system(&self, system: ComputerSystem) {
        let power = system.power_state.unwrap_or(PowerState::Off);
        self.power.lock().unwrap().insert(system.id.clone(), power);
        self.systems.lock().unwrap().insert(system.id.clone(), system);
    }

    /// Set the current BIOS attributes of a system
    pub fn set_bios_attributes(&self, system_id: &str, attributes: Attributes) {
        self.bios_attributes
            .lock()
            .unwrap()
            .insert(system_id.to_string(), attributes);
    }

    /// Set the attribute registry of a system
    pub fn set_attribute_registry(&self, system_id: &str, registry: AttributeRegistry) {
        self.registries
            .lock()
            .unwrap()
            .insert(system_id.to_string(), registry);
    }

    /// Add a manager to the mock store
    pub fn add_manager(&self, manager: Manager) {
        self.managers.lock().unwrap().insert(manager.id.clone(), manager);
    }

    /// Set the manager attributes
    pub fn set_manager_attributes(&self, manager_id: &str, attributes: Attributes) {
        self.manager_attributes
            .lock()
            .unwrap()
            .insert(manager_id.to_string(), attributes);
    }

    /// Set a firmware inventory entry
    pub fn set_firmware(&self, component_id: &str, version: &str) {
        self.firmware.lock().unwrap().insert(
            component_id.to_string(),
            SoftwareInventory {
                id: component_id.to_string(),
                version: Some(version.to_string()),
                updateable: Some(true),
            },
        );
    }

    /// Script the outcomes of subsequent update task submissions
    pub fn script_task_outcomes(&self, outcomes: Vec<TaskState>) {
        *self.task_script.lock().unwrap() = outcomes.into();
    }

    /// Version written to the component once an update task completes
    pub fn stage_firmware_update(&self, component_id: &str, version: &str) {
        *self.pending_firmware.lock().unwrap() =
            Some((component_id.to_string(), version.to_string()));
    }

    /// Make every call fail with an authentication error
    pub fn fail_authentication(&self, fail: bool) {
        *self.fail_auth.lock().unwrap() = fail;
    }

    /// Calls recorded so far, as "method system" strings
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Clear the recorded calls
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Current power state of a system (test inspection)
    pub fn power_of(&self, system_id: &str) -> Option<PowerState> {
        self.power.lock().unwrap().get(system_id).copied()
    }

    /// Current BIOS attributes of a system (test inspection)
    pub fn bios_of(&self, system_id: &str) -> Attributes {
        self.bios_attributes
            .lock()
            .unwrap()
            .get(system_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), RedfishError> {
        if *self.fail_auth.lock().unwrap() {
            return Err(RedfishError::Authentication("401 Unauthorized".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn apply_staged_bios(&self, system_id: &str) {
        if let Some(staged) = self.staged_bios.lock().unwrap().remove(system_id) {
            let mut all = self.bios_attributes.lock().unwrap();
            let current = all.entry(system_id.to_string()).or_default();
            for (key, value) in staged {
                current.insert(key, value);
            }
        }
    }
}

#[async_trait::async_trait]
impl RedfishClientTrait for MockRedfishClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_service_root(&self) -> Result<ServiceRoot, RedfishError> {
        self.record("get_service_root".to_string())?;
        Ok(ServiceRoot {
            uuid: Some("00000000-0000-0000-0000-000000000000".to_string()),
            systems: Some(ODataId {
                odata_id: "/redfish/v1/Systems".to_string(),
            }),
            managers: Some(ODataId {
                odata_id: "/redfish/v1/Managers".to_string(),
            }),
            update_service: Some(ODataId {
                odata_id: "/redfish/v1/UpdateService".to_string(),
            }),
        })
    }

    async fn list_systems(&self) -> Result<Vec<ComputerSystem>, RedfishError> {
        self.record("list_systems".to_string())?;
        let power = self.power.lock().unwrap();
        let mut systems: Vec<ComputerSystem> = self
            .systems
            .lock()
            .unwrap()
            .values()
            .cloned()
            .map(|mut s| {
                s.power_state = power.get(&s.id).copied();
                s
            })
            .collect();
        systems.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(systems)
    }

    async fn get_system(&self, system_id: &str) -> Result<ComputerSystem, RedfishError> {
        self.record(format!("get_system {system_id}"))?;
        let mut system = self
            .systems
            .lock()
            .unwrap()
            .get(system_id)
            .cloned()
            .ok_or_else(|| RedfishError::NotFound(format!("system {system_id}")))?;
        system.power_state = self.power.lock().unwrap().get(system_id).copied();
        Ok(system)
    }

    async fn get_power_state(&self, system_id: &str) -> Result<PowerState, RedfishError> {
        self.record(format!("get_power_state {system_id}"))?;
        self.power
            .lock()
            .unwrap()
            .get(system_id)
            .copied()
            .ok_or_else(|| RedfishError::NotFound(format!("system {system_id}")))
    }

    async fn reset_system(&self, system_id: &str, reset_type: ResetType) -> Result<(), RedfishError> {
        self.record(format!("reset_system {system_id} {reset_type:?}"))?;
        let next = match reset_type {
            ResetType::On
            | ResetType::ForceOn
            | ResetType::GracefulRestart
            | ResetType::ForceRestart
            | ResetType::PowerCycle => PowerState::On,
            ResetType::GracefulShutdown | ResetType::ForceOff => PowerState::Off,
        };
        if next == PowerState::On {
            // A reboot applies attributes staged in the settings object
            self.apply_staged_bios(system_id);
        }
        self.power.lock().unwrap().insert(system_id.to_string(), next);
        Ok(())
    }

    async fn set_boot_override(
        &self,
        system_id: &str,
        target: &str,
        enabled: &str,
    ) -> Result<(), RedfishError> {
        self.record(format!("set_boot_override {system_id} {target} {enabled}"))?;
        if let Some(system) = self.systems.lock().unwrap().get_mut(system_id) {
            let boot = system.boot.get_or_insert_with(Boot::default);
            boot.boot_source_override_target = Some(target.to_string());
            boot.boot_source_override_enabled = Some(enabled.to_string());
        }
        Ok(())
    }

    async fn set_boot_order(&self, system_id: &str, order: &[String]) -> Result<(), RedfishError> {
        self.record(format!("set_boot_order {system_id}"))?;
        if let Some(system) = self.systems.lock().unwrap().get_mut(system_id) {
            let boot = system.boot.get_or_insert_with(Boot::default);
            boot.boot_order = Some(order.to_vec());
        }
        Ok(())
    }

    async fn set_indicator_led(&self, system_id: &str, led: &str) -> Result<(), RedfishError> {
        self.record(format!("set_indicator_led {system_id} {led}"))?;
        if let Some(system) = self.systems.lock().unwrap().get_mut(system_id) {
            system.indicator_led = Some(led.to_string());
        }
        Ok(())
    }

    async fn get_bios_attributes(&self, system_id: &str) -> Result<Attributes, RedfishError> {
        self.record(format!("get_bios_attributes {system_id}"))?;
        Ok(self.bios_of(system_id))
    }

    async fn get_bios_attribute_registry(
        &self,
        system_id: &str,
    ) -> Result<AttributeRegistry, RedfishError> {
        self.record(format!("get_bios_attribute_registry {system_id}"))?;
        Ok(self
            .registries
            .lock()
            .unwrap()
            .get(system_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn patch_bios_attributes(
        &self,
        system_id: &str,
        attributes: &Attributes,
    ) -> Result<(), RedfishError> {
        self.record(format!("patch_bios_attributes {system_id}"))?;
        let mut staged = self.staged_bios.lock().unwrap();
        let entry = staged.entry(system_id.to_string()).or_default();
        for (key, value) in attributes {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_managers(&self) -> Result<Vec<Manager>, RedfishError> {
        self.record("list_managers".to_string())?;
        let mut managers: Vec<Manager> = self.managers.lock().unwrap().values().cloned().collect();
        managers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(managers)
    }

    async fn get_manager(&self, manager_id: &str) -> Result<Manager, RedfishError> {
        self.record(format!("get_manager {manager_id}"))?;
        self.managers
            .lock()
            .unwrap()
            .get(manager_id)
            .cloned()
            .ok_or_else(|| RedfishError::NotFound(format!("manager {manager_id}")))
    }

    async fn get_manager_attributes(&self, manager_id: &str) -> Result<Attributes, RedfishError> {
        self.record(format!("get_manager_attributes {manager_id}"))?;
        Ok(self
            .manager_attributes
            .lock()
            .unwrap()
            .get(manager_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn patch_manager_attributes(
        &self,
        manager_id: &str,
        attributes: &Attributes,
    ) -> Result<(), RedfishError> {
        self.record(format!("patch_manager_attributes {manager_id}"))?;
        let mut all = self.manager_attributes.lock().unwrap();
        let entry = all.entry(manager_id.to_string()).or_default();
        for (key, value) in attributes {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn reset_manager(&self, manager_id: &str) -> Result<(), RedfishError> {
        self.record(format!("reset_manager {manager_id}"))?;
        Ok(())
    }

    async fn get_firmware_inventory(
        &self,
        component_id: &str,
    ) -> Result<SoftwareInventory, RedfishError> {
        self.record(format!("get_firmware_inventory {component_id}"))?;
        self.firmware
            .lock()
            .unwrap()
            .get(component_id)
            .cloned()
            .ok_or_else(|| RedfishError::NotFound(format!("firmware {component_id}")))
    }

    async fn simple_update(&self, request: &SimpleUpdateRequest) -> Result<String, RedfishError> {
        self.record(format!("simple_update {}", request.image_uri))?;
        let outcome = self
            .task_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TaskState::Completed);

        let id = {
            let mut next = self.next_task_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let uri = format!("/redfish/v1/TaskService/Tasks/{id}");
        let task = Task {
            id: id.to_string(),
            task_state: Some(outcome),
            task_status: Some(if outcome == TaskState::Completed {
                "OK".to_string()
            } else {
                "Critical".to_string()
            }),
            percent_complete: Some(if outcome == TaskState::Completed { 100 } else { 0 }),
        };
        if outcome == TaskState::Completed {
            if let Some((component, version)) = self.pending_firmware.lock().unwrap().clone() {
                self.set_firmware(&component, &version);
            }
        }
        self.tasks.lock().unwrap().insert(uri.clone(), task);
        Ok(uri)
    }

    async fn get_task(&self, task_uri: &str) -> Result<Task, RedfishError> {
        self.record(format!("get_task {task_uri}"))?;
        self.tasks
            .lock()
            .unwrap()
            .get(task_uri)
            .cloned()
            .ok_or_else(|| RedfishError::NotFound(format!("task {task_uri}")))
    }

    async fn create_event_subscription(&self, destination: &str) -> Result<(), RedfishError> {
        self.record(format!("create_event_subscription {destination}"))?;
        Ok(())
    }
}
