//! Redfish HTTP client
//!
//! Implements the Redfish REST operations the controllers need against a real
//! BMC: Systems, Managers, Bios, UpdateService, and EventService.

use crate::error::RedfishError;
use crate::models::*;
use crate::redfish_trait::RedfishClientTrait;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Initial delay of the transient-error retry schedule.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// Cap on the transient-error retry delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
/// Attempts per request before a transient error surfaces to the caller.
const RETRY_ATTEMPTS: u32 = 4;

/// Redfish API client for one BMC
pub struct RedfishClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl RedfishClient {
    /// Create a new Redfish client.
    ///
    /// # Arguments
    /// * `base_url` - BMC base URL (e.g. "https://10.0.0.1:443")
    /// * `username` / `password` - basic-auth credentials
    /// * `insecure` - accept self-signed BMC certificates
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        insecure: bool,
    ) -> Result<Self, RedfishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(RedfishError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a request, retrying transient transport failures with
    /// exponential backoff (100ms doubling, capped at 30s).
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, RedfishError> {
        let url = self.url(path);
        let mut delay = RETRY_BASE_DELAY;

        for attempt in 1..=RETRY_ATTEMPTS {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt < RETRY_ATTEMPTS {
                        warn!("Redfish {} {} returned {}, retrying", method, url, status);
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    warn!("Redfish {} {} transport error: {}, retrying", method, url, e);
                }
                Err(e) => return Err(RedfishError::Transport(e)),
            }

            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 2, RETRY_MAX_DELAY);
        }

        // The loop always returns on the last attempt
        Err(RedfishError::Api(format!("retries exhausted for {url}")))
    }

    /// Map a non-success response into the error taxonomy.
    async fn check_status(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, RedfishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RedfishError::Authentication(
                format!("{context}: {status}"),
            )),
            StatusCode::NOT_FOUND => Err(RedfishError::NotFound(context.to_string())),
            _ => Err(RedfishError::Api(format!("{context}: {status} - {body}"))),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        context: &str,
    ) -> Result<T, RedfishError> {
        debug!("GET {}", path);
        let response = self.request(Method::GET, path, None).await?;
        let response = Self::check_status(response, context).await?;
        let value = response.json().await.map_err(RedfishError::Transport)?;
        Ok(value)
    }

    async fn patch_json(
        &self,
        path: &str,
        body: serde_json::Value,
        context: &str,
    ) -> Result<(), RedfishError> {
        debug!("PATCH {}", path);
        let response = self.request(Method::PATCH, path, Some(&body)).await?;
        Self::check_status(response, context).await?;
        Ok(())
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        context: &str,
    ) -> Result<reqwest::Response, RedfishError> {
        debug!("POST {}", path);
        let response = self.request(Method::POST, path, Some(&body)).await?;
        Self::check_status(response, context).await
    }
}

#[async_trait::async_trait]
impl RedfishClientTrait for RedfishClient {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn get_service_root(&self) -> Result<ServiceRoot, RedfishError> {
        self.get_json("/redfish/v1", "service root").await
    }

    async fn list_systems(&self) -> Result<Vec<ComputerSystem>, RedfishError> {
        let collection: Collection = self
            .get_json("/redfish/v1/Systems", "systems collection")
            .await?;
        let mut systems = Vec::with_capacity(collection.members.len());
        for member in &collection.members {
            let system: ComputerSystem = self
                .get_json(&member.odata_id, &format!("system {}", member.odata_id))
                .await?;
            systems.push(system);
        }
        Ok(systems)
    }

    async fn get_system(&self, system_id: &str) -> Result<ComputerSystem, RedfishError> {
        let path = format!("/redfish/v1/Systems/{}", urlencoding::encode(system_id));
        self.get_json(&path, &format!("system {system_id}")).await
    }

    async fn get_power_state(&self, system_id: &str) -> Result<PowerState, RedfishError> {
        let system = self.get_system(system_id).await?;
        system
            .power_state
            .ok_or_else(|| RedfishError::Api(format!("system {system_id} has no PowerState")))
    }

    async fn reset_system(&self, system_id: &str, reset_type: ResetType) -> Result<(), RedfishError> {
        let path = format!(
            "/redfish/v1/Systems/{}/Actions/ComputerSystem.Reset",
            urlencoding::encode(system_id)
        );
        let body = serde_json::json!({ "ResetType": reset_type });
        self.post_json(&path, body, &format!("reset system {system_id}"))
            .await?;
        Ok(())
    }

    async fn set_boot_override(
        &self,
        system_id: &str,
        target: &str,
        enabled: &str,
    ) -> Result<(), RedfishError> {
        let path = format!("/redfish/v1/Systems/{}", urlencoding::encode(system_id));
        let body = serde_json::json!({
            "Boot": {
                "BootSourceOverrideTarget": target,
                "BootSourceOverrideEnabled": enabled,
            }
        });
        self.patch_json(&path, body, &format!("boot override on {system_id}"))
            .await
    }

    async fn set_boot_order(&self, system_id: &str, order: &[String]) -> Result<(), RedfishError> {
        let path = format!("/redfish/v1/Systems/{}", urlencoding::encode(system_id));
        let body = serde_json::json!({ "Boot": { "BootOrder": order } });
        self.patch_json(&path, body, &format!("boot order on {system_id}"))
            .await
    }

    async fn set_indicator_led(&self, system_id: &str, led: &str) -> Result<(), RedfishError> {
        let path = format!("/redfish/v1/Systems/{}", urlencoding::encode(system_id));
        let body = serde_json::json!({ "IndicatorLED": led });
        self.patch_json(&path, body, &format!("indicator LED on {system_id}"))
            .await
    }

    async fn get_bios_attributes(&self, system_id: &str) -> Result<Attributes, RedfishError> {
        let path = format!("/redfish/v1/Systems/{}/Bios", urlencoding::encode(system_id));
        #[derive(serde::Deserialize)]
        struct Bios {
            #[serde(rename = "Attributes", default)]
            attributes: Attributes,
        }
        let bios: Bios = self.get_json(&path, &format!("bios of {system_id}")).await?;
        Ok(bios.attributes)
    }

    async fn get_bios_attribute_registry(
        &self,
        system_id: &str,
    ) -> Result<AttributeRegistry, RedfishError> {
        let path = format!(
            "/redfish/v1/Registries/BiosAttributeRegistry/{}",
            urlencoding::encode(system_id)
        );
        self.get_json(&path, &format!("attribute registry of {system_id}"))
            .await
    }

    async fn patch_bios_attributes(
        &self,
        system_id: &str,
        attributes: &Attributes,
    ) -> Result<(), RedfishError> {
        let path = format!(
            "/redfish/v1/Systems/{}/Bios/Settings",
            urlencoding::encode(system_id)
        );
        let body = serde_json::json!({ "Attributes": attributes });
        self.patch_json(&path, body, &format!("bios settings on {system_id}"))
            .await
    }

    async fn list_managers(&self) -> Result<Vec<Manager>, RedfishError> {
        let collection: Collection = self
            .get_json("/redfish/v1/Managers", "managers collection")
            .await?;
        let mut managers = Vec::with_capacity(collection.members.len());
        for member in &collection.members {
            let manager: Manager = self
                .get_json(&member.odata_id, &format!("manager {}", member.odata_id))
                .await?;
            managers.push(manager);
        }
        Ok(managers)
    }

    async fn get_manager(&self, manager_id: &str) -> Result<Manager, RedfishError> {
        let path = format!("/redfish/v1/Managers/{}", urlencoding::encode(manager_id));
        self.get_json(&path, &format!("manager {manager_id}")).await
    }

    async fn get_manager_attributes(&self, manager_id: &str) -> Result<Attributes, RedfishError> {
        let path = format!(
            "/redfish/v1/Managers/{}/Attributes",
            urlencoding::encode(manager_id)
        );
        #[derive(serde::Deserialize)]
        struct ManagerAttributes {
            #[serde(rename = "Attributes", default)]
            attributes: Attributes,
        }
        let wrapper: ManagerAttributes = self
            .get_json(&path, &format!("attributes of manager {manager_id}"))
            .await?;
        Ok(wrapper.attributes)
    }

    async fn patch_manager_attributes(
        &self,
        manager_id: &str,
        attributes: &Attributes,
    ) -> Result<(), RedfishError> {
        let path = format!(
            "/redfish/v1/Managers/{}/Attributes",
            urlencoding::encode(manager_id)
        );
        let body = serde_json::json!({ "Attributes": attributes });
        self.patch_json(&path, body, &format!("attributes of manager {manager_id}"))
            .await
    }

    async fn reset_manager(&self, manager_id: &str) -> Result<(), RedfishError> {
        let path = format!(
            "/redfish/v1/Managers/{}/Actions/Manager.Reset",
            urlencoding::encode(manager_id)
        );
        let body = serde_json::json!({ "ResetType": "GracefulRestart" });
        self.post_json(&path, body, &format!("reset manager {manager_id}"))
            .await?;
        Ok(())
    }

    async fn get_firmware_inventory(
        &self,
        component_id: &str,
    ) -> Result<SoftwareInventory, RedfishError> {
        let path = format!(
            "/redfish/v1/UpdateService/FirmwareInventory/{}",
            urlencoding::encode(component_id)
        );
        self.get_json(&path, &format!("firmware inventory {component_id}"))
            .await
    }

    async fn simple_update(&self, request: &SimpleUpdateRequest) -> Result<String, RedfishError> {
        let body = serde_json::to_value(request)?;
        let response = self
            .post_json(
                "/redfish/v1/UpdateService/Actions/UpdateService.SimpleUpdate",
                body,
                "simple update",
            )
            .await?;

        // The task monitor location comes back in the Location header
        if let Some(location) = response.headers().get("Location") {
            if let Ok(uri) = location.to_str() {
                return Ok(uri.to_string());
            }
        }
        // Fall back to a Task resource in the body
        let task: Task = response.json().await.map_err(RedfishError::Transport)?;
        Ok(format!("/redfish/v1/TaskService/Tasks/{}", task.id))
    }

    async fn get_task(&self, task_uri: &str) -> Result<Task, RedfishError> {
        self.get_json(task_uri, &format!("task {task_uri}")).await
    }

    async fn create_event_subscription(&self, destination: &str) -> Result<(), RedfishError> {
        let body = serde_json::json!({
            "Destination": destination,
            "Protocol": "Redfish",
            "DeliveryRetryPolicy": "TerminateAfterRetries",
        });
        self.post_json(
            "/redfish/v1/EventService/Subscriptions",
            body,
            "event subscription",
        )
        .await?;
        Ok(())
    }
}
