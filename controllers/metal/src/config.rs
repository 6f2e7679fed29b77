//! Controller configuration
//!
//! Loaded from environment variables in `main`, one variable per process
//! flag, with the documented defaults. Durations are given in seconds.

use std::env;
use std::time::Duration;

use crate::error::ControllerError;

/// Runtime configuration of the unified controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Image of the probe used during discovery (PROBE_IMAGE)
    pub probe_image: String,

    /// OS image booted for discovery probing (PROBE_OS_IMAGE)
    pub probe_os_image: String,

    /// URL the probe posts inventory to (REGISTRY_URL)
    pub registry_url: String,

    /// Listen port of the registry HTTP surface (REGISTRY_PORT)
    pub registry_port: u16,

    /// Scheme the probe uses to reach the registry (REGISTRY_PROTOCOL)
    pub registry_protocol: String,

    /// Purge cadence of the registry store (REGISTRY_RESYNC_INTERVAL_SECS)
    pub registry_resync_interval: Duration,

    /// MAC prefix database path (MAC_PREFIXES_FILE)
    pub mac_prefixes_file: String,

    /// Accept self-signed BMC certificates (INSECURE)
    pub insecure: bool,

    /// Namespace the controller manages (MANAGER_NAMESPACE)
    pub manager_namespace: Option<String>,

    /// How long discovery may wait for inventory (DISCOVERY_TIMEOUT_SECS)
    pub discovery_timeout: Duration,

    /// Re-probe servers found powered on in Initial (ENFORCE_FIRST_BOOT)
    pub enforce_first_boot: bool,

    /// Escalate to ForceOff after the graceful window (ENFORCE_POWER_OFF)
    pub enforce_power_off: bool,

    /// Power poll cadence (POWER_POLLING_INTERVAL_SECS)
    pub power_polling_interval: Duration,

    /// Power poll budget before escalation (POWER_POLLING_TIMEOUT_SECS)
    pub power_polling_timeout: Duration,

    /// Task poll cadence (RESOURCE_POLLING_INTERVAL_SECS)
    pub resource_polling_interval: Duration,

    /// Task poll budget (RESOURCE_POLLING_TIMEOUT_SECS)
    pub resource_polling_timeout: Duration,

    /// Server reconcile pool size (SERVER_MAX_CONCURRENT_RECONCILES)
    pub server_max_concurrent_reconciles: u16,

    /// Server periodic resync (SERVER_RESYNC_INTERVAL_SECS)
    pub server_resync_interval: Duration,

    /// BMC periodic resync (BMC_RESYNC_INTERVAL_SECS)
    pub bmc_resync_interval: Duration,

    /// Admission webhook port (WEBHOOK_PORT)
    pub webhook_port: u16,

    /// Bind address of the metrics/registry server (METRICS_BIND_ADDRESS)
    pub metrics_bind_address: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_secs(name: &str, default_secs: u64) -> Result<Duration, ControllerError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ControllerError::InvalidConfig(format!("{name} must be seconds: {raw}"))),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ControllerError> {
    match env::var(name) {
        Ok(raw) => match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ControllerError::InvalidConfig(format!(
                "{name} must be true or false: {raw}"
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, ControllerError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| ControllerError::InvalidConfig(format!("{name} must be a port: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load the configuration from the environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        let registry_port = env_u16("REGISTRY_PORT", 30000)?;
        let registry_protocol = env_or("REGISTRY_PROTOCOL", "http");
        let registry_url = env::var("REGISTRY_URL").unwrap_or_else(|_| {
            format!("{registry_protocol}://metalops-registry:{registry_port}")
        });

        Ok(Self {
            probe_image: env_or("PROBE_IMAGE", "ghcr.io/microscaler/metalprobe:latest"),
            probe_os_image: env_or("PROBE_OS_IMAGE", "ghcr.io/microscaler/metalprobe-os:latest"),
            registry_url,
            registry_port,
            registry_protocol,
            registry_resync_interval: env_secs("REGISTRY_RESYNC_INTERVAL_SECS", 600)?,
            mac_prefixes_file: env_or("MAC_PREFIXES_FILE", "/etc/metalops/macdb.yaml"),
            insecure: env_bool("INSECURE", true)?,
            manager_namespace: env::var("MANAGER_NAMESPACE").ok(),
            discovery_timeout: env_secs("DISCOVERY_TIMEOUT_SECS", 30 * 60)?,
            enforce_first_boot: env_bool("ENFORCE_FIRST_BOOT", false)?,
            enforce_power_off: env_bool("ENFORCE_POWER_OFF", false)?,
            power_polling_interval: env_secs("POWER_POLLING_INTERVAL_SECS", 5)?,
            power_polling_timeout: env_secs("POWER_POLLING_TIMEOUT_SECS", 70)?,
            resource_polling_interval: env_secs("RESOURCE_POLLING_INTERVAL_SECS", 5)?,
            resource_polling_timeout: env_secs("RESOURCE_POLLING_TIMEOUT_SECS", 600)?,
            server_max_concurrent_reconciles: env_u16("SERVER_MAX_CONCURRENT_RECONCILES", 5)?,
            server_resync_interval: env_secs("SERVER_RESYNC_INTERVAL_SECS", 120)?,
            bmc_resync_interval: env_secs("BMC_RESYNC_INTERVAL_SECS", 120)?,
            webhook_port: env_u16("WEBHOOK_PORT", 9443)?,
            metrics_bind_address: env_or("METRICS_BIND_ADDRESS", "0.0.0.0:8080"),
        })
    }

    /// Defaults without touching the environment (for tests).
    pub fn for_tests() -> Self {
        Self {
            probe_image: "probe:test".to_string(),
            probe_os_image: "probe-os:test".to_string(),
            registry_url: "http://localhost:30000".to_string(),
            registry_port: 30000,
            registry_protocol: "http".to_string(),
            registry_resync_interval: Duration::from_secs(600),
            mac_prefixes_file: "/dev/null".to_string(),
            insecure: true,
            manager_namespace: Some("default".to_string()),
            discovery_timeout: Duration::from_secs(1800),
            enforce_first_boot: false,
            enforce_power_off: true,
            power_polling_interval: Duration::from_secs(5),
            power_polling_timeout: Duration::from_secs(70),
            resource_polling_interval: Duration::from_secs(5),
            resource_polling_timeout: Duration::from_secs(600),
            server_max_concurrent_reconciles: 5,
            server_resync_interval: Duration::from_secs(120),
            bmc_resync_interval: Duration::from_secs(120),
            webhook_port: 9443,
            metrics_bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}
