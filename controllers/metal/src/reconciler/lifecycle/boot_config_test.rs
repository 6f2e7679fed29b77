//! Unit tests for the boot configuration reconciler
//!
//! Reference verification needs the Kubernetes API; these scenarios are
//! structured against the mock Redfish client and wait on kube test
//! framework integration.

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use crds::{ObjectRef, ServerBootConfiguration, ServerBootConfigurationSpec, ServerState};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn make_boot_config(name: &str, server: &str) -> ServerBootConfiguration {
        ServerBootConfiguration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: ServerBootConfigurationSpec {
                server_ref: ObjectRef::new(server),
                image: "img:1".to_string(),
                ignition_secret_ref: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_new_config_defaults_to_pending_state() {
        let config = make_boot_config("cfg-1", "s-a");
        let state = config.status.unwrap_or_default().state;
        assert_eq!(state, crds::BootConfigurationState::Pending);
    }

    #[tokio::test]
    #[ignore] // Ignored until Kubernetes API mocking is implemented
    async fn test_reconcile_flags_missing_server_ref() {
        let _server = make_server("s-a", ServerState::Available);
        let _config = make_boot_config("cfg-1", "s-missing");
        // TODO: Create reconciler with a mocked kube API returning NotFound
        // for the server, then assert status.state == Error with a
        // BrokenReference condition.
    }
}
