//! ServerBootConfiguration CRD
//!
//! A render request for the PXE layer. The controller only verifies
//! referential integrity; the external renderer flips Pending to Ready once
//! the boot artifacts are materialized.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::references::{ObjectRef, SecretRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "ServerBootConfiguration",
    namespaced,
    status = "ServerBootConfigurationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerBootConfigurationSpec {
    /// Server this configuration boots
    pub server_ref: ObjectRef,

    /// Boot image
    pub image: String,

    /// Ignition payload reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<SecretRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerBootConfigurationStatus {
    /// Render state; Ready is written by the external renderer
    pub state: BootConfigurationState,

    /// Conditions (broken references)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Boot configuration render state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BootConfigurationState {
    /// Waiting for the renderer
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Artifacts are in place, safe to boot
    #[serde(alias = "ready")]
    Ready,

    /// References are broken or rendering failed
    #[serde(alias = "error")]
    Error,
}
