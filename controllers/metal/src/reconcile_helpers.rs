//! Helper functions for common reconciliation patterns
//!
//! This module provides reusable functions to eliminate code duplication
//! across all reconcilers: status patches, owner references, finalizers,
//! label selection, and secret decoding.

use base64::Engine;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::ControllerError;

/// Build a merge patch replacing the status subresource.
pub fn status_patch<T: Serialize>(status: &T) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

/// Name of a resource, or an error when metadata is incomplete.
pub fn name_of<K: Resource>(resource: &K, kind: &str) -> Result<String, ControllerError> {
    resource
        .meta()
        .name
        .clone()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{kind} missing name")))
}

/// Namespace of a resource, falling back to "default".
pub fn namespace_of<K: Resource>(resource: &K) -> String {
    resource
        .meta()
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string())
}

/// Build a controller owner reference from another object's metadata.
pub fn owner_reference<K: Resource<DynamicType = ()>>(
    meta: &ObjectMeta,
) -> Result<OwnerReference, ControllerError> {
    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: meta
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig(".metadata.name missing".to_string()))?,
        uid: meta
            .uid
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig(".metadata.uid missing".to_string()))?,
        controller: Some(true),
        ..OwnerReference::default()
    })
}

/// Whether an object's owner references contain the given owner UID.
pub fn owned_by<K: Resource>(resource: &K, owner_uid: &str) -> bool {
    resource
        .meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner_uid))
}

/// Whether the labels satisfy an equality-based selector.
pub fn labels_match(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    let Some(labels) = labels else {
        return selector.is_empty();
    };
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Ensure a finalizer is present, patching the object if needed.
pub async fn ensure_finalizer<K>(
    api: &Api<K>,
    resource: &K,
    finalizer: &str,
) -> Result<bool, ControllerError>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    let name = name_of(resource, "resource")?;
    let has = resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer));
    if has {
        return Ok(false);
    }
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}

/// Remove a finalizer, patching the object if it was present.
pub async fn remove_finalizer<K>(
    api: &Api<K>,
    resource: &K,
    finalizer: &str,
) -> Result<bool, ControllerError>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    let name = name_of(resource, "resource")?;
    let Some(current) = resource.meta().finalizers.clone() else {
        return Ok(false);
    };
    if !current.iter().any(|f| f == finalizer) {
        return Ok(false);
    }
    let finalizers: Vec<String> = current.into_iter().filter(|f| f != finalizer).collect();
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}

/// Merge patch removing the operation annotation (consumes a one-shot value).
pub fn clear_operation_annotation_patch() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                crds::OPERATION_ANNOTATION: serde_json::Value::Null,
            }
        }
    })
}

/// Merge patch setting one annotation.
pub fn set_annotation_patch(key: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                key: value,
            }
        }
    })
}

/// Merge patch removing one annotation.
pub fn clear_annotation_patch(key: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                key: serde_json::Value::Null,
            }
        }
    })
}

/// Decode a base64 entry from a BMCSecret data map.
pub fn decode_secret_value(
    data: &BTreeMap<String, String>,
    key: &str,
) -> Result<String, ControllerError> {
    let encoded = data
        .get(key)
        .ok_or_else(|| ControllerError::SecretInvalid(format!("missing key {key}")))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ControllerError::SecretInvalid(format!("key {key}: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| ControllerError::SecretInvalid(format!("key {key} not UTF-8: {e}")))
}

/// Encode a credential value for a BMCSecret data map.
pub fn encode_secret_value(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}
