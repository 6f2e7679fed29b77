//! Status conditions shared by all MetalOps CRDs
//!
//! Terminal errors and notable events are surfaced as conditions; state fields
//! plus conditions are the entire user-visible failure contract.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status values, mirroring metav1.ConditionStatus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition state cannot be determined
    Unknown,
}

/// A single observed condition on a resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "AuthFailed", "DiscoveryTimedOut")
    pub r#type: String,

    /// Whether the condition currently holds
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the condition last changed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Generation observed when the condition was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Build a condition with status True and the current timestamp.
    pub fn new(
        r#type: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status: ConditionStatus::True,
            reason: Some(reason.into()),
            message: Some(message.into()),
            last_transition_time: Some(chrono::Utc::now()),
            observed_generation: None,
        }
    }

    /// Attach the generation the writer observed.
    #[must_use]
    pub fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Insert or update a condition by type.
///
/// `lastTransitionTime` is preserved when the status does not change, so
/// repeated reconciles do not churn the status subresource.
pub fn upsert_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
            {
                return;
            }
            let keep_time = existing.status == condition.status;
            let previous_time = existing.last_transition_time;
            *existing = condition;
            if keep_time {
                existing.last_transition_time = previous_time;
            }
        }
        None => conditions.push(condition),
    }
}

/// Remove a condition by type, returning whether it was present.
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != r#type);
    conditions.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_inserts_new_condition() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Unauthorized", "401"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].r#type, "AuthFailed");
    }

    #[test]
    fn test_upsert_is_idempotent_for_same_content() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Unauthorized", "401"));
        let first_time = conditions[0].last_transition_time;
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Unauthorized", "401"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_time);
    }

    #[test]
    fn test_upsert_replaces_changed_condition() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Unauthorized", "401"));
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Forbidden", "403"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason.as_deref(), Some("Forbidden"));
    }

    #[test]
    fn test_remove_condition() {
        let mut conditions = Vec::new();
        upsert_condition(&mut conditions, Condition::new("AuthFailed", "Unauthorized", "401"));
        assert!(remove_condition(&mut conditions, "AuthFailed"));
        assert!(conditions.is_empty());
        assert!(!remove_condition(&mut conditions, "AuthFailed"));
    }
}
