//! Operation annotation vocabulary
//!
//! A single annotation key carries one-shot operator requests on any MetalOps
//! resource. The value is parsed into [`OperationAnnotation`] at the boundary;
//! reconcilers match on the enum, never on raw strings.

use kube::Resource;

/// The annotation key recognized on every MetalOps resource.
pub const OPERATION_ANNOTATION: &str = "metal.microscaler.io/operation";

/// Annotation key recording a Server's pre-maintenance state for restoration.
pub const PREVIOUS_STATE_ANNOTATION: &str = "metal.microscaler.io/previous-state";

/// Annotation key granting owner approval on a ServerMaintenance or Server.
pub const MAINTENANCE_APPROVAL_ANNOTATION: &str = "metal.microscaler.io/maintenance-approved";

/// Annotation key carrying the free-text reason on a ServerMaintenance.
pub const MAINTENANCE_REASON_ANNOTATION: &str = "metal.microscaler.io/reason";

/// Recognized values of the operation annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationAnnotation {
    /// Freeze this object's reconcile
    IgnoreReconciliation,
    /// Freeze children created by a Set
    IgnoreChildReconciliation,
    /// Freeze both the Set and its children
    IgnoreChildAndSelfReconciliation,
    /// One-shot reset from Failed back to Pending
    RetryFailedStateResource,
    /// One-shot reset of Failed children of a Set
    RetryChildFailedStateResource,
    /// Bypass the no-mutation-while-InProgress update guard
    AllowInProgressUpdate,
    /// Bypass the no-mutation-while-InProgress delete guard
    AllowInProgressDelete,
    /// One-shot Redfish GracefulRestart
    GracefulRestartServerPower,
    /// One-shot Redfish ForceRestart
    HardRestartServerPower,
    /// One-shot Redfish PowerCycle
    PowerCycleServerPower,
    /// One-shot Redfish ForceOff
    ForceOffServerPower,
    /// One-shot Redfish ForceOn
    ForceOnServerPower,
    /// Reset the BMC before the next operation
    ForceResetBmc,
}

impl OperationAnnotation {
    /// Parse an annotation value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ignore-reconciliation" => Some(Self::IgnoreReconciliation),
            "ignore-child-reconciliation" => Some(Self::IgnoreChildReconciliation),
            "ignore-child-and-self-reconciliation" => Some(Self::IgnoreChildAndSelfReconciliation),
            "retry-failed-state-resource" => Some(Self::RetryFailedStateResource),
            "retry-child-failed-state-resource" => Some(Self::RetryChildFailedStateResource),
            "allow-in-progress-update" => Some(Self::AllowInProgressUpdate),
            "allow-in-progress-delete" => Some(Self::AllowInProgressDelete),
            "graceful-restart-server-power" => Some(Self::GracefulRestartServerPower),
            "hard-restart-server-power" => Some(Self::HardRestartServerPower),
            "power-cycle-server-power" => Some(Self::PowerCycleServerPower),
            "force-off-server-power" => Some(Self::ForceOffServerPower),
            "force-on-server-power" => Some(Self::ForceOnServerPower),
            "force-reset-BMC" => Some(Self::ForceResetBmc),
            _ => None,
        }
    }

    /// The wire representation of this value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnoreReconciliation => "ignore-reconciliation",
            Self::IgnoreChildReconciliation => "ignore-child-reconciliation",
            Self::IgnoreChildAndSelfReconciliation => "ignore-child-and-self-reconciliation",
            Self::RetryFailedStateResource => "retry-failed-state-resource",
            Self::RetryChildFailedStateResource => "retry-child-failed-state-resource",
            Self::AllowInProgressUpdate => "allow-in-progress-update",
            Self::AllowInProgressDelete => "allow-in-progress-delete",
            Self::GracefulRestartServerPower => "graceful-restart-server-power",
            Self::HardRestartServerPower => "hard-restart-server-power",
            Self::PowerCycleServerPower => "power-cycle-server-power",
            Self::ForceOffServerPower => "force-off-server-power",
            Self::ForceOnServerPower => "force-on-server-power",
            Self::ForceResetBmc => "force-reset-BMC",
        }
    }
}

/// Read and parse the operation annotation from any resource.
pub fn operation_of<K: Resource>(resource: &K) -> Option<OperationAnnotation> {
    resource
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(OPERATION_ANNOTATION))
        .and_then(|v| OperationAnnotation::parse(v))
}

/// True when the resource carries `ignore-reconciliation`.
pub fn is_reconciliation_ignored<K: Resource>(resource: &K) -> bool {
    matches!(
        operation_of(resource),
        Some(OperationAnnotation::IgnoreReconciliation)
            | Some(OperationAnnotation::IgnoreChildAndSelfReconciliation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_all_values() {
        let all = [
            OperationAnnotation::IgnoreReconciliation,
            OperationAnnotation::IgnoreChildReconciliation,
            OperationAnnotation::IgnoreChildAndSelfReconciliation,
            OperationAnnotation::RetryFailedStateResource,
            OperationAnnotation::RetryChildFailedStateResource,
            OperationAnnotation::AllowInProgressUpdate,
            OperationAnnotation::AllowInProgressDelete,
            OperationAnnotation::GracefulRestartServerPower,
            OperationAnnotation::HardRestartServerPower,
            OperationAnnotation::PowerCycleServerPower,
            OperationAnnotation::ForceOffServerPower,
            OperationAnnotation::ForceOnServerPower,
            OperationAnnotation::ForceResetBmc,
        ];
        for op in all {
            assert_eq!(OperationAnnotation::parse(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_parse_rejects_unknown_value() {
        assert_eq!(OperationAnnotation::parse("frobnicate"), None);
    }
}
