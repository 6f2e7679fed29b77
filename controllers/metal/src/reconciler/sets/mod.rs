//! Set fan-out reconcilers
//!
//! A Set stamps its template across every selector-matched target and rolls
//! per-phase counters up into its status. Children carry the real state
//! machines; the Set only templates, propagates freeze/retry annotations,
//! and counts.

pub mod bios_settings_set;
pub mod bios_version_set;
pub mod bmc_settings_set;
pub mod bmc_version_set;
pub mod maintenance_set;
#[cfg(test)]
pub mod sets_test;

use crds::{OperationAnnotation, SetStatus};

/// Phase bucket a child lands in for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildPhase {
    /// Child exists, no work started
    Pending,
    /// Child mid-update
    InProgress,
    /// Child reached its success sink
    Completed,
    /// Child reached its failure sink
    Failed,
}

/// Roll child phases up into the Set status counters.
pub(crate) fn aggregate(selected: usize, phases: &[ChildPhase]) -> SetStatus {
    let mut status = SetStatus {
        selected: selected as u32,
        total: phases.len() as u32,
        ..Default::default()
    };
    for phase in phases {
        match phase {
            ChildPhase::Pending => status.pending += 1,
            ChildPhase::InProgress => status.in_progress += 1,
            ChildPhase::Completed => status.completed += 1,
            ChildPhase::Failed => status.failed += 1,
        }
    }
    status
}

/// The operation annotation value to stamp onto children, if any.
///
/// `ignore-child*` freezes children; `retry-child*` resets Failed children
/// (the caller clears the one-shot value from the Set afterwards).
pub(crate) fn child_operation(set_op: Option<OperationAnnotation>) -> Option<OperationAnnotation> {
    match set_op {
        Some(OperationAnnotation::IgnoreChildReconciliation)
        | Some(OperationAnnotation::IgnoreChildAndSelfReconciliation) => {
            Some(OperationAnnotation::IgnoreReconciliation)
        }
        Some(OperationAnnotation::RetryChildFailedStateResource) => {
            Some(OperationAnnotation::RetryFailedStateResource)
        }
        _ => None,
    }
}

/// Whether the Set itself is frozen by its operation annotation.
pub(crate) fn set_is_frozen(set_op: Option<OperationAnnotation>) -> bool {
    matches!(
        set_op,
        Some(OperationAnnotation::IgnoreReconciliation)
            | Some(OperationAnnotation::IgnoreChildAndSelfReconciliation)
    )
}
