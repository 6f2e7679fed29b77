//! Unit tests for Set aggregation and annotation propagation

#[cfg(test)]
mod tests {
    use crate::reconciler::sets::{aggregate, child_operation, set_is_frozen, ChildPhase};
    use crds::OperationAnnotation;

    #[test]
    fn test_aggregate_buckets_children_by_phase() {
        let phases = vec![
            ChildPhase::Pending,
            ChildPhase::Pending,
            ChildPhase::InProgress,
            ChildPhase::Completed,
            ChildPhase::Failed,
        ];
        let status = aggregate(5, &phases);
        assert_eq!(status.selected, 5);
        assert_eq!(status.total, 5);
        assert_eq!(status.pending, 2);
        assert_eq!(status.in_progress, 1);
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 1);
    }

    #[test]
    fn test_aggregate_counts_targets_without_children() {
        // Three targets matched, children not yet created
        let status = aggregate(3, &[]);
        assert_eq!(status.selected, 3);
        assert_eq!(status.total, 0);
        assert_eq!(status.pending, 0);
    }

    #[test]
    fn test_aggregate_all_completed() {
        let phases = vec![ChildPhase::Completed; 3];
        let status = aggregate(3, &phases);
        assert_eq!(status.completed, 3);
        assert_eq!(status.failed, 0);
    }

    #[test]
    fn test_child_operation_translates_freeze_values() {
        assert_eq!(
            child_operation(Some(OperationAnnotation::IgnoreChildReconciliation)),
            Some(OperationAnnotation::IgnoreReconciliation)
        );
        assert_eq!(
            child_operation(Some(OperationAnnotation::IgnoreChildAndSelfReconciliation)),
            Some(OperationAnnotation::IgnoreReconciliation)
        );
        assert_eq!(
            child_operation(Some(OperationAnnotation::RetryChildFailedStateResource)),
            Some(OperationAnnotation::RetryFailedStateResource)
        );
        assert_eq!(child_operation(Some(OperationAnnotation::IgnoreReconciliation)), None);
        assert_eq!(child_operation(None), None);
    }

    #[test]
    fn test_set_freeze_semantics() {
        assert!(set_is_frozen(Some(OperationAnnotation::IgnoreReconciliation)));
        assert!(set_is_frozen(Some(OperationAnnotation::IgnoreChildAndSelfReconciliation)));
        // Freezing only the children keeps the Set itself reconciling
        assert!(!set_is_frozen(Some(OperationAnnotation::IgnoreChildReconciliation)));
        assert!(!set_is_frozen(None));
    }
}
