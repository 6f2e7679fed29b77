//! Unit tests for maintenance arbitration

#[cfg(test)]
mod tests {
    use crate::reconciler::lifecycle::maintenance::{approval_granted, pick_next};
    use crate::test_utils::*;
    use crds::{MaintenancePolicy, MaintenanceState, ServerState, MAINTENANCE_APPROVAL_ANNOTATION};

    #[test]
    fn test_pick_next_prefers_oldest_ticket() {
        let older = make_maintenance("m-late-name", "s-a", MaintenancePolicy::Enforced, MaintenanceState::Pending, 0);
        let newer = make_maintenance("m-a", "s-a", MaintenancePolicy::Enforced, MaintenanceState::Pending, 60);
        let pending = vec![&newer, &older];
        let next = pick_next(&pending).unwrap();
        assert_eq!(next.metadata.name.as_deref(), Some("m-late-name"));
    }

    #[test]
    fn test_pick_next_ties_break_on_name() {
        let b = make_maintenance("m-b", "s-a", MaintenancePolicy::Enforced, MaintenanceState::Pending, 0);
        let a = make_maintenance("m-a", "s-a", MaintenancePolicy::Enforced, MaintenanceState::Pending, 0);
        let pending = vec![&b, &a];
        let next = pick_next(&pending).unwrap();
        assert_eq!(next.metadata.name.as_deref(), Some("m-a"));
    }

    #[test]
    fn test_pick_next_empty_queue() {
        assert!(pick_next(&[]).is_none());
    }

    #[test]
    fn test_enforced_policy_admits_immediately() {
        let server = make_server("s-a", ServerState::Reserved);
        let m = make_maintenance("m-1", "s-a", MaintenancePolicy::Enforced, MaintenanceState::Pending, 0);
        assert!(approval_granted(&server, &m));
    }

    #[test]
    fn test_owner_approval_admits_on_available_server() {
        let server = make_server("s-a", ServerState::Available);
        let m = make_maintenance("m-1", "s-a", MaintenancePolicy::OwnerApproval, MaintenanceState::Pending, 0);
        assert!(approval_granted(&server, &m));
    }

    #[test]
    fn test_owner_approval_holds_on_reserved_server() {
        let server = make_server("s-a", ServerState::Reserved);
        let m = make_maintenance("m-1", "s-a", MaintenancePolicy::OwnerApproval, MaintenanceState::Pending, 0);
        assert!(!approval_granted(&server, &m));
    }

    #[test]
    fn test_owner_approval_honors_annotation_on_ticket() {
        let server = make_server("s-a", ServerState::Reserved);
        let mut m = make_maintenance("m-1", "s-a", MaintenancePolicy::OwnerApproval, MaintenanceState::Pending, 0);
        m.metadata.annotations = Some(
            [(MAINTENANCE_APPROVAL_ANNOTATION.to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(approval_granted(&server, &m));
    }

    #[test]
    fn test_owner_approval_honors_annotation_on_server() {
        let mut server = make_server("s-a", ServerState::Reserved);
        server.metadata.annotations = Some(
            [(MAINTENANCE_APPROVAL_ANNOTATION.to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        );
        let m = make_maintenance("m-1", "s-a", MaintenancePolicy::OwnerApproval, MaintenanceState::Pending, 0);
        assert!(approval_granted(&server, &m));
    }

    #[test]
    fn test_owner_approval_rejects_non_true_annotation() {
        let server = make_server("s-a", ServerState::Reserved);
        let mut m = make_maintenance("m-1", "s-a", MaintenancePolicy::OwnerApproval, MaintenanceState::Pending, 0);
        m.metadata.annotations = Some(
            [(MAINTENANCE_APPROVAL_ANNOTATION.to_string(), "false".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(!approval_granted(&server, &m));
    }
}
