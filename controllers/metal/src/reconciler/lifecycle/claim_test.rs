//! Unit tests for the ServerClaim selection algorithm

#[cfg(test)]
mod tests {
    use crate::reconciler::lifecycle::claim::select_server;
    use crate::test_utils::*;
    use crds::{ObjectRef, ServerState};

    #[test]
    fn test_selector_picks_lexicographically_smallest() {
        let servers = vec![
            make_labeled_server("s-b", ServerState::Available, &[("role", "worker")]),
            make_labeled_server("s-a", ServerState::Available, &[("role", "worker")]),
        ];
        let claim = make_selector_claim("claim-1", &[("role", "worker")], "img:1");
        let selected = select_server(&claim, &servers).unwrap();
        assert_eq!(selected.metadata.name.as_deref(), Some("s-a"));
    }

    #[test]
    fn test_selector_ignores_label_mismatches() {
        let servers = vec![
            make_labeled_server("s-a", ServerState::Available, &[("role", "storage")]),
            make_labeled_server("s-b", ServerState::Available, &[("role", "worker")]),
        ];
        let claim = make_selector_claim("claim-1", &[("role", "worker")], "img:1");
        let selected = select_server(&claim, &servers).unwrap();
        assert_eq!(selected.metadata.name.as_deref(), Some("s-b"));
    }

    #[test]
    fn test_selector_skips_non_available_servers() {
        let servers = vec![
            make_labeled_server("s-a", ServerState::Reserved, &[("role", "worker")]),
            make_labeled_server("s-b", ServerState::Discovery, &[("role", "worker")]),
        ];
        let claim = make_selector_claim("claim-1", &[("role", "worker")], "img:1");
        assert!(select_server(&claim, &servers).is_none());
    }

    #[test]
    fn test_selector_skips_already_claimed_servers() {
        let mut claimed = make_labeled_server("s-a", ServerState::Available, &[("role", "worker")]);
        claimed.spec.claim_ref = Some(ObjectRef::new("other-claim"));
        let servers = vec![
            claimed,
            make_labeled_server("s-b", ServerState::Available, &[("role", "worker")]),
        ];
        let claim = make_selector_claim("claim-1", &[("role", "worker")], "img:1");
        let selected = select_server(&claim, &servers).unwrap();
        assert_eq!(selected.metadata.name.as_deref(), Some("s-b"));
    }

    #[test]
    fn test_explicit_ref_must_be_available_and_unclaimed() {
        let servers = vec![make_server("s-a", ServerState::Available)];
        let claim = make_ref_claim("claim-1", "s-a", "img:1");
        assert!(select_server(&claim, &servers).is_some());

        let servers = vec![make_server("s-a", ServerState::Reserved)];
        assert!(select_server(&claim, &servers).is_none());

        let mut claimed = make_server("s-a", ServerState::Available);
        claimed.spec.claim_ref = Some(ObjectRef::new("other"));
        let servers = vec![claimed];
        assert!(select_server(&claim, &servers).is_none());
    }

    #[test]
    fn test_explicit_ref_ignores_other_servers() {
        let servers = vec![
            make_server("s-a", ServerState::Available),
            make_server("s-b", ServerState::Available),
        ];
        let claim = make_ref_claim("claim-1", "s-b", "img:1");
        let selected = select_server(&claim, &servers).unwrap();
        assert_eq!(selected.metadata.name.as_deref(), Some("s-b"));
    }

    #[test]
    fn test_claim_without_ref_or_selector_selects_nothing() {
        let mut claim = make_ref_claim("claim-1", "s-a", "img:1");
        claim.spec.server_ref = None;
        let servers = vec![make_server("s-a", ServerState::Available)];
        assert!(select_server(&claim, &servers).is_none());
    }
}
