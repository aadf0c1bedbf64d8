//! Decision tables for keeping trusted-contact edges in sync with mutual
//! follows. Two producers write `trusted_contacts`: this linker (rows with
//! `source = follow`) and the manual request flow (`source = manual`). The
//! linker only ever deletes rows it owns, and a manual block always wins.

use porch_core::types::{TrustStatus, TrustSource};

/// What the linker does to one directed edge when mutuality appears.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeAction {
    /// No row yet; create `(accepted, follow)`.
    Insert,
    /// A pending request exists; flip its status to `accepted` in place,
    /// keeping its source.
    Upgrade,
    /// Row already accepted, or manually blocked. Hands off.
    Leave,
}

pub fn merge_on_mutual(existing: Option<(TrustStatus, TrustSource)>) -> MergeAction {
    match existing {
        None => MergeAction::Insert,
        Some((TrustStatus::Blocked, _)) => MergeAction::Leave,
        Some((TrustStatus::Accepted, _)) => MergeAction::Leave,
        Some((TrustStatus::Pending, _)) => MergeAction::Upgrade,
    }
}

/// Whether linking actually changed the pair. When both edges were left
/// as-is (already accepted, or manually blocked) the relink is a no-op and
/// must not re-notify either side.
pub fn pair_newly_linked(first: MergeAction, second: MergeAction) -> bool {
    !matches!((first, second), (MergeAction::Leave, MergeAction::Leave))
}

/// What the linker does to one directed edge when mutuality breaks.
#[derive(Debug, PartialEq)]
pub enum TeardownAction {
    Delete,
    Leave,
}

pub fn teardown_on_broken(source: TrustSource) -> TeardownAction {
    match source {
        TrustSource::Follow => TeardownAction::Delete,
        TrustSource::Manual => TeardownAction::Leave,
    }
}

/// Guard for issuing a manual trust request toward someone who may have
/// blocked the requester, or where an edge already exists.
pub fn check_trust_request(
    outgoing: Option<TrustStatus>,
    incoming_status: Option<TrustStatus>,
) -> porch_core::Result<()> {
    use porch_core::Error;

    if incoming_status == Some(TrustStatus::Blocked) {
        return Err(Error::Forbidden);
    }
    match outgoing {
        Some(TrustStatus::Accepted) => Err(Error::Conflict("already a trusted contact")),
        Some(TrustStatus::Pending) => Err(Error::Conflict("request already pending")),
        Some(TrustStatus::Blocked) => Err(Error::validation("you have blocked this user")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porch_core::Error;

    #[test]
    fn fresh_mutuality_inserts_a_follow_sourced_edge() {
        assert_eq!(merge_on_mutual(None), MergeAction::Insert);
    }

    #[test]
    fn manual_block_is_never_touched_by_the_linker() {
        assert_eq!(
            merge_on_mutual(Some((TrustStatus::Blocked, TrustSource::Manual))),
            MergeAction::Leave
        );
        assert_eq!(teardown_on_broken(TrustSource::Manual), TeardownAction::Leave);
    }

    #[test]
    fn accepted_edges_survive_relinking_regardless_of_source() {
        assert_eq!(
            merge_on_mutual(Some((TrustStatus::Accepted, TrustSource::Follow))),
            MergeAction::Leave
        );
        assert_eq!(
            merge_on_mutual(Some((TrustStatus::Accepted, TrustSource::Manual))),
            MergeAction::Leave
        );
    }

    #[test]
    fn pending_manual_request_is_upgraded_in_place() {
        assert_eq!(
            merge_on_mutual(Some((TrustStatus::Pending, TrustSource::Manual))),
            MergeAction::Upgrade
        );
    }

    #[test]
    fn relinking_an_already_linked_pair_does_not_renotify() {
        // Follow re-established over a pair that is already accepted (for
        // example via the manual flow): both edges stay, nobody is notified.
        assert!(!pair_newly_linked(MergeAction::Leave, MergeAction::Leave));

        // Any materialized or upgraded edge makes the link genuinely new.
        assert!(pair_newly_linked(MergeAction::Insert, MergeAction::Insert));
        assert!(pair_newly_linked(MergeAction::Upgrade, MergeAction::Leave));
        assert!(pair_newly_linked(MergeAction::Leave, MergeAction::Insert));
    }

    #[test]
    fn teardown_removes_only_linker_owned_edges() {
        assert_eq!(teardown_on_broken(TrustSource::Follow), TeardownAction::Delete);
        assert_eq!(teardown_on_broken(TrustSource::Manual), TeardownAction::Leave);
    }

    #[test]
    fn trust_request_blocked_by_recipient_is_forbidden() {
        assert!(matches!(
            check_trust_request(None, Some(TrustStatus::Blocked)),
            Err(Error::Forbidden)
        ));
    }

    #[test]
    fn duplicate_trust_requests_conflict() {
        assert!(matches!(
            check_trust_request(Some(TrustStatus::Pending), None),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            check_trust_request(Some(TrustStatus::Accepted), None),
            Err(Error::Conflict(_))
        ));
        assert!(check_trust_request(None, None).is_ok());
    }
}
