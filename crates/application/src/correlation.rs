//! Correlation matching
//!
//! Responses from collaborators arrive multiplexed on one shared subject;
//! the only key they carry is the correlation id of the outbound call. The
//! matcher scans the live ledger entries for the one waiting on that id so
//! exactly that instance's chain can be resumed.

use crate::ledger::LedgerStore;
use haizea_shared::ids::{CorrelationId, InstanceId};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    #[error("Correlation id {0} matches no live ledger entry")]
    Unmatched(CorrelationId),
}

/// Resolves an inbound response's correlation id to the owning instance.
///
/// Correlation ids are generated fresh per outbound call, so at most one
/// entry can match. An unmatched id is reported, not retried; the caller
/// logs and drops the message.
pub async fn resolve(
    store: &LedgerStore,
    correlation_id: &CorrelationId,
) -> Result<InstanceId, CorrelationError> {
    for handle in store.snapshot() {
        let entry = handle.entry.lock().await;
        if entry.awaits(correlation_id) {
            return Ok(entry.instance_id.clone());
        }
    }

    Err(CorrelationError::Unmatched(correlation_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerEntry, PendingCall, PendingKind};
    use haizea_domain::descriptor::FpgaDescriptor;
    use haizea_shared::ids::{ServiceId, VimId};

    async fn create_waiting_entry(store: &LedgerStore, pending: Option<PendingCall>) -> InstanceId {
        let instance_id = InstanceId::new();
        let handle = store
            .create(LedgerEntry::new(
                instance_id.clone(),
                FpgaDescriptor::empty_shell(),
                Some(ServiceId::new()),
                Some(VimId::new()),
                "haizea.fpga.deploy",
                CorrelationId::new(),
            ))
            .unwrap();
        handle.entry.lock().await.awaiting = pending;
        instance_id
    }

    #[tokio::test]
    async fn test_resolve_finds_the_waiting_entry() {
        let store = LedgerStore::new();
        let correlation_id = CorrelationId::new();

        create_waiting_entry(&store, None).await;
        let waiting = create_waiting_entry(
            &store,
            Some(PendingCall::single(
                correlation_id.clone(),
                PendingKind::Provisioning,
            )),
        )
        .await;

        let resolved = resolve(&store, &correlation_id).await.unwrap();
        assert_eq!(resolved, waiting);
    }

    #[tokio::test]
    async fn test_resolve_matches_within_a_list_of_outstanding_calls() {
        let store = LedgerStore::new();
        let first = CorrelationId::new();
        let second = CorrelationId::new();

        let waiting = create_waiting_entry(
            &store,
            Some(PendingCall {
                correlation_ids: vec![first, second.clone()],
                kind: PendingKind::Provisioning,
            }),
        )
        .await;

        let resolved = resolve(&store, &second).await.unwrap();
        assert_eq!(resolved, waiting);
    }

    #[tokio::test]
    async fn test_resolve_reports_unmatched_ids() {
        let store = LedgerStore::new();
        create_waiting_entry(&store, None).await;

        let unknown = CorrelationId::new();
        let err = resolve(&store, &unknown).await.unwrap_err();
        assert_eq!(err, CorrelationError::Unmatched(unknown));
    }
}
