//! The ledger: per-instance orchestration state
//!
//! The store is the only shared mutable resource of the engine. Every entry
//! sits behind its own mutex; the map itself only enforces existence and
//! uniqueness. A second, separate mutex per instance serializes chain
//! driving so a resumed task's read-modify-write of the flags cannot race
//! with the scheduler's own inspection of them.

use crate::tasks::Task;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use haizea_domain::descriptor::FpgaDescriptor;
use haizea_domain::messages::{StepFailure, WorkflowStatus};
use haizea_domain::record::{FpgaRecord, InfraRecord};
use haizea_shared::ids::{CorrelationId, InstanceId, ServiceId, VimId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("An entry already exists for instance {0}")]
    DuplicateInstance(InstanceId),

    #[error("No entry exists for instance {0}")]
    UnknownInstance(InstanceId),
}

/// Which collaborator a suspended chain is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Provisioning,
    Teardown,
}

/// The outstanding correlated call(s) of a suspended chain
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub correlation_ids: Vec<CorrelationId>,
    pub kind: PendingKind,
}

impl PendingCall {
    pub fn single(correlation_id: CorrelationId, kind: PendingKind) -> Self {
        Self {
            correlation_ids: vec![correlation_id],
            kind,
        }
    }
}

/// Orchestration record of one service instance
#[derive(Debug)]
pub struct LedgerEntry {
    pub instance_id: InstanceId,
    /// Deployment blueprint; immutable after creation (an empty shell
    /// during termination re-creation)
    pub descriptor: FpgaDescriptor,
    pub service_id: Option<ServiceId>,
    pub vim_id: Option<VimId>,
    /// Where the terminal outcome notification goes
    pub origin_topic: String,
    /// Correlation id echoed back to the originator
    pub origin_correlation_id: CorrelationId,
    /// Set before the chain pauses, cleared by whoever resumes it
    pub awaiting: Option<PendingCall>,
    pub schedule: VecDeque<Task>,
    pub pause_chain: bool,
    pub kill_chain: bool,
    pub error: Option<StepFailure>,
    /// Raw backend output held between the provisioning and persist steps
    pub infra_record: Option<InfraRecord>,
    /// The built instantiation record
    pub record: Option<FpgaRecord>,
    pub status: WorkflowStatus,
}

impl LedgerEntry {
    pub fn new(
        instance_id: InstanceId,
        descriptor: FpgaDescriptor,
        service_id: Option<ServiceId>,
        vim_id: Option<VimId>,
        origin_topic: &str,
        origin_correlation_id: CorrelationId,
    ) -> Self {
        Self {
            instance_id,
            descriptor,
            service_id,
            vim_id,
            origin_topic: origin_topic.to_string(),
            origin_correlation_id,
            awaiting: None,
            schedule: VecDeque::new(),
            pause_chain: false,
            kill_chain: false,
            error: None,
            infra_record: None,
            record: None,
            status: WorkflowStatus::InProgress,
        }
    }

    /// True if this entry is waiting on the given correlation id
    pub fn awaits(&self, correlation_id: &CorrelationId) -> bool {
        self.awaiting
            .as_ref()
            .is_some_and(|pending| pending.correlation_ids.contains(correlation_id))
    }
}

/// One live instance: entry data plus the chain-driver guard
#[derive(Debug)]
pub struct InstanceHandle {
    pub entry: Mutex<LedgerEntry>,
    /// Held for the whole of one scheduler pass; guarantees a single chain
    /// driver per instance
    pub(crate) chain: Mutex<()>,
}

impl InstanceHandle {
    fn new(entry: LedgerEntry) -> Self {
        Self {
            entry: Mutex::new(entry),
            chain: Mutex::new(()),
        }
    }
}

/// In-memory map from instance id to its orchestration record
#[derive(Debug, Default)]
pub struct LedgerStore {
    entries: DashMap<InstanceId, Arc<InstanceHandle>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Adds a new entry; fails if one already exists for the instance
    pub fn create(&self, entry: LedgerEntry) -> Result<Arc<InstanceHandle>, LedgerError> {
        let instance_id = entry.instance_id.clone();
        match self.entries.entry(instance_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateInstance(instance_id)),
            Entry::Vacant(slot) => {
                let handle = Arc::new(InstanceHandle::new(entry));
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Looks up a live entry
    pub fn get(&self, instance_id: &InstanceId) -> Result<Arc<InstanceHandle>, LedgerError> {
        self.entries
            .get(instance_id)
            .map(|handle| handle.clone())
            .ok_or_else(|| LedgerError::UnknownInstance(instance_id.clone()))
    }

    /// Removes an entry; returns whether one existed
    pub fn delete(&self, instance_id: &InstanceId) -> bool {
        self.entries.remove(instance_id).is_some()
    }

    pub fn contains(&self, instance_id: &InstanceId) -> bool {
        self.entries.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the live handles, for scans that must not hold the map
    /// locked across awaits
    pub fn snapshot(&self) -> Vec<Arc<InstanceHandle>> {
        self.entries
            .iter()
            .map(|kv| kv.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(instance_id: InstanceId) -> LedgerEntry {
        LedgerEntry::new(
            instance_id,
            FpgaDescriptor::empty_shell(),
            Some(ServiceId::new()),
            Some(VimId::new()),
            "haizea.fpga.deploy",
            CorrelationId::new(),
        )
    }

    #[test]
    fn test_create_rejects_duplicate_instance() {
        let store = LedgerStore::new();
        let instance_id = InstanceId::new();

        store.create(entry(instance_id.clone())).unwrap();
        let err = store.create(entry(instance_id.clone())).unwrap_err();
        assert_eq!(err, LedgerError::DuplicateInstance(instance_id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown_instance() {
        let store = LedgerStore::new();
        let instance_id = InstanceId::new();
        let err = store.get(&instance_id).unwrap_err();
        assert_eq!(err, LedgerError::UnknownInstance(instance_id));
    }

    #[test]
    fn test_delete_removes_entry() {
        let store = LedgerStore::new();
        let instance_id = InstanceId::new();

        store.create(entry(instance_id.clone())).unwrap();
        assert!(store.delete(&instance_id));
        assert!(!store.contains(&instance_id));
        assert!(!store.delete(&instance_id));
    }

    #[tokio::test]
    async fn test_new_entry_starts_in_progress_with_clear_flags() {
        let store = LedgerStore::new();
        let instance_id = InstanceId::new();
        let handle = store.create(entry(instance_id)).unwrap();

        let entry = handle.entry.lock().await;
        assert_eq!(entry.status, WorkflowStatus::InProgress);
        assert!(!entry.pause_chain);
        assert!(!entry.kill_chain);
        assert!(entry.awaiting.is_none());
        assert!(entry.schedule.is_empty());
    }

    #[tokio::test]
    async fn test_awaits_checks_all_outstanding_ids() {
        let store = LedgerStore::new();
        let handle = store.create(entry(InstanceId::new())).unwrap();

        let first = CorrelationId::new();
        let second = CorrelationId::new();
        {
            let mut entry = handle.entry.lock().await;
            entry.awaiting = Some(PendingCall {
                correlation_ids: vec![first.clone(), second.clone()],
                kind: PendingKind::Provisioning,
            });
        }

        let entry = handle.entry.lock().await;
        assert!(entry.awaits(&first));
        assert!(entry.awaits(&second));
        assert!(!entry.awaits(&CorrelationId::new()));
    }
}
