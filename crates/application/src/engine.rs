//! Task bodies and the error/abort handler
//!
//! Every task runs against its own ledger entry and nothing else. A
//! synchronous step does its work and returns; an asynchronous step issues
//! one correlated outbound call, records what it waits on and pauses the
//! chain. The matching response handler lives in the lifecycle manager and
//! runs on a separate execution later.

use crate::ledger::{LedgerStore, PendingCall, PendingKind};
use crate::scheduler::TaskExecutor;
use crate::tasks::Task;
use async_trait::async_trait;
use haizea_domain::bus::{BusEnvelope, BusError, MessageBus};
use haizea_domain::messages::{
    InfraDeployRequest, InfraTeardownRequest, OutcomeNotification, StepFailure, WorkflowStatus,
};
use haizea_domain::record::build_record;
use haizea_domain::repository::{RecordRepository, RepositoryError};
use haizea_shared::ids::{CorrelationId, InstanceId};
use haizea_shared::topics::{infrastructure_topics, lifecycle_topics};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs the task library against the ledger
pub struct WorkflowEngine {
    store: Arc<LedgerStore>,
    bus: Arc<dyn MessageBus>,
    repository: Arc<dyn RecordRepository>,
    plugin_name: String,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<LedgerStore>,
        bus: Arc<dyn MessageBus>,
        repository: Arc<dyn RecordRepository>,
        plugin_name: String,
    ) -> Self {
        Self {
            store,
            bus,
            repository,
            plugin_name,
        }
    }

    /// Reports a failed workflow to its originator and marks the chain for
    /// termination. Entry deletion stays with the scheduler so cleanup has
    /// one code path regardless of success or failure.
    pub async fn fail(&self, instance_id: &InstanceId, failure: StepFailure) {
        info!(
            instance_id = %instance_id,
            error = %failure,
            "error occurred, informing the originator"
        );

        let Ok(handle) = self.store.get(instance_id) else {
            warn!(instance_id = %instance_id, "failure reported for an instance with no live entry");
            return;
        };

        let (topic, correlation_id) = {
            let mut entry = handle.entry.lock().await;
            entry.error = Some(failure.clone());
            entry.status = WorkflowStatus::Failed;
            entry.kill_chain = true;
            (
                entry.origin_topic.clone(),
                entry.origin_correlation_id.clone(),
            )
        };

        let outcome = OutcomeNotification::failed(failure);
        if let Err(e) = self.publish_outcome(&topic, correlation_id, &outcome).await {
            error!(
                instance_id = %instance_id,
                error = %e,
                "could not deliver the failure notification"
            );
        }
    }

    pub(crate) async fn publish_outcome(
        &self,
        topic: &str,
        correlation_id: CorrelationId,
        outcome: &OutcomeNotification,
    ) -> Result<(), BusError> {
        let envelope =
            BusEnvelope::new(&self.plugin_name, outcome)?.with_correlation(correlation_id);
        self.bus.publish(topic, envelope).await
    }

    /// Asynchronous step: request deployment from the infrastructure
    /// backend and suspend the chain until its response arrives.
    async fn request_provisioning(&self, instance_id: &InstanceId) -> Result<(), StepFailure> {
        let handle = self
            .store
            .get(instance_id)
            .map_err(|e| StepFailure::new(e.to_string()))?;

        let (request, correlation_id) = {
            let mut entry = handle.entry.lock().await;

            let service_id = entry
                .service_id
                .clone()
                .ok_or_else(|| StepFailure::new("no owning service recorded for instance"))?;
            let vim_id = entry
                .vim_id
                .clone()
                .ok_or_else(|| StepFailure::new("no VIM target recorded for instance"))?;

            let mut descriptor = entry.descriptor.clone();
            descriptor.instance_uuid = Some(entry.instance_id.clone());

            let correlation_id = CorrelationId::generate();
            entry.awaiting = Some(PendingCall::single(
                correlation_id.clone(),
                PendingKind::Provisioning,
            ));
            entry.pause_chain = true;

            (
                InfraDeployRequest {
                    descriptor,
                    instance_id: entry.instance_id.clone(),
                    vim_id,
                    service_id,
                },
                correlation_id,
            )
        };

        info!(
            instance_id = %instance_id,
            "contacting the infrastructure backend for fpga service deployment"
        );
        let envelope = BusEnvelope::new(&self.plugin_name, &request)
            .map_err(|e| StepFailure::new(e.to_string()))?
            .with_correlation(correlation_id)
            .with_reply_to(lifecycle_topics::RESPONSES);

        self.bus
            .publish(infrastructure_topics::DEPLOY, envelope)
            .await
            .map_err(|e| StepFailure::new(e.to_string()))?;

        Ok(())
    }

    /// Synchronous step: build the instantiation record and store it in
    /// the repository. A rejected store is recorded on the entry and
    /// travels with the outcome notification; it does not kill the chain.
    async fn persist_record(&self, instance_id: &InstanceId) -> Result<(), StepFailure> {
        let handle = self
            .store
            .get(instance_id)
            .map_err(|e| StepFailure::new(e.to_string()))?;

        let record = {
            let mut entry = handle.entry.lock().await;
            let infra_record = entry
                .infra_record
                .clone()
                .ok_or_else(|| StepFailure::new("no infrastructure record to persist"))?;
            let record = build_record(&infra_record, &entry.descriptor)
                .map_err(|e| StepFailure::new(e.to_string()))?;
            entry.record = Some(record.clone());
            record
        };

        info!(
            instance_id = %instance_id,
            record_id = %record.id,
            "storing instantiation record in the repository"
        );

        match self.repository.create_record(&record).await {
            Ok(()) => {
                info!(instance_id = %instance_id, "record storage accepted");
                Ok(())
            }
            Err(RepositoryError::Status { code, message }) => {
                warn!(
                    instance_id = %instance_id,
                    http_code = code,
                    "record storage rejected: {}",
                    message
                );
                let mut entry = handle.entry.lock().await;
                entry.error = Some(StepFailure::with_http_code(message, code));
                Ok(())
            }
            Err(other) => Err(StepFailure::new(other.to_string())),
        }
    }

    /// Synchronous step: send the terminal outcome of an instantiation
    /// workflow to its originator.
    async fn notify_originator(&self, instance_id: &InstanceId) -> Result<(), StepFailure> {
        let handle = self
            .store
            .get(instance_id)
            .map_err(|e| StepFailure::new(e.to_string()))?;

        let (topic, correlation_id, outcome) = {
            let mut entry = handle.entry.lock().await;
            entry.status = WorkflowStatus::Completed;
            (
                entry.origin_topic.clone(),
                entry.origin_correlation_id.clone(),
                OutcomeNotification::completed(entry.record.clone(), entry.error.clone()),
            )
        };

        info!(
            instance_id = %instance_id,
            "informing the originator of the fpga service deployment"
        );
        self.publish_outcome(&topic, correlation_id, &outcome)
            .await
            .map_err(|e| StepFailure::new(e.to_string()))
    }

    /// Asynchronous step: request teardown from the infrastructure
    /// backend. Single-step chain; nothing runs after its response.
    async fn request_teardown(&self, instance_id: &InstanceId) -> Result<(), StepFailure> {
        let handle = self
            .store
            .get(instance_id)
            .map_err(|e| StepFailure::new(e.to_string()))?;

        let (request, correlation_id) = {
            let mut entry = handle.entry.lock().await;

            let vim_id = entry
                .vim_id
                .clone()
                .ok_or_else(|| StepFailure::new("no VIM target recorded for instance"))?;

            let correlation_id = CorrelationId::generate();
            entry.awaiting = Some(PendingCall::single(
                correlation_id.clone(),
                PendingKind::Teardown,
            ));
            entry.pause_chain = true;

            (
                InfraTeardownRequest {
                    instance_id: entry.instance_id.clone(),
                    vim_id,
                },
                correlation_id,
            )
        };

        info!(
            instance_id = %instance_id,
            "contacting the infrastructure backend for fpga service teardown"
        );
        let envelope = BusEnvelope::new(&self.plugin_name, &request)
            .map_err(|e| StepFailure::new(e.to_string()))?
            .with_correlation(correlation_id)
            .with_reply_to(lifecycle_topics::RESPONSES);

        self.bus
            .publish(infrastructure_topics::TERMINATE, envelope)
            .await
            .map_err(|e| StepFailure::new(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for WorkflowEngine {
    async fn execute(&self, task: Task, instance_id: &InstanceId) -> Result<(), StepFailure> {
        match task {
            Task::RequestProvisioning => self.request_provisioning(instance_id).await,
            Task::PersistRecord => self.persist_record(instance_id).await,
            Task::NotifyOriginator => self.notify_originator(instance_id).await,
            Task::RequestTeardown => self.request_teardown(instance_id).await,
        }
    }

    async fn abort(&self, instance_id: &InstanceId, failure: StepFailure) {
        self.fail(instance_id, failure).await;
    }
}
