//! The lifecycle manager
//!
//! Wires the bus subjects to the orchestration engine: an inbound
//! instantiate or terminate message opens a ledger entry and starts its
//! chain; inbound responses on the shared response subject are matched by
//! correlation id and resume exactly the chain that issued the call.

use crate::correlation::{CorrelationError, resolve};
use crate::engine::WorkflowEngine;
use crate::ledger::{LedgerEntry, LedgerStore, PendingKind};
use crate::scheduler::ChainScheduler;
use crate::tasks::Task;
use futures::StreamExt;
use futures::stream::BoxStream;
use haizea_domain::bus::{BusEnvelope, BusError, MessageBus};
use haizea_domain::descriptor::FpgaDescriptor;
use haizea_domain::messages::{
    DeployRequest, InfraResponse, OutcomeNotification, PluginAnnouncement, RequestStatus,
    StepFailure, TerminateRequest, WorkflowStatus,
};
use haizea_domain::repository::{RecordRepository, RepositoryError};
use haizea_shared::config::PluginConfig;
use haizea_shared::ids::{CorrelationId, InstanceId, VimId};
use haizea_shared::topics::{lifecycle_topics, management_topics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// The FPGA-service lifecycle manager plugin
#[derive(Clone)]
pub struct LifecycleManager {
    engine: Arc<WorkflowEngine>,
    scheduler: ChainScheduler<WorkflowEngine>,
    store: Arc<LedgerStore>,
    bus: Arc<dyn MessageBus>,
    repository: Arc<dyn RecordRepository>,
    plugin_name: String,
}

impl LifecycleManager {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        repository: Arc<dyn RecordRepository>,
        config: &PluginConfig,
    ) -> Self {
        let store = Arc::new(LedgerStore::new());
        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            bus.clone(),
            repository.clone(),
            config.plugin_name.clone(),
        ));
        let scheduler = ChainScheduler::new(
            store.clone(),
            engine.clone(),
            config.worker_pool_size,
            Duration::from_secs(config.step_timeout_secs),
        );

        Self {
            engine,
            scheduler,
            store,
            bus,
            repository,
            plugin_name: config.plugin_name.clone(),
        }
    }

    /// The ledger store; exposed for inspection
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Subscribes to the plugin's subjects and spawns one consumer loop
    /// per subscription.
    pub async fn run(&self) -> Result<(), BusError> {
        let deploys = self.bus.subscribe(lifecycle_topics::DEPLOY).await?;
        let terminations = self.bus.subscribe(lifecycle_topics::TERMINATE).await?;
        let responses = self.bus.subscribe(lifecycle_topics::RESPONSES).await?;

        self.spawn_deploy_loop(deploys);
        self.spawn_terminate_loop(terminations);
        self.spawn_response_loop(responses);

        info!("lifecycle manager started and operational");
        Ok(())
    }

    /// Announces this plugin to the plugin manager.
    pub async fn announce(&self) -> Result<(), BusError> {
        let announcement = PluginAnnouncement {
            name: self.plugin_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "FPGA service lifecycle manager".to_string(),
        };
        let envelope = BusEnvelope::new(&self.plugin_name, &announcement)?;
        self.bus
            .publish(management_topics::REGISTER, envelope)
            .await
    }

    /// Deregisters this plugin from the plugin manager.
    pub async fn deregister(&self) -> Result<(), BusError> {
        info!(plugin = %self.plugin_name, "deregistering lifecycle manager");
        let envelope = BusEnvelope::new(
            &self.plugin_name,
            &serde_json::json!({ "name": self.plugin_name }),
        )?;
        self.bus
            .publish(management_topics::DEREGISTER, envelope)
            .await
    }

    fn spawn_deploy_loop(&self, mut stream: BoxStream<'static, Result<BusEnvelope, BusError>>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(envelope) => manager.handle_deploy(envelope).await,
                    Err(e) => warn!(error = %e, "error on the deploy subscription"),
                }
            }
        });
    }

    fn spawn_terminate_loop(&self, mut stream: BoxStream<'static, Result<BusEnvelope, BusError>>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(envelope) => manager.handle_terminate(envelope).await,
                    Err(e) => warn!(error = %e, "error on the terminate subscription"),
                }
            }
        });
    }

    fn spawn_response_loop(&self, mut stream: BoxStream<'static, Result<BusEnvelope, BusError>>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(envelope) => manager.handle_response(envelope).await,
                    Err(e) => warn!(error = %e, "error on the response subscription"),
                }
            }
        });
    }

    /// Handles an inbound instantiation request.
    pub async fn handle_deploy(&self, envelope: BusEnvelope) {
        // The deploy subject doubles as the outcome subject; skip our own
        // messages.
        if envelope.sender == self.plugin_name {
            return;
        }

        info!("fpga service instance create request received");

        let Some(origin_correlation_id) = envelope.correlation_id.clone() else {
            warn!("instantiation request without correlation id rejected");
            return;
        };

        let request: DeployRequest = match envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed instantiation request rejected");
                return;
            }
        };

        let instance_id = request.instance_id.clone();
        let mut entry = LedgerEntry::new(
            instance_id.clone(),
            request.descriptor,
            Some(request.service_id),
            Some(request.vim_id),
            lifecycle_topics::DEPLOY,
            origin_correlation_id,
        );
        entry.schedule.extend(Task::instantiation_workflow());

        if let Err(e) = self.store.create(entry) {
            warn!(instance_id = %instance_id, error = %e, "instantiation request dropped");
            return;
        }

        info!(
            instance_id = %instance_id,
            "new instantiation request received, instantiation started"
        );
        self.scheduler.advance(&instance_id).await;
    }

    /// Handles an inbound termination request: removes the prior records,
    /// recovers the infrastructure target from them and starts the
    /// single-step teardown chain.
    pub async fn handle_terminate(&self, envelope: BusEnvelope) {
        if envelope.sender == self.plugin_name {
            return;
        }

        info!("fpga service instance terminate request received");

        let Some(origin_correlation_id) = envelope.correlation_id.clone() else {
            warn!("termination request without correlation id rejected");
            return;
        };

        let request: TerminateRequest = match envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed termination request rejected");
                return;
            }
        };
        let instance_id = request.instance_id.clone();

        let record = match self.repository.find_record(&instance_id).await {
            Ok(record) => record,
            Err(RepositoryError::NotFound(_)) => {
                warn!(instance_id = %instance_id, "no record found for instance");
                self.send_outcome(
                    lifecycle_topics::TERMINATE,
                    origin_correlation_id,
                    &OutcomeNotification::failed(StepFailure::new(format!(
                        "no record found for instance {}",
                        instance_id
                    ))),
                )
                .await;
                return;
            }
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "record lookup failed");
                self.send_outcome(
                    lifecycle_topics::TERMINATE,
                    origin_correlation_id,
                    &OutcomeNotification::failed(StepFailure::new(e.to_string())),
                )
                .await;
                return;
            }
        };

        let vim_id: Option<VimId> = record
            .virtual_deployment_units
            .first()
            .map(|unit| unit.vim_id.clone());
        let Some(vim_id) = vim_id else {
            warn!(instance_id = %instance_id, "record lists no deployment units");
            self.send_outcome(
                lifecycle_topics::TERMINATE,
                origin_correlation_id,
                &OutcomeNotification::failed(StepFailure::new(
                    "record lists no deployment units, cannot determine the VIM target",
                )),
            )
            .await;
            return;
        };

        if let Err(e) = self.repository.delete_record(&instance_id).await {
            warn!(instance_id = %instance_id, error = %e, "record removal failed");
            self.send_outcome(
                lifecycle_topics::TERMINATE,
                origin_correlation_id,
                &OutcomeNotification::failed(StepFailure::new(e.to_string())),
            )
            .await;
            return;
        }

        let mut entry = LedgerEntry::new(
            instance_id.clone(),
            FpgaDescriptor::empty_shell(),
            None,
            Some(vim_id),
            lifecycle_topics::TERMINATE,
            origin_correlation_id,
        );
        entry.schedule.extend(Task::termination_workflow());

        if let Err(e) = self.store.create(entry) {
            warn!(instance_id = %instance_id, error = %e, "termination request dropped");
            return;
        }

        info!(instance_id = %instance_id, "termination started");
        self.scheduler.advance(&instance_id).await;
    }

    /// Handles an inbound response on the shared response subject.
    pub async fn handle_response(&self, envelope: BusEnvelope) {
        let Some(correlation_id) = envelope.correlation_id.clone() else {
            warn!("response without correlation id dropped");
            return;
        };

        let instance_id = match resolve(&self.store, &correlation_id).await {
            Ok(instance_id) => instance_id,
            Err(CorrelationError::Unmatched(_)) => {
                warn!(
                    correlation_id = %correlation_id,
                    "response matches no live ledger entry, dropped"
                );
                return;
            }
        };

        let response: InfraResponse = match envelope.decode() {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    instance_id = %instance_id,
                    error = %e,
                    "malformed infrastructure response dropped"
                );
                return;
            }
        };

        let Ok(handle) = self.store.get(&instance_id) else {
            warn!(instance_id = %instance_id, "entry disappeared before the response was applied");
            return;
        };

        // Claim the pending call under the entry lock; the deadline timer
        // uses the same claim, so a response and an expiry can never both
        // act on one call.
        let kind = {
            let mut entry = handle.entry.lock().await;
            if !entry.awaits(&correlation_id) {
                warn!(
                    instance_id = %instance_id,
                    correlation_id = %correlation_id,
                    "stale response, the pending call was already claimed"
                );
                return;
            }
            match entry.awaiting.take() {
                Some(pending) => pending.kind,
                None => return,
            }
        };

        match kind {
            PendingKind::Provisioning => {
                self.on_provision_response(&instance_id, response).await;
            }
            PendingKind::Teardown => {
                self.on_teardown_response(&instance_id, response).await;
            }
        }
    }

    async fn on_provision_response(&self, instance_id: &InstanceId, response: InfraResponse) {
        info!(
            instance_id = %instance_id,
            "response from the infrastructure backend on the deploy call received"
        );

        match response.request_status {
            RequestStatus::Completed => match response.record {
                Some(record) => {
                    if let Ok(handle) = self.store.get(instance_id) {
                        let mut entry = handle.entry.lock().await;
                        entry.infra_record = Some(record);
                        entry.error = None;
                    }
                    info!(instance_id = %instance_id, "fpga service deployed correctly");
                }
                None => {
                    self.engine
                        .fail(
                            instance_id,
                            StepFailure::new("provisioning response carried no record"),
                        )
                        .await;
                }
            },
            RequestStatus::Failed => {
                let message = response
                    .message
                    .unwrap_or_else(|| "deployment failed".to_string());
                info!(instance_id = %instance_id, "deployment failed: {}", message);
                self.engine.fail(instance_id, StepFailure::new(message)).await;
            }
        }

        self.scheduler.advance(instance_id).await;
    }

    async fn on_teardown_response(&self, instance_id: &InstanceId, response: InfraResponse) {
        info!(
            instance_id = %instance_id,
            "response from the infrastructure backend on the teardown call received"
        );

        match response.request_status {
            RequestStatus::Completed => {
                let Ok(handle) = self.store.get(instance_id) else {
                    return;
                };
                let (topic, correlation_id) = {
                    let mut entry = handle.entry.lock().await;
                    entry.status = WorkflowStatus::Completed;
                    (
                        entry.origin_topic.clone(),
                        entry.origin_correlation_id.clone(),
                    )
                };
                info!(instance_id = %instance_id, "fpga service torn down correctly");
                self.send_outcome(
                    &topic,
                    correlation_id,
                    &OutcomeNotification::completed(None, None),
                )
                .await;
            }
            RequestStatus::Failed => {
                let message = response
                    .message
                    .unwrap_or_else(|| "teardown failed".to_string());
                info!(instance_id = %instance_id, "teardown failed: {}", message);
                self.engine.fail(instance_id, StepFailure::new(message)).await;
            }
        }

        self.scheduler.advance(instance_id).await;
    }

    async fn send_outcome(
        &self,
        topic: &str,
        correlation_id: CorrelationId,
        outcome: &OutcomeNotification,
    ) {
        if let Err(e) = self
            .engine
            .publish_outcome(topic, correlation_id, outcome)
            .await
        {
            error!(error = %e, "could not deliver outcome notification");
        }
    }
}
