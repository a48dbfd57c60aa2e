//! The task-chain scheduler
//!
//! `advance` is the sole entry point that progresses a chain. It pops and
//! runs tasks strictly in schedule order, awaiting each task's completion
//! before inspecting its outcome. A bounded worker pool limits concurrent
//! task executions platform-wide; submissions beyond the bound queue on the
//! semaphore instead of being dropped.
//!
//! Within one instance the chain is single-threaded: the per-instance
//! driver guard rejects a second concurrent `advance`, and a suspended
//! chain (outstanding correlated call) is only ever resumed by the
//! response path that cleared the pending call.

use crate::ledger::{LedgerStore, PendingCall};
use crate::tasks::Task;
use async_trait::async_trait;
use haizea_domain::messages::StepFailure;
use haizea_shared::ids::{CorrelationId, InstanceId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Executes task bodies and routes step failures
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs one task body to completion
    async fn execute(&self, task: Task, instance_id: &InstanceId) -> Result<(), StepFailure>;

    /// Records the failure, notifies the workflow's originator and marks
    /// the chain for termination; never deletes the entry itself
    async fn abort(&self, instance_id: &InstanceId, failure: StepFailure);
}

enum Decision {
    /// kill_chain was set; the abort notification already went out
    Kill,
    /// Schedule exhausted
    Completed,
    /// Chain is suspended awaiting an external response
    Suspended,
    Run(Task),
}

/// Per-instance task-chain scheduler over a shared bounded worker pool
pub struct ChainScheduler<E> {
    store: Arc<LedgerStore>,
    executor: Arc<E>,
    pool: Arc<Semaphore>,
    step_timeout: Duration,
}

impl<E> Clone for ChainScheduler<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
            pool: self.pool.clone(),
            step_timeout: self.step_timeout,
        }
    }
}

impl<E> ChainScheduler<E>
where
    E: TaskExecutor + 'static,
{
    pub fn new(
        store: Arc<LedgerStore>,
        executor: Arc<E>,
        pool_size: usize,
        step_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            pool: Arc::new(Semaphore::new(pool_size)),
            step_timeout,
        }
    }

    /// Progresses the chain of one instance until it suspends, completes
    /// or is killed.
    pub async fn advance(&self, instance_id: &InstanceId) {
        let handle = match self.store.get(instance_id) {
            Ok(handle) => handle,
            Err(_) => {
                debug!(instance_id = %instance_id, "advance on unknown instance, nothing to do");
                return;
            }
        };

        // Single driver per instance. A contended guard means a stray
        // resume; it must not interleave tasks with the running driver.
        let _driver = match handle.chain.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    instance_id = %instance_id,
                    "chain is already being driven, ignoring concurrent advance"
                );
                return;
            }
        };

        loop {
            let decision = {
                let mut entry = handle.entry.lock().await;
                if entry.kill_chain {
                    Decision::Kill
                } else if entry.awaiting.is_some() {
                    Decision::Suspended
                } else if let Some(task) = entry.schedule.pop_front() {
                    Decision::Run(task)
                } else {
                    Decision::Completed
                }
            };

            match decision {
                Decision::Kill => {
                    info!(instance_id = %instance_id, "killing running workflow");
                    self.store.delete(instance_id);
                    return;
                }
                Decision::Completed => {
                    info!(instance_id = %instance_id, "schedule exhausted, workflow finished");
                    self.store.delete(instance_id);
                    return;
                }
                Decision::Suspended => {
                    warn!(
                        instance_id = %instance_id,
                        "chain is suspended on an outstanding call, only its response may resume it"
                    );
                    return;
                }
                Decision::Run(task) => {
                    let permit = match self.pool.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            error!("worker pool closed, cannot run further tasks");
                            return;
                        }
                    };

                    debug!(instance_id = %instance_id, task = %task, "starting task");
                    // The task body runs on its own spawned execution and is
                    // awaited to completion; a panicking task is contained
                    // and treated like an explicit failure.
                    let executor = self.executor.clone();
                    let task_instance_id = instance_id.clone();
                    let joined =
                        tokio::spawn(async move { executor.execute(task, &task_instance_id).await })
                            .await;
                    let outcome = match joined {
                        Ok(result) => result,
                        Err(e) => Err(StepFailure::new(format!("task body fault: {}", e))),
                    };
                    drop(permit);

                    if let Err(failure) = outcome {
                        warn!(
                            instance_id = %instance_id,
                            task = %task,
                            error = %failure,
                            "task failed"
                        );
                        self.executor.abort(instance_id, failure).await;
                        // kill_chain is now set; the next pass reaps the entry
                        continue;
                    }

                    let mut entry = handle.entry.lock().await;
                    if entry.pause_chain {
                        entry.pause_chain = false;
                        if let Some(pending) = entry.awaiting.clone() {
                            self.arm_deadline(instance_id.clone(), pending);
                        }
                        debug!(instance_id = %instance_id, task = %task, "chain paused");
                        return;
                    }
                }
            }
        }
    }

    /// Arms the deadline of a suspended chain. A lost response must not
    /// leave the entry paused forever; expiry is routed through the abort
    /// handler exactly like an explicit failure.
    fn arm_deadline(&self, instance_id: InstanceId, pending: PendingCall) {
        for correlation_id in pending.correlation_ids {
            let scheduler = self.clone();
            let instance_id = instance_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(scheduler.step_timeout).await;
                scheduler.expire(instance_id, correlation_id).await;
            });
        }
    }

    async fn expire(&self, instance_id: InstanceId, correlation_id: CorrelationId) {
        let Ok(handle) = self.store.get(&instance_id) else {
            return;
        };

        // Claim the pending call under the entry lock; a response that
        // already resumed the chain makes this timer a no-op.
        let still_waiting = {
            let mut entry = handle.entry.lock().await;
            if entry.awaits(&correlation_id) {
                entry.awaiting = None;
                true
            } else {
                false
            }
        };

        if !still_waiting {
            return;
        }

        warn!(
            instance_id = %instance_id,
            correlation_id = %correlation_id,
            "no response within {}s, aborting workflow",
            self.step_timeout.as_secs()
        );
        let failure = StepFailure::new(format!(
            "no response within {}s for correlated call {}",
            self.step_timeout.as_secs(),
            correlation_id
        ));
        self.executor.abort(&instance_id, failure).await;
        self.advance(&instance_id).await;
    }
}
