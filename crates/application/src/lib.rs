//! Lifecycle orchestration engine
//!
//! One ledger entry per in-flight FPGA service instance, one task chain per
//! entry. The scheduler drives each chain strictly in order, suspends it at
//! asynchronous steps and resumes it when the correlation matcher pairs an
//! inbound response with the waiting entry.

pub mod correlation;
pub mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod scheduler;
pub mod tasks;

pub use correlation::{CorrelationError, resolve};
pub use engine::WorkflowEngine;
pub use ledger::{
    InstanceHandle, LedgerEntry, LedgerError, LedgerStore, PendingCall, PendingKind,
};
pub use lifecycle::LifecycleManager;
pub use scheduler::{ChainScheduler, TaskExecutor};
pub use tasks::Task;
