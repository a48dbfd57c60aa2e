//! The task library
//!
//! A chain is an ordered sequence of these steps. The set is closed so the
//! compiler checks that every scheduled step exists and is dispatched.

use std::fmt;

/// One step of a workflow chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Asynchronous: request deployment from the infrastructure backend
    /// and suspend the chain until its response arrives
    RequestProvisioning,
    /// Synchronous: build the instantiation record and store it in the
    /// repository
    PersistRecord,
    /// Synchronous: send the terminal outcome to the workflow's originator
    NotifyOriginator,
    /// Asynchronous: request teardown from the infrastructure backend
    RequestTeardown,
}

impl Task {
    /// The schedule assigned to an instantiation workflow
    pub fn instantiation_workflow() -> [Task; 3] {
        [
            Task::RequestProvisioning,
            Task::PersistRecord,
            Task::NotifyOriginator,
        ]
    }

    /// The schedule assigned to a termination workflow
    pub fn termination_workflow() -> [Task; 1] {
        [Task::RequestTeardown]
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::RequestProvisioning => write!(f, "request-provisioning"),
            Task::PersistRecord => write!(f, "persist-record"),
            Task::NotifyOriginator => write!(f, "notify-originator"),
            Task::RequestTeardown => write!(f, "request-teardown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiation_workflow_order() {
        assert_eq!(
            Task::instantiation_workflow(),
            [
                Task::RequestProvisioning,
                Task::PersistRecord,
                Task::NotifyOriginator,
            ]
        );
    }

    #[test]
    fn test_termination_workflow_is_single_step() {
        assert_eq!(Task::termination_workflow(), [Task::RequestTeardown]);
    }
}
