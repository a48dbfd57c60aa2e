//! Bus message payloads spoken by the lifecycle manager
//!
//! These are the wire contracts of the plugin's collaborators: the
//! originator (gatekeeper/SLM side), the infrastructure-provisioning
//! backend and the plugin manager. Payloads travel inside a
//! [`crate::bus::BusEnvelope`].

use crate::descriptor::FpgaDescriptor;
use crate::record::{FpgaRecord, InfraRecord};
use chrono::{DateTime, Utc};
use haizea_shared::ids::{InstanceId, ServiceId, VimId};
use serde::{Deserialize, Serialize};

/// Inbound instantiation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub instance_id: InstanceId,
    pub descriptor: FpgaDescriptor,
    pub service_id: ServiceId,
    pub vim_id: VimId,
}

/// Inbound termination request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminateRequest {
    pub instance_id: InstanceId,
}

/// Outbound provisioning request to the infrastructure backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraDeployRequest {
    /// Blueprint stamped with the instance uuid
    pub descriptor: FpgaDescriptor,
    pub instance_id: InstanceId,
    pub vim_id: VimId,
    pub service_id: ServiceId,
}

/// Outbound teardown request to the infrastructure backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraTeardownRequest {
    pub instance_id: InstanceId,
    pub vim_id: VimId,
}

/// Status reported by the infrastructure backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Completed => write!(f, "COMPLETED"),
            RequestStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Inbound response from the infrastructure backend, matched by
/// correlation id on the plugin's shared response subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraResponse {
    pub request_status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<InfraRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Externally visible state of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::InProgress => write!(f, "in-progress"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Failure detail recorded by a task and reported to the originator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
}

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_code: None,
        }
    }

    pub fn with_http_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            http_code: Some(code),
        }
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.http_code {
            Some(code) => write!(f, "{} (http {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Terminal outcome notification sent to the workflow's originator,
/// correlated with the origin correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeNotification {
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<FpgaRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeNotification {
    pub fn completed(record: Option<FpgaRecord>, error: Option<StepFailure>) -> Self {
        Self {
            status: WorkflowStatus::Completed,
            record,
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: StepFailure) -> Self {
        Self {
            status: WorkflowStatus::Failed,
            record: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Plugin announcement for the plugin-manager handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginAnnouncement {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_request_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        let parsed: RequestStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(parsed, RequestStatus::Failed);
    }

    #[test]
    fn test_workflow_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn test_deploy_request_round_trip() {
        let request = DeployRequest {
            instance_id: InstanceId::new(),
            descriptor: FpgaDescriptor {
                descriptor_version: "0.1".to_string(),
                uuid: Uuid::new_v4(),
                name: None,
                instance_uuid: None,
                virtual_deployment_units: Vec::new(),
            },
            service_id: ServiceId::new(),
            vim_id: VimId::new(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: DeployRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_failure_response_needs_no_record() {
        let json = r#"{"request_status": "FAILED", "message": "quota exceeded"}"#;
        let parsed: InfraResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.request_status, RequestStatus::Failed);
        assert!(parsed.record.is_none());
        assert_eq!(parsed.message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_outcome_constructors() {
        let outcome = OutcomeNotification::failed(StepFailure::new("backend unreachable"));
        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert!(outcome.record.is_none());

        let outcome = OutcomeNotification::completed(None, None);
        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_step_failure_display_includes_http_code() {
        let failure = StepFailure::with_http_code("record rejected", 409);
        assert_eq!(failure.to_string(), "record rejected (http 409)");
    }
}
