//! FPGA service descriptors (FPGADs)
//!
//! The descriptor is the deployment blueprint of a service instance. It is
//! immutable once a workflow starts; the lifecycle manager only stamps the
//! instance uuid on it before handing it to the infrastructure backend.

use haizea_shared::ids::InstanceId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deployment blueprint for an FPGA service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpgaDescriptor {
    pub descriptor_version: String,
    /// Catalogue identity of this descriptor; records reference it
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instance this descriptor is deployed as; stamped by the lifecycle
    /// manager before the provisioning request goes out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_uuid: Option<InstanceId>,
    #[serde(default)]
    pub virtual_deployment_units: Vec<UnitDescriptor>,
}

/// One deployable unit of a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub id: String,
    pub service_image: String,
    pub service_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_parameters: Option<serde_json::Value>,
}

impl FpgaDescriptor {
    /// Finds the descriptor unit a backend unit reference points at.
    ///
    /// Unit references carry the descriptor unit id embedded in a longer
    /// path, so matching is by containment rather than equality.
    pub fn unit_by_reference(&self, vdu_reference: &str) -> Option<&UnitDescriptor> {
        self.virtual_deployment_units
            .iter()
            .find(|unit| vdu_reference.contains(&unit.id))
    }

    /// An empty descriptor shell, used when a ledger entry is re-created
    /// for a termination workflow and no blueprint travels with the request.
    pub fn empty_shell() -> Self {
        Self {
            descriptor_version: String::new(),
            uuid: Uuid::nil(),
            name: None,
            instance_uuid: None,
            virtual_deployment_units: Vec::new(),
        }
    }
}
