//! FPGA service records (FPGARs) and the record builder
//!
//! The infrastructure backend returns a stripped record: identity and
//! placement per unit, nothing from the blueprint. The record stored in the
//! repository is the merge of both, paired unit by unit through the
//! `vdu_reference` each backend unit carries.

use crate::descriptor::FpgaDescriptor;
use haizea_shared::ids::{InstanceId, VimId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One provisioned unit as reported by the infrastructure backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraUnit {
    pub id: String,
    pub vim_id: VimId,
    /// Reference back to the descriptor unit this one satisfies
    pub vdu_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_instances: Option<u32>,
}

/// Raw record returned by the infrastructure backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraRecord {
    pub descriptor_version: String,
    pub id: InstanceId,
    pub status: String,
    pub descriptor_reference: Uuid,
    #[serde(default)]
    pub virtual_deployment_units: Vec<InfraUnit>,
}

/// One unit of the stored record: backend identity merged with
/// blueprint-defined fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: String,
    pub vim_id: VimId,
    pub vdu_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_instances: Option<u32>,
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

/// The instantiation record persisted in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpgaRecord {
    pub descriptor_version: String,
    pub id: InstanceId,
    pub version: String,
    pub status: String,
    pub descriptor_reference: Uuid,
    #[serde(default)]
    pub virtual_deployment_units: Vec<UnitRecord>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordBuildError {
    #[error(
        "infrastructure unit {unit_id} references '{vdu_reference}', which matches no descriptor unit"
    )]
    UnmatchedUnitReference {
        unit_id: String,
        vdu_reference: String,
    },
}

/// Builds the record stored in the repository from the backend's raw output
/// and the original blueprint.
///
/// Identity and placement come from the backend; image, type and the
/// optional blueprint fields come from the descriptor unit each backend
/// unit references. A backend unit whose reference matches no descriptor
/// unit is a data-integrity fault, never silently dropped.
pub fn build_record(
    infra: &InfraRecord,
    descriptor: &FpgaDescriptor,
) -> Result<FpgaRecord, RecordBuildError> {
    let mut units = Vec::with_capacity(infra.virtual_deployment_units.len());

    for infra_unit in &infra.virtual_deployment_units {
        let blueprint_unit = descriptor
            .unit_by_reference(&infra_unit.vdu_reference)
            .ok_or_else(|| RecordBuildError::UnmatchedUnitReference {
                unit_id: infra_unit.id.clone(),
                vdu_reference: infra_unit.vdu_reference.clone(),
            })?;

        units.push(UnitRecord {
            id: infra_unit.id.clone(),
            vim_id: infra_unit.vim_id.clone(),
            vdu_reference: infra_unit.vdu_reference.clone(),
            number_of_instances: infra_unit.number_of_instances,
            service_image: blueprint_unit.service_image.clone(),
            service_type: blueprint_unit.service_type.clone(),
            service_name: blueprint_unit.service_name.clone(),
            resource_requirements: blueprint_unit.resource_requirements.clone(),
            environment: blueprint_unit.environment.clone(),
            monitoring_parameters: blueprint_unit.monitoring_parameters.clone(),
        });
    }

    Ok(FpgaRecord {
        descriptor_version: infra.descriptor_version.clone(),
        id: infra.id.clone(),
        // Building the record makes it the first version of this record.
        version: "1".to_string(),
        status: infra.status.clone(),
        descriptor_reference: infra.descriptor_reference,
        virtual_deployment_units: units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::UnitDescriptor;

    fn sample_descriptor() -> FpgaDescriptor {
        FpgaDescriptor {
            descriptor_version: "0.1".to_string(),
            uuid: Uuid::new_v4(),
            name: Some("fpga-transcoder".to_string()),
            instance_uuid: None,
            virtual_deployment_units: vec![
                UnitDescriptor {
                    id: "vdu01".to_string(),
                    service_image: "haizea/transcoder:1.2".to_string(),
                    service_type: "fpga".to_string(),
                    service_name: Some("transcoder".to_string()),
                    resource_requirements: Some(serde_json::json!({"fpga_slots": 2})),
                    environment: Some(serde_json::json!({"MODE": "hevc"})),
                    monitoring_parameters: Some(serde_json::json!([{"name": "temp"}])),
                },
                UnitDescriptor {
                    id: "vdu02".to_string(),
                    service_image: "haizea/scaler:0.9".to_string(),
                    service_type: "fpga".to_string(),
                    service_name: None,
                    resource_requirements: None,
                    environment: None,
                    monitoring_parameters: None,
                },
            ],
        }
    }

    fn infra_record_for(descriptor: &FpgaDescriptor, references: &[&str]) -> InfraRecord {
        InfraRecord {
            descriptor_version: descriptor.descriptor_version.clone(),
            id: InstanceId::new(),
            status: "normal operation".to_string(),
            descriptor_reference: descriptor.uuid,
            virtual_deployment_units: references
                .iter()
                .enumerate()
                .map(|(i, reference)| InfraUnit {
                    id: format!("unit-{}", i),
                    vim_id: VimId::new(),
                    vdu_reference: reference.to_string(),
                    number_of_instances: Some(1),
                })
                .collect(),
        }
    }

    #[test]
    fn test_build_record_merges_blueprint_fields() {
        let descriptor = sample_descriptor();
        let infra = infra_record_for(&descriptor, &["fpga-transcoder:vdu01", "fpga-transcoder:vdu02"]);

        let record = build_record(&infra, &descriptor).unwrap();

        assert_eq!(record.id, infra.id);
        assert_eq!(record.version, "1");
        assert_eq!(record.status, "normal operation");
        assert_eq!(record.descriptor_reference, descriptor.uuid);
        assert_eq!(record.virtual_deployment_units.len(), 2);

        let first = &record.virtual_deployment_units[0];
        assert_eq!(first.id, "unit-0");
        assert_eq!(first.service_image, "haizea/transcoder:1.2");
        assert_eq!(first.service_name.as_deref(), Some("transcoder"));
        assert_eq!(
            first.resource_requirements,
            Some(serde_json::json!({"fpga_slots": 2}))
        );

        let second = &record.virtual_deployment_units[1];
        assert_eq!(second.service_image, "haizea/scaler:0.9");
        assert!(second.service_name.is_none());
        assert!(second.environment.is_none());
    }

    #[test]
    fn test_build_record_rejects_unmatched_reference() {
        let descriptor = sample_descriptor();
        let infra = infra_record_for(&descriptor, &["fpga-transcoder:vdu01", "fpga-transcoder:vdu99"]);

        let err = build_record(&infra, &descriptor).unwrap_err();
        assert_eq!(
            err,
            RecordBuildError::UnmatchedUnitReference {
                unit_id: "unit-1".to_string(),
                vdu_reference: "fpga-transcoder:vdu99".to_string(),
            }
        );
    }

    #[test]
    fn test_build_record_round_trip_preserves_unit_fields() {
        // Building a record and decomposing it again must reproduce the
        // per-unit identity, reference and blueprint-derived fields.
        let descriptor = sample_descriptor();
        let infra = infra_record_for(&descriptor, &["fpga-transcoder:vdu01", "fpga-transcoder:vdu02"]);

        let record = build_record(&infra, &descriptor).unwrap();

        for (unit_record, infra_unit) in record
            .virtual_deployment_units
            .iter()
            .zip(&infra.virtual_deployment_units)
        {
            assert_eq!(unit_record.id, infra_unit.id);
            assert_eq!(unit_record.vim_id, infra_unit.vim_id);
            assert_eq!(unit_record.vdu_reference, infra_unit.vdu_reference);
            assert_eq!(unit_record.number_of_instances, infra_unit.number_of_instances);

            let blueprint_unit = descriptor
                .unit_by_reference(&infra_unit.vdu_reference)
                .unwrap();
            assert_eq!(unit_record.service_image, blueprint_unit.service_image);
            assert_eq!(unit_record.service_type, blueprint_unit.service_type);
            assert_eq!(unit_record.environment, blueprint_unit.environment);
            assert_eq!(
                unit_record.monitoring_parameters,
                blueprint_unit.monitoring_parameters
            );
        }
    }

    #[test]
    fn test_record_serde_round_trip() {
        let descriptor = sample_descriptor();
        let infra = infra_record_for(&descriptor, &["fpga-transcoder:vdu01"]);
        let record = build_record(&infra, &descriptor).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let parsed: FpgaRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
