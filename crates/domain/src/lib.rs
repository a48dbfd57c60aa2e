pub mod bus;
pub mod descriptor;
pub mod messages;
pub mod record;
pub mod repository;

pub use bus::{BusEnvelope, BusError, MessageBus};
pub use descriptor::{FpgaDescriptor, UnitDescriptor};
pub use messages::{
    DeployRequest, InfraDeployRequest, InfraResponse, InfraTeardownRequest, OutcomeNotification,
    PluginAnnouncement, RequestStatus, StepFailure, TerminateRequest, WorkflowStatus,
};
pub use record::{FpgaRecord, InfraRecord, InfraUnit, RecordBuildError, UnitRecord, build_record};
pub use repository::{RecordRepository, RepositoryError};
