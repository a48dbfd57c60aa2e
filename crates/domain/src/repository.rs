//! Record-repository port
//!
//! The repository is an external collaborator reachable over HTTP. Only the
//! narrow create/read/delete surface the lifecycle manager needs is
//! modelled; everything else the repository offers stays behind its own
//! REST facade.

use crate::record::FpgaRecord;
use async_trait::async_trait;
use haizea_shared::ids::InstanceId;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("No record found for instance {0}")]
    NotFound(InstanceId),

    #[error("Repository returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Repository transport error: {0}")]
    Transport(String),

    #[error("Failed to decode repository payload: {0}")]
    Decode(String),
}

/// CRUD port onto the record repository collaborator
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Persists a freshly built record
    async fn create_record(&self, record: &FpgaRecord) -> Result<(), RepositoryError>;

    /// Reads the record of an instance
    async fn find_record(&self, instance_id: &InstanceId) -> Result<FpgaRecord, RepositoryError>;

    /// Removes the record of an instance
    async fn delete_record(&self, instance_id: &InstanceId) -> Result<(), RepositoryError>;
}
