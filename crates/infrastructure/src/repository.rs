//! HTTP client for the record repository collaborator
//!
//! The repository exposes `/fpga-instances` as a plain document store:
//! create by POST, read and delete by id. Anything other than a 2xx is
//! surfaced as a status error carrying the repository's own message.

use async_trait::async_trait;
use haizea_domain::record::FpgaRecord;
use haizea_domain::repository::{RecordRepository, RepositoryError};
use haizea_shared::ids::InstanceId;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP client for communicating with the record repository
pub struct HttpRecordRepository {
    client: Client,
    base_url: String,
}

impl HttpRecordRepository {
    /// Create a new repository client
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn instances_url(&self) -> String {
        format!("{}/fpga-instances", self.base_url)
    }

    fn instance_url(&self, instance_id: &InstanceId) -> String {
        format!("{}/fpga-instances/{}", self.base_url, instance_id)
    }

    async fn status_error(response: reqwest::Response) -> RepositoryError {
        let code = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());
        RepositoryError::Status { code, message }
    }
}

#[async_trait]
impl RecordRepository for HttpRecordRepository {
    async fn create_record(&self, record: &FpgaRecord) -> Result<(), RepositoryError> {
        let url = self.instances_url();
        debug!(url = %url, record_id = %record.id, "storing record");

        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn find_record(&self, instance_id: &InstanceId) -> Result<FpgaRecord, RepositoryError> {
        let url = self.instance_url(instance_id);
        debug!(url = %url, "reading record");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound(instance_id.clone()));
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json::<FpgaRecord>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn delete_record(&self, instance_id: &InstanceId) -> Result<(), RepositoryError> {
        let url = self.instance_url(instance_id);
        debug!(url = %url, "removing record");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound(instance_id.clone()));
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_rooted_at_the_instances_collection() {
        let repository = HttpRecordRepository::new("http://repository:4012/", 5).unwrap();
        assert_eq!(
            repository.instances_url(),
            "http://repository:4012/fpga-instances"
        );

        let instance_id = InstanceId::new();
        assert_eq!(
            repository.instance_url(&instance_id),
            format!("http://repository:4012/fpga-instances/{}", instance_id)
        );
    }

    #[test]
    fn test_trailing_slashes_are_normalized() {
        let repository = HttpRecordRepository::new("http://repository:4012///", 5).unwrap();
        assert_eq!(
            repository.instances_url(),
            "http://repository:4012/fpga-instances"
        );
    }
}
