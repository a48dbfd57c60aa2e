//! Message-bus port
//!
//! The lifecycle manager only ever sees this trait; the NATS adapter lives
//! in the infrastructure crate. The envelope carries the metadata the
//! request/response pattern needs: a correlation id and a reply subject,
//! plus the sender identity so handlers can skip their own messages on
//! shared subjects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use haizea_shared::ids::CorrelationId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("Bus connection error: {0}")]
    ConnectionError(String),

    #[error("Failed to publish message: {0}")]
    PublishError(String),

    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    #[error("Message serialization error: {0}")]
    SerializationError(String),
}

/// Wrapped message envelope for bus transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Bus identity of the publishing component
    pub sender: String,
    /// Correlation id pairing a request with its eventual response
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    /// Subject the response to this message should be published on
    #[serde(default)]
    pub reply_to: Option<String>,
    /// The serialized payload
    pub payload: serde_json::Value,
    /// Message creation timestamp
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl BusEnvelope {
    /// Creates an envelope around a serializable payload
    pub fn new<T: Serialize>(sender: &str, payload: &T) -> Result<Self, BusError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        Ok(Self {
            sender: sender.to_string(),
            correlation_id: None,
            reply_to: None,
            payload,
            created_at: Utc::now(),
        })
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    /// Extracts the typed payload from this envelope
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| BusError::SerializationError(e.to_string()))
    }
}

/// Publish/subscribe port over the platform message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an envelope on a subject
    async fn publish(&self, subject: &str, envelope: BusEnvelope) -> Result<(), BusError>;

    /// Subscribes to a subject and returns the stream of envelopes
    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<BoxStream<'static, Result<BusEnvelope, BusError>>, BusError>;
}
