//! NATS JetStream MessageBus implementation.
//!
//! This module provides a production-ready MessageBus implementation using
//! NATS JetStream for durable, at-least-once message delivery.
//!
//! # Features
//! - **Durable Consumers**: Subscriptions survive plugin restarts
//! - **At-Least-Once Delivery**: Automatic acknowledgments and redelivery
//! - **Work Queues**: Each subject is backed by a work-queue stream
//! - **Subject-Based Routing**: Lifecycle and infrastructure traffic stay
//!   on their own subject hierarchies

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::stream::Stream as StreamHandle;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use haizea_domain::bus::{BusEnvelope, BusError, MessageBus};
use haizea_shared::config::NatsSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// NATS MessageBus implementation using JetStream.
///
/// This implementation provides:
/// - **Publish**: Sends envelopes to NATS subjects with ack confirmation
/// - **Subscribe**: Creates durable consumers that survive restarts
/// - **Stream Management**: Automatic stream and consumer creation
#[derive(Clone)]
pub struct NatsMessageBus {
    /// NATS client connection
    client: Arc<Client>,
    /// JetStream context for stream operations
    jetstream: JetStreamContext,
    /// Stream name prefix for isolation
    stream_prefix: String,
    /// Durable consumer identity (one per plugin instance)
    consumer_identity: String,
    /// Known-stream cache
    state: Arc<Mutex<Vec<StreamInfo>>>,
}

#[derive(Debug)]
struct StreamInfo {
    name: String,
    handle: StreamHandle,
}

impl NatsMessageBus {
    /// Connects to NATS and creates a new NatsMessageBus
    ///
    /// # Errors
    /// Returns an error if connection to NATS fails
    pub async fn connect(settings: &NatsSettings, plugin_name: &str) -> Result<Self, BusError> {
        let connection_timeout = Duration::from_secs(settings.timeout_secs);

        let mut connect_options = ConnectOptions::default()
            .connection_timeout(connection_timeout)
            .name(plugin_name);

        if let Some(max_reconnects) = settings.max_reconnects {
            connect_options = connect_options.max_reconnects(max_reconnects);
        }

        let client = async_nats::connect_with_options(settings.primary_url(), connect_options)
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client.clone());

        info!(url = settings.primary_url(), "connected to the message bus");

        Ok(Self {
            client: Arc::new(client),
            jetstream,
            stream_prefix: "HAIZEA".to_string(),
            consumer_identity: plugin_name.to_string(),
            state: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Overrides the stream prefix; useful for isolated test environments
    pub fn with_prefix(mut self, stream_prefix: &str) -> Self {
        self.stream_prefix = stream_prefix.to_string();
        self
    }

    /// Gets the stream name for a subject
    fn stream_name_for_subject(&self, subject: &str) -> String {
        stream_name(&self.stream_prefix, subject)
    }

    /// Ensures the stream backing a subject exists
    async fn ensure_stream(&self, subject: &str) -> Result<StreamHandle, BusError> {
        let stream_name = self.stream_name_for_subject(subject);

        {
            let state = self.state.lock().await;
            if let Some(info) = state.iter().find(|s| s.name == stream_name) {
                debug!("stream {} already known", stream_name);
                return Ok(info.handle.clone());
            }
        }

        // The stream might exist from a previous run.
        match self.jetstream.get_stream(&stream_name).await {
            Ok(stream) => {
                debug!("stream {} already exists in NATS", stream_name);
                let mut state = self.state.lock().await;
                state.push(StreamInfo {
                    name: stream_name,
                    handle: stream.clone(),
                });
                return Ok(stream);
            }
            Err(_) => {
                info!("creating stream {} for subject {}", stream_name, subject);
            }
        }

        // Work-queue retention: a message is removed once a consumer acks it.
        let stream_config = StreamConfig {
            name: stream_name.clone(),
            subjects: vec![subject.to_string()],
            retention: async_nats::jetstream::stream::RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(24 * 60 * 60),
            max_bytes: 1024 * 1024 * 1024,
            max_messages: 1_000_000,
            storage: async_nats::jetstream::stream::StorageType::File,
            num_replicas: 1,
            discard: async_nats::jetstream::stream::DiscardPolicy::Old,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .create_stream(stream_config)
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;

        let mut state = self.state.lock().await;
        state.push(StreamInfo {
            name: stream_name,
            handle: stream.clone(),
        });

        info!("✅ Stream created successfully");
        Ok(stream)
    }

    /// Gets or creates the durable consumer for a subject
    async fn get_consumer(&self, subject: &str) -> Result<PullConsumer, BusError> {
        let mut stream = self.ensure_stream(subject).await?;
        let stream_info = stream
            .info()
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;
        let stream_name = stream_info.config.name.clone();
        let consumer_id = consumer_name(&self.consumer_identity, subject);

        match stream.get_consumer(&consumer_id).await {
            Ok(consumer) => {
                debug!("consumer {} already exists", consumer_id);
                return Ok(consumer);
            }
            Err(_) => {
                info!("creating consumer {} for stream {}", consumer_id, stream_name);
            }
        }

        let consumer_config = PullConsumerConfig {
            durable_name: Some(consumer_id),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(30),
            max_deliver: 5,
            max_ack_pending: 1000,
            ..Default::default()
        };

        let consumer = stream
            .create_consumer(consumer_config)
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        Ok(consumer)
    }

    /// Get a reference to the JetStream context for advanced operations
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Get a reference to the raw NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl MessageBus for NatsMessageBus {
    /// Publishes an envelope to NATS JetStream
    ///
    /// # Errors
    /// Returns an error if:
    /// - Serialization fails
    /// - Publishing to NATS fails
    /// - Ack is not received within timeout
    async fn publish(&self, subject: &str, envelope: BusEnvelope) -> Result<(), BusError> {
        self.ensure_stream(subject).await?;

        let payload =
            serde_json::to_vec(&envelope).map_err(|e| BusError::SerializationError(e.to_string()))?;

        let ack = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        // Wait for ack (confirms the message was stored).
        ack.await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        debug!(subject = subject, sender = %envelope.sender, "published envelope");

        Ok(())
    }

    /// Subscribes to a subject and returns a stream of envelopes
    ///
    /// Creates a durable consumer that will survive restarts. Messages are
    /// acknowledged once decoded; undecodable messages are acked too so a
    /// poison message cannot wedge the work queue.
    async fn subscribe(
        &self,
        subject: &str,
    ) -> Result<BoxStream<'static, Result<BusEnvelope, BusError>>, BusError> {
        info!("subscribing to subject: {}", subject);

        let consumer = self.get_consumer(subject).await?;

        let stream = async_stream::stream! {
            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    error!("failed to get consumer messages: {}", e);
                    yield Err(BusError::ConnectionError(e.to_string()));
                    return;
                }
            };

            while let Some(result) = messages.next().await {
                match result {
                    Ok(message) => {
                        let envelope: Result<BusEnvelope, _> =
                            serde_json::from_slice(&message.payload);

                        if let Err(ack_err) = message.ack().await {
                            warn!("failed to ack message: {}", ack_err);
                        }

                        match envelope {
                            Ok(envelope) => yield Ok(envelope),
                            Err(e) => {
                                error!("failed to deserialize envelope: {}", e);
                                yield Err(BusError::SerializationError(e.to_string()));
                            }
                        }
                    }
                    Err(e) => {
                        error!("error receiving message: {}", e);
                        yield Err(BusError::ConnectionError(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Maps a subject to the name of the stream backing it. One stream per
/// subject keeps work-queue retention safe: no two streams may overlap.
fn stream_name(prefix: &str, subject: &str) -> String {
    let sanitized = subject.replace(['.', '*', '>'], "_");
    format!("{}_{}", prefix, sanitized)
}

/// Maps a subject to the plugin's durable consumer name on it
fn consumer_name(identity: &str, subject: &str) -> String {
    format!("{}-{}", identity, subject.replace(['.', '*', '>'], "-"))
}
