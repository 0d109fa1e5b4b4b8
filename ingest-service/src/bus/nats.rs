//! NATS transport. Requests arrive on a queue-group subscription so replicas share the
//! load, and completion events carry the saga id in a header.

use super::{BusError, EventPublisher, MessageSource, PublishError};
use crate::config::NatsConfig;
use crate::events::{Envelope, ExtractCompleted};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Header carrying the saga id a completion event is keyed by.
pub const KEY_HEADER: &str = "Saga-Id";

pub struct NatsSource {
    messages: BoxStream<'static, Bytes>,
}

impl NatsSource {
    /// Joins the configured queue group on the request subject.
    pub async fn subscribe(client: &async_nats::Client, config: &NatsConfig) -> Result<Self, BusError> {
        let subscriber = client
            .queue_subscribe(config.request_subject.clone(), config.queue_group.clone())
            .await
            .map_err(|e| BusError::Broker(Box::new(e)))?;

        tracing::info!(
            subject = %config.request_subject,
            queue_group = %config.queue_group,
            "subscribed to extract requests"
        );
        Ok(Self::from_stream(subscriber.map(|message| message.payload)))
    }

    pub fn from_stream(messages: impl futures::Stream<Item = Bytes> + Send + 'static) -> Self {
        NatsSource {
            messages: messages.boxed(),
        }
    }
}

#[async_trait]
impl MessageSource for NatsSource {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, BusError> {
        Ok(self.messages.next().await.map(|payload| payload.to_vec()))
    }
}

/// Publish side of a NATS connection.
#[async_trait]
pub trait NatsPublish: Send + Sync {
    async fn publish(&self, subject: String, key: &str, payload: Bytes) -> Result<(), PublishError>;
}

#[async_trait]
impl NatsPublish for async_nats::Client {
    async fn publish(&self, subject: String, key: &str, payload: Bytes) -> Result<(), PublishError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(KEY_HEADER, key);

        self.publish_with_headers(subject, headers, payload)
            .await
            .map_err(|e| PublishError::Broker(Box::new(e)))?;
        // The event only counts as published once the server has it.
        self.flush()
            .await
            .map_err(|e| PublishError::Broker(Box::new(e)))
    }
}

pub struct NatsPublisher {
    client: Arc<dyn NatsPublish>,
    subject: String,
}

impl NatsPublisher {
    pub fn new(client: Arc<dyn NatsPublish>, subject: impl Into<String>) -> Self {
        NatsPublisher {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(
        &self,
        key: &str,
        envelope: &Envelope<ExtractCompleted>,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(envelope)?;
        self.client
            .publish(self.subject.clone(), key, Bytes::from(payload))
            .await
    }
}

/// Connects to the configured servers. The one client backs both the source and the
/// publisher.
pub async fn connect(config: &NatsConfig) -> Result<async_nats::Client, BusError> {
    let client = async_nats::ConnectOptions::new()
        .name(&config.client_name)
        .connect(config.servers.join(","))
        .await
        .map_err(|e| BusError::Broker(Box::new(e)))?;

    tracing::info!(servers = ?config.servers, "connected to nats");
    Ok(client)
}
