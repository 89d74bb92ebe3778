use crate::messaging::config::RabbitMqConfig;
use crate::scheduler::BatchSummary;
use chrono::{DateTime, Utc};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error)
}

/// Fired after a batch finishes so downstream consumers (leaderboard
/// refresher, notifications) can react without polling
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessedMessage {
    pub agent_id: String,
    pub total: usize,
    pub completed_matches: usize,
    pub failed_matches: usize,
    pub cancelled: bool,
    pub processed_at: DateTime<Utc>
}

impl BatchProcessedMessage {
    pub fn from_summary(agent_id: &str, summary: &BatchSummary) -> BatchProcessedMessage {
        BatchProcessedMessage {
            agent_id: agent_id.to_string(),
            total: summary.total,
            completed_matches: summary.completed_matches,
            failed_matches: summary.failed_matches,
            cancelled: summary.cancelled,
            processed_at: Utc::now()
        }
    }
}

/// Envelope shared with the platform's other services; consumers route on
/// `messageType`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageEnvelope<T> {
    message_id: String,
    conversation_id: String,
    source_address: String,
    message_type: Vec<String>,
    message: T,
    sent_time: String
}

impl<T> MessageEnvelope<T> {
    fn wrap(message: T, message_type: &str) -> MessageEnvelope<T> {
        MessageEnvelope {
            message_id: Uuid::new_v4().to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            source_address: "arena-processor".to_string(),
            message_type: vec![format!("urn:message:{}", message_type)],
            message,
            sent_time: Utc::now().to_rfc3339()
        }
    }
}

/// Publishes batch lifecycle messages to a fanout exchange
pub struct RabbitMqPublisher {
    connection: Connection,
    channel: Channel,
    exchange: String
}

impl RabbitMqPublisher {
    /// Connects and declares the configured exchange
    pub async fn connect(config: &RabbitMqConfig) -> Result<RabbitMqPublisher, PublisherError> {
        let connection = Connection::connect(&config.connection_url(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        info!(exchange = %config.exchange, "Connected to RabbitMQ");

        Ok(RabbitMqPublisher {
            connection,
            channel,
            exchange: config.exchange.clone()
        })
    }

    pub async fn publish_batch_processed(&self, message: BatchProcessedMessage) -> Result<(), PublisherError> {
        let envelope = MessageEnvelope::wrap(message, "WormArena.Contracts:BatchProcessed");
        let payload = serde_json::to_vec(&envelope)?;

        self.channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_message_id(envelope.message_id.clone().into())
            )
            .await?
            .await?;

        info!(
            exchange = %self.exchange,
            agent_id = %envelope.message.agent_id,
            "Published batch processed message"
        );

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> Result<(), PublisherError> {
        self.connection.close(200, "Normal shutdown").await?;

        Ok(())
    }
}

impl Drop for RabbitMqPublisher {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("RabbitMQ publisher dropped while still connected, call close() for a clean shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_a_routable_message_type() {
        let message = BatchProcessedMessage {
            agent_id: "a".to_string(),
            total: 5,
            completed_matches: 4,
            failed_matches: 1,
            cancelled: false,
            processed_at: Utc::now()
        };

        let envelope = MessageEnvelope::wrap(message, "WormArena.Contracts:BatchProcessed");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["messageType"][0], "urn:message:WormArena.Contracts:BatchProcessed");
        assert_eq!(json["message"]["completedMatches"], 4);
        assert_eq!(json["sourceAddress"], "arena-processor");
        assert!(json["messageId"].as_str().unwrap().len() > 10);
    }

    #[test]
    fn summary_maps_onto_the_message() {
        let summary = BatchSummary {
            total: 9,
            completed_matches: 8,
            failed_matches: 1,
            cancelled: false
        };

        let message = BatchProcessedMessage::from_summary("hero", &summary);

        assert_eq!(message.agent_id, "hero");
        assert_eq!(message.total, 9);
        assert_eq!(message.failed_matches, 1);
        assert!(!message.cancelled);
    }
}
