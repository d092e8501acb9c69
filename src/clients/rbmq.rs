use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{
    config::Config,
    dispatch::Publisher,
    error::DispatchError,
    models::{message::OutboundMessage, retry::RetryConfig},
    utils::retry_with_backoff,
};

/// Publishes outbound messages to the delivery exchange consumed by the senders.
pub struct RabbitMqPublisher {
    connection: Connection,
    channel: Channel,
    exchange_name: String,
    routing_key: String,
    retry_config: RetryConfig,
}

fn exchange_kind(exchange_type: &str) -> ExchangeKind {
    match exchange_type {
        "direct" => ExchangeKind::Direct,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Fanout,
    }
}

impl RabbitMqPublisher {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .exchange_declare(
                &config.exchange_name,
                exchange_kind(&config.exchange_type),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare exchange: {}", e))?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare notification queue: {}", e))?;

        channel
            .queue_bind(
                &config.queue_name,
                &config.exchange_name,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind notification queue: {}", e))?;

        info!(
            exchange = %config.exchange_name,
            queue = %config.queue_name,
            routing_key = %config.routing_key,
            "RabbitMQ publisher ready"
        );

        Ok(Self {
            connection,
            channel,
            exchange_name: config.exchange_name.clone(),
            routing_key: config.routing_key.clone(),
            retry_config: config.retry_config(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    async fn publish_once(&self, payload: &[u8]) -> Result<(), String> {
        self.channel
            .basic_publish(
                &self.exchange_name,
                &self.routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Publisher for RabbitMqPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| DispatchError::PublishFailure(format!("serialization failed: {}", e)))?;

        retry_with_backoff(&self.retry_config, || self.publish_once(&payload))
            .await
            .map_err(DispatchError::PublishFailure)?;

        debug!(
            template_id = %message.template_id,
            channel_type = %message.channel_type,
            recipients = message.recipients.to.len(),
            "Message published"
        );

        Ok(())
    }
}
