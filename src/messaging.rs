//! Message broker plumbing: request deliveries, their settlement and failure publication.
//!
//! Requests are consumed from a RabbitMQ queue named after the transform request, one unsettled
//! delivery at a time. Each [Delivery] must be settled exactly once; [Delivery::settle] consumes
//! the delivery so a second settlement does not compile.

use crate::error::TransformerError;
use crate::models::ErrorRecord;

use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio_stream::{Stream, StreamExt};

/// Exchange to which failed requests are published.
pub const FAILURE_EXCHANGE: &str = "transformation_failures";

/// Consumer tag and connection name presented to the broker.
const CLIENT_NAME: &str = "ditau-transformer";

/// Routing key for failures of a transform request.
pub fn failure_routing_key(request_id: &str) -> String {
    format!("{}_errors", request_id)
}

/// Publishes records of failed requests.
#[async_trait]
pub trait FailurePublisher: Send + Sync {
    async fn publish_failure(&self, record: &ErrorRecord) -> Result<(), TransformerError>;
}

/// Settles one inbound message with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positively acknowledge the message.
    async fn ack(&self) -> Result<(), TransformerError>;
    /// Negatively acknowledge the message, optionally returning it to the queue.
    async fn nack(&self, requeue: bool) -> Result<(), TransformerError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), TransformerError> {
        Acker::ack(self, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), TransformerError> {
        let options = BasicNackOptions {
            requeue,
            ..Default::default()
        };
        Acker::nack(self, options).await?;
        Ok(())
    }
}

/// How a delivery is settled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

/// An inbound request message awaiting settlement.
pub struct Delivery {
    /// Message body
    pub body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Return a new Delivery.
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Delivery { body, acker }
    }

    /// Settle the delivery with the broker.
    pub async fn settle(self, settlement: Settlement) -> Result<(), TransformerError> {
        match settlement {
            Settlement::Ack => self.acker.ack().await,
            Settlement::Nack { requeue } => self.acker.nack(requeue).await,
        }
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Delivery::new(delivery.data, Box::new(delivery.acker))
    }
}

/// RabbitMQ connection consuming one request queue.
pub struct RabbitMq {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl RabbitMq {
    /// Connect to the broker and limit the channel to one unsettled delivery.
    ///
    /// # Arguments
    ///
    /// * `uri`: AMQP URI of the broker
    /// * `queue`: Name of the request queue
    pub async fn connect(uri: &str, queue: &str) -> Result<Self, TransformerError> {
        let connection = Connection::connect(
            uri,
            ConnectionProperties::default().with_connection_name(CLIENT_NAME.into()),
        )
        .await?;
        let channel = connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        tracing::info!("Connected to message broker, consuming queue {}", queue);
        Ok(RabbitMq {
            connection,
            channel,
            queue: queue.to_string(),
        })
    }

    /// Start consuming the request queue.
    ///
    /// Returns a stream of deliveries in arrival order. Broker errors are yielded as
    /// [TransformerError::Queue].
    pub async fn deliveries(
        &self,
    ) -> Result<impl Stream<Item = Result<Delivery, TransformerError>> + Unpin, TransformerError>
    {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue,
                CLIENT_NAME,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer.map(|delivery| Ok(Delivery::from(delivery?))))
    }

    /// Close the channel and the connection.
    pub async fn close(&self) -> Result<(), TransformerError> {
        self.channel.close(200, "shutting down").await?;
        self.connection.close(200, "shutting down").await?;
        Ok(())
    }
}

#[async_trait]
impl FailurePublisher for RabbitMq {
    async fn publish_failure(&self, record: &ErrorRecord) -> Result<(), TransformerError> {
        let payload = serde_json::to_vec(record).map_err(|source| TransformerError::Serialise {
            record: "error record",
            source,
        })?;
        let routing_key = failure_routing_key(&record.request_id);
        self.channel
            .basic_publish(
                FAILURE_EXCHANGE,
                &routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        tracing::info!(
            "Published failure to {} with routing key {}",
            FAILURE_EXCHANGE,
            routing_key
        );
        Ok(())
    }
}
