//! AMQP broker client: consumes job envelopes and publishes status updates.
//!
//! The teacher repo speaks WebSocket, not AMQP, so this module has no direct
//! teacher counterpart; it is grounded on `original_source/worker/main.go`'s
//! `newJobQueue`/`newStatusQueue` for the exact exchange/queue/routing-key
//! topology and durability flags, rendered with `lapin` — the tokio-native
//! Rust AMQP 0.9.1 client — since nothing in the example pack talks AMQP.
//! Publish serialization follows the teacher's preference for
//! `tokio::sync::Mutex` around a single shared resource (`resource_manager.rs`).

use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::BrokerError;
use crate::protocol::{JobEnvelope, JobStatusRecord};

const JOBS_EXCHANGE: &str = "jobs_ex";
const JOBS_QUEUE: &str = "jobs_q";
const JOBS_ROUTING_KEY: &str = "jobs_rk";

const STATUS_EXCHANGE: &str = "jobs_status_ex";
const STATUS_ROUTING_KEY: &str = "jobs_status_rk";

pub struct Broker {
    consume_channel: Channel,
    publish_channel: Mutex<Channel>,
}

impl Broker {
    /// Connect, declare topology, and bind the jobs queue. Any failure here
    /// is fatal at startup per spec.md §7 — the worker cannot do anything
    /// useful without its broker.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(BrokerError::Connect)?;

        let consume_channel = connection.create_channel().await.map_err(BrokerError::Channel)?;
        let publish_channel = connection.create_channel().await.map_err(BrokerError::Channel)?;

        consume_channel
            .exchange_declare(
                JOBS_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::DeclareExchange(JOBS_EXCHANGE.to_string(), e))?;

        consume_channel
            .queue_declare(
                JOBS_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::DeclareQueue(JOBS_QUEUE.to_string(), e))?;

        consume_channel
            .queue_bind(
                JOBS_QUEUE,
                JOBS_EXCHANGE,
                JOBS_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Bind(JOBS_QUEUE.to_string(), JOBS_EXCHANGE.to_string(), e))?;

        publish_channel
            .exchange_declare(
                STATUS_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::DeclareExchange(STATUS_EXCHANGE.to_string(), e))?;

        Ok(Self {
            consume_channel,
            publish_channel: Mutex::new(publish_channel),
        })
    }

    /// Consume job envelopes, auto-acking each delivery on receipt (spec.md
    /// §6: the worker does not hold deliveries open across a job's
    /// lifetime). Malformed payloads are logged and dropped; the consumer
    /// keeps running.
    pub async fn consume_jobs(&self, mut on_job: impl FnMut(JobEnvelope)) -> Result<(), BrokerError> {
        let mut consumer = self
            .consume_channel
            .basic_consume(
                JOBS_QUEUE,
                "worker",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Consume)?;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(error = %e, "broker delivery error, continuing");
                    continue;
                }
            };

            match serde_json::from_slice::<JobEnvelope>(&delivery.data) {
                Ok(job) => on_job(job),
                Err(e) => warn!(error = %e, "dropping malformed job envelope"),
            }
        }

        Ok(())
    }

    pub async fn publish_status(&self, record: &JobStatusRecord) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(record).expect("JobStatusRecord always serializes");

        let channel = self.publish_channel.lock().await;
        channel
            .basic_publish(
                STATUS_EXCHANGE,
                STATUS_ROUTING_KEY,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await
            .map_err(BrokerError::Publish)?
            .await
            .map_err(BrokerError::Publish)?;

        Ok(())
    }
}
