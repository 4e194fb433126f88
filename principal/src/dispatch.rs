use std::sync::Arc;

use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use models::models::task::{TaskEnvelope, TaskState, SECURE_EXCHANGE, TASK_STATUS_HASH};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// AMQP delivery mode for messages that must survive a broker restart.
const PERSISTENT: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("queue error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("task backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("task codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Publishes task envelopes to hostname-scoped queues and tracks their state
/// in the shared backend.
#[derive(Clone)]
pub struct Dispatcher {
    _connection: Arc<Connection>,
    channel: Channel,
    backend: MultiplexedConnection,
}

impl Dispatcher {
    pub async fn connect(
        url: &str,
        backend: MultiplexedConnection,
    ) -> Result<Self, DispatchError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .exchange_declare(
                SECURE_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(Dispatcher {
            _connection: Arc::new(connection),
            channel,
            backend,
        })
    }

    /// Publish `envelope` to the queue named `route_key` (queue name and
    /// routing key are the same by construction) and mark the task pending.
    /// Returns the task id for polling.
    pub async fn submit(
        &self,
        route_key: &str,
        envelope: &TaskEnvelope,
    ) -> Result<String, DispatchError> {
        self.channel
            .queue_declare(
                route_key,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        self.channel
            .queue_bind(
                route_key,
                SECURE_EXCHANGE,
                route_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let payload = serde_json::to_vec(envelope)?;
        self.channel
            .basic_publish(
                SECURE_EXCHANGE,
                route_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;

        let mut backend = self.backend.clone();
        backend
            .hset::<_, _, _, ()>(
                TASK_STATUS_HASH,
                &envelope.task_id,
                serde_json::to_string(&TaskState::pending())?,
            )
            .await?;

        tracing::info!(task_id = %envelope.task_id, func = %envelope.func, queue = %route_key, "task submitted");
        Ok(envelope.task_id.clone())
    }

    /// Current state of a task, `None` when the id is unknown.
    pub async fn task_state(&self, task_id: &str) -> Result<Option<TaskState>, DispatchError> {
        let mut backend = self.backend.clone();
        let raw: Option<String> = backend.hget(TASK_STATUS_HASH, task_id).await?;
        Ok(raw.map(|data| serde_json::from_str(&data)).transpose()?)
    }
}
