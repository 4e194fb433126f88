//! Single-node task consumer. Binds the queue derived from the local
//! hostname, processes envelopes in receive order and writes results to the
//! shared task backend.

use anyhow::Context;
use futures_util::StreamExt;
use lapin::options::{
	BasicAckOptions, BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions,
	QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use models::models::pod::ContainerSpec;
use models::models::resources::ResourceSpec;
use models::models::routing::RouteKey;
use models::models::settings::Settings;
use models::models::task::{func, TaskEnvelope, TaskState, SECURE_EXCHANGE, TASK_STATUS_HASH};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::{json, Map, Value};

use crate::collectors;
use crate::runtime::pods::PodEngine;

/// Pause sandbox budget when a request does not specify one.
fn default_pause_resources() -> ResourceSpec {
	ResourceSpec::new(100, 64 * 1024 * 1024)
}

pub struct Agent {
	settings: Settings,
	queue: String,
	_connection: Connection,
	channel: Channel,
	backend: MultiplexedConnection,
}

impl Agent {
	/// Connect the queue and the task backend, declaring this host's queue
	/// binding on the shared direct exchange.
	pub async fn connect(settings: Settings) -> anyhow::Result<Self> {
		let router = RouteKey::new(&settings.encryption.key)?;
		let host = hostname::get()
			.context("cannot read local hostname")?
			.into_string()
			.map_err(|raw| anyhow::anyhow!("hostname {raw:?} is not UTF-8"))?;
		let queue = router.route_key(&host);

		let connection =
			Connection::connect(&settings.amqp.url, ConnectionProperties::default())
				.await
				.context("cannot reach the task queue broker")?;
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
		channel
			.queue_declare(
				&queue,
				QueueDeclareOptions {
					durable: true,
					..Default::default()
				},
				FieldTable::default(),
			)
			.await?;
		channel
			.queue_bind(
				&queue,
				SECURE_EXCHANGE,
				&queue,
				QueueBindOptions::default(),
				FieldTable::default(),
			)
			.await?;

		let backend = redis::Client::open(settings.redis.url.as_str())?
			.get_multiplexed_tokio_connection()
			.await
			.context("cannot reach the task backend")?;

		tracing::info!(host = %host, queue = %queue, "worker agent bound");
		Ok(Agent {
			settings,
			queue,
			_connection: connection,
			channel,
			backend,
		})
	}

	/// Consume until the broker goes away. Envelopes are processed one at a
	/// time so per-queue ordering holds.
	pub async fn run(&self) -> anyhow::Result<()> {
		let mut consumer = self
			.channel
			.basic_consume(
				&self.queue,
				"worker-agent",
				BasicConsumeOptions::default(),
				FieldTable::default(),
			)
			.await?;

		while let Some(delivery) = consumer.next().await {
			let delivery = delivery?;
			match serde_json::from_slice::<TaskEnvelope>(&delivery.data) {
				Ok(envelope) => self.handle(envelope).await,
				Err(err) => {
					tracing::warn!("dropping undecodable task envelope: {err}");
				}
			}
			delivery.ack(BasicAckOptions::default()).await?;
		}
		Ok(())
	}

	async fn handle(&self, envelope: TaskEnvelope) {
		let task_id = envelope.task_id.clone();
		tracing::info!(task_id = %task_id, func = %envelope.func, "task received");
		self.record_state(&task_id, TaskState::started()).await;

		let state = match envelope.func.as_str() {
			func::CREATE_PODS => self.create_pods(&envelope).await,
			func::GET_WORKER_NODE_INFO => {
				match tokio::task::spawn_blocking(collectors::system_info).await {
					Ok(info) => TaskState::success(json!(info)),
					Err(err) => TaskState::failure(err.to_string(), None),
				}
			}
			func::GET_USAGE => match tokio::task::spawn_blocking(collectors::usage).await {
				Ok(usage) => TaskState::success(json!(usage)),
				Err(err) => TaskState::failure(err.to_string(), None),
			},
			func::GET_HOST_IP => match collectors::host_ip() {
				Ok(ip) => TaskState::success(json!(ip)),
				Err(err) => TaskState::failure(err.to_string(), None),
			},
			other => TaskState::failure(format!("unknown task function: {other}"), None),
		};

		self.record_state(&task_id, state).await;
	}

	/// Create a pause pod plus its application containers from a task
	/// envelope: args are `[containers, namespace]`, knobs ride in kwargs.
	async fn create_pods(&self, envelope: &TaskEnvelope) -> TaskState {
		let containers: Vec<ContainerSpec> = match envelope
			.args
			.first()
			.map(|value| serde_json::from_value(value.clone()))
		{
			Some(Ok(containers)) => containers,
			Some(Err(err)) => {
				return TaskState::failure(format!("bad containers argument: {err}"), None)
			}
			None => return TaskState::failure("missing containers argument".to_string(), None),
		};
		let namespace = envelope
			.args
			.get(1)
			.and_then(Value::as_str)
			.unwrap_or(&self.settings.containerd.namespace)
			.to_string();

		let kwargs = &envelope.kwargs;
		let cni_network = string_kwarg(kwargs, "cni_network")
			.unwrap_or_else(|| self.settings.cni.network.clone());
		let cni_ifname = string_kwarg(kwargs, "cni_ifname")
			.unwrap_or_else(|| self.settings.cni.ifname.clone());
		let pause_image = string_kwarg(kwargs, "pause_image")
			.unwrap_or_else(|| self.settings.containerd.pause_image.clone());
		let shared_volume = string_kwarg(kwargs, "shared_volume");
		let pod_name = string_kwarg(kwargs, "pod_name").unwrap_or_else(|| {
			let prefix = envelope.task_id.len().min(8);
			format!("pod-{}", &envelope.task_id[..prefix])
		});

		let engine = match PodEngine::connect(&self.settings, &namespace).await {
			Ok(engine) => engine,
			Err(err) => return TaskState::failure(err.to_string(), None),
		};

		let pod = match engine
			.create_pod(
				&pod_name,
				&pause_image,
				&default_pause_resources(),
				&cni_network,
				&cni_ifname,
				shared_volume.as_deref(),
			)
			.await
		{
			Ok(pod) => pod,
			Err(err) => return TaskState::failure(err.to_string(), None),
		};

		let (apps, failure) = engine
			.add_containers(&pod, &containers, shared_volume.as_deref())
			.await;

		let result = json!({
			"namespace": namespace,
			"cni": { "network": cni_network, "ifname": cni_ifname },
			"pod": pod,
			"apps": apps,
		});
		match failure {
			None => TaskState::success(result),
			Some((name, err)) => TaskState::failure(
				format!("container {name} failed: {err}"),
				Some(result),
			),
		}
	}

	async fn record_state(&self, task_id: &str, state: TaskState) {
		let payload = match serde_json::to_string(&state) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::error!(task_id = %task_id, "cannot encode task state: {err}");
				return;
			}
		};
		let mut backend = self.backend.clone();
		if let Err(err) = backend
			.hset::<_, _, _, ()>(TASK_STATUS_HASH, task_id, payload)
			.await
		{
			tracing::error!(task_id = %task_id, "cannot record task state: {err}");
		}
	}
}

fn string_kwarg(kwargs: &Map<String, Value>, key: &str) -> Option<String> {
	kwargs
		.get(key)
		.and_then(Value::as_str)
		.map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn string_kwargs_ignore_non_strings() {
		let mut kwargs = Map::new();
		kwargs.insert("cni_network".to_string(), json!("calico"));
		kwargs.insert("count".to_string(), json!(3));
		assert_eq!(string_kwarg(&kwargs, "cni_network").as_deref(), Some("calico"));
		assert_eq!(string_kwarg(&kwargs, "count"), None);
		assert_eq!(string_kwarg(&kwargs, "absent"), None);
	}

	#[test]
	fn create_pods_envelope_shape_decodes() {
		let envelope = TaskEnvelope::new(
			func::CREATE_PODS,
			vec![
				json!([{ "name": "web", "image": "nginx" }]),
				json!("team-a"),
			],
			Map::new(),
		);
		let containers: Vec<ContainerSpec> =
			serde_json::from_value(envelope.args[0].clone()).unwrap();
		assert_eq!(containers.len(), 1);
		assert_eq!(containers[0].image, "nginx");
		assert_eq!(envelope.args[1].as_str(), Some("team-a"));
	}
}
