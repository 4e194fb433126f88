//! containerd-facing half of the agent: typed clients over the runtime
//! socket, snapshotter discovery, image resolution, layer unpacking, OCI
//! spec construction and the pod engine itself.

pub mod api;
pub mod error;
pub mod images;
pub mod pods;
pub mod spec;
pub mod unpack;

use std::future::Future;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::OnceCell;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::runtime::api::containers::ContainersClient;
use crate::runtime::api::content::ContentClient;
use crate::runtime::api::cri::CriImageClient;
use crate::runtime::api::diff::DiffClient;
use crate::runtime::api::images::ImagesClient;
use crate::runtime::api::leases::LeasesClient;
use crate::runtime::api::snapshots::{SnapshotsClient, StatSnapshotRequest};
use crate::runtime::api::tasks::TasksClient;
use crate::runtime::error::{EngineError, ErrorKind, Stage};

/// Type URL the runtime expects around a serialized OCI spec.
pub const OCI_SPEC_TYPE_URL: &str = "types.containerd.io/opencontainers/runtime-spec/1/Spec";

/// Default runc shim.
pub const RUNC_RUNTIME: &str = "io.containerd.runc.v2";

/// Per-call deadlines. Cancellation works by dropping the bounded future,
/// which tears the HTTP/2 stream down.
pub mod deadline {
	use std::time::Duration;

	pub const IMAGE_READ: Duration = Duration::from_secs(30);
	pub const SNAPSHOT: Duration = Duration::from_secs(30);
	pub const TASK_CREATE: Duration = Duration::from_secs(15);
	pub const TASK_START: Duration = Duration::from_secs(30);
	pub const TASK_KILL: Duration = Duration::from_secs(3);
	pub const TASK_DELETE: Duration = Duration::from_secs(10);
	pub const PULL: Duration = Duration::from_secs(120);
}

/// Run one RPC future under a deadline; elapsing maps to a
/// DEADLINE_EXCEEDED status so call sites handle one error shape.
pub(crate) async fn rpc<T, F>(limit: Duration, call: F) -> Result<tonic::Response<T>, tonic::Status>
where
	F: Future<Output = Result<tonic::Response<T>, tonic::Status>>,
{
	match tokio::time::timeout(limit, call).await {
		Ok(outcome) => outcome,
		Err(_) => Err(tonic::Status::deadline_exceeded(format!(
			"client-side deadline of {limit:?} elapsed"
		))),
	}
}

/// Injects the containerd-namespace header into every call.
#[derive(Clone)]
pub struct WithNamespace {
	value: MetadataValue<Ascii>,
}

impl WithNamespace {
	pub fn new(namespace: &str) -> Result<Self, EngineError> {
		let value = MetadataValue::try_from(namespace).map_err(|_| {
			EngineError::new(
				ErrorKind::Internal,
				Stage::Create,
				format!("namespace {namespace:?} is not a valid metadata value"),
			)
		})?;
		Ok(WithNamespace { value })
	}
}

impl Interceptor for WithNamespace {
	fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
		request
			.metadata_mut()
			.insert("containerd-namespace", self.value.clone());
		Ok(request)
	}
}

pub type RuntimeChannel = InterceptedService<Channel, WithNamespace>;

/// One bundle of typed clients over a single runtime connection, scoped to
/// one containerd namespace.
#[derive(Clone)]
pub struct RuntimeClient {
	pub images: ImagesClient<RuntimeChannel>,
	pub content: ContentClient<RuntimeChannel>,
	pub snapshots: SnapshotsClient<RuntimeChannel>,
	pub diff: DiffClient<RuntimeChannel>,
	pub leases: LeasesClient<RuntimeChannel>,
	pub containers: ContainersClient<RuntimeChannel>,
	pub tasks: TasksClient<RuntimeChannel>,
	/// CRI image service shares the socket but takes no namespace header.
	pub cri_images: CriImageClient<Channel>,
	pub namespace: String,
}

impl RuntimeClient {
	pub async fn connect(socket: &str, namespace: &str) -> Result<Self, EngineError> {
		let path = normalize_unix_target(socket);
		let channel = Endpoint::try_from("http://[::]:50051")
			.expect("static endpoint URI is valid")
			.connect_with_connector(service_fn(move |_: Uri| {
				UnixStream::connect(path.clone())
			}))
			.await
			.map_err(|err| {
				EngineError::new(
					ErrorKind::RuntimeRpc,
					Stage::Create,
					format!("cannot reach runtime socket {socket}: {err}"),
				)
				.with_hint("is containerd running?")
			})?;

		let ns = WithNamespace::new(namespace)?;
		Ok(RuntimeClient {
			images: ImagesClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			content: ContentClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			snapshots: SnapshotsClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			diff: DiffClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			leases: LeasesClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			containers: ContainersClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			tasks: TasksClient::new(InterceptedService::new(channel.clone(), ns.clone())),
			cri_images: CriImageClient::new(channel),
			namespace: namespace.to_string(),
		})
	}
}

/// Accepts `unix:///run/...`, the rarer `unix://run/...`, or a bare
/// filesystem path, and returns the socket path the connector dials.
pub fn normalize_unix_target(socket: &str) -> String {
	if let Some(rest) = socket.strip_prefix("unix://") {
		if rest.starts_with('/') {
			rest.to_string()
		} else {
			format!("/{rest}")
		}
	} else if !socket.starts_with('/') {
		format!("/{socket}")
	} else {
		socket.to_string()
	}
}

/// Snapshotter name, discovered once per process.
static SNAPSHOTTER: OnceCell<String> = OnceCell::const_new();

const SNAPSHOTTER_CANDIDATES: &[&str] = &["overlayfs", "native", "btrfs", "zfs", "stargz"];

/// Probe the candidate list and cache the first snapshotter that answers.
/// A configured name is tried first; the cache lives for the process.
pub async fn resolve_snapshotter(
	client: &RuntimeClient,
	configured: &str,
) -> Result<String, EngineError> {
	let snapshots = client.snapshots.clone();
	let configured = configured.to_string();
	SNAPSHOTTER
		.get_or_try_init(|| async move {
			let mut candidates: Vec<&str> = Vec::new();
			if !configured.is_empty() {
				candidates.push(configured.as_str());
			}
			for name in SNAPSHOTTER_CANDIDATES.iter().copied() {
				if !candidates.contains(&name) {
					candidates.push(name);
				}
			}

			for name in &candidates {
				let mut probe = snapshots.clone();
				let outcome = rpc(
					deadline::SNAPSHOT,
					probe.stat(StatSnapshotRequest {
						snapshotter: name.to_string(),
						key: "snapshotter-probe".to_string(),
					}),
				)
				.await;
				match outcome {
					// The probe key never exists; NOT_FOUND proves the
					// snapshotter itself answered.
					Ok(_) => return Ok(name.to_string()),
					Err(status) if status.code() == tonic::Code::NotFound => {
						return Ok(name.to_string())
					}
					Err(status) if status.code() == tonic::Code::Unavailable => {
						return Err(EngineError::from_status(Stage::Snapshot, status))
					}
					Err(status) => {
						tracing::debug!(
							snapshotter = *name,
							code = ?status.code(),
							"snapshotter probe rejected"
						);
					}
				}
			}
			Err(EngineError::new(
				ErrorKind::Internal,
				Stage::Snapshot,
				format!("no usable snapshotter among {candidates:?}"),
			))
		})
		.await
		.map(Clone::clone)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unix_targets_normalize() {
		assert_eq!(
			normalize_unix_target("unix:///run/containerd/containerd.sock"),
			"/run/containerd/containerd.sock"
		);
		assert_eq!(
			normalize_unix_target("unix://run/containerd/containerd.sock"),
			"/run/containerd/containerd.sock"
		);
		assert_eq!(
			normalize_unix_target("/run/containerd/containerd.sock"),
			"/run/containerd/containerd.sock"
		);
		assert_eq!(
			normalize_unix_target("run/containerd/containerd.sock"),
			"/run/containerd/containerd.sock"
		);
	}
}
