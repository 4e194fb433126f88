//! The pod engine: composes image resolution, snapshot unpacking, spec
//! construction and CNI attachment into pod create/join/delete operations
//! against one containerd namespace.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use models::models::pod::{
	CniAttachment, ContainerRecord, ContainerSpec, NamespacePaths, PauseProcess, PodRecord,
};
use models::models::resources::ResourceSpec;
use models::models::settings::Settings;

use crate::cni::CniInvoker;
use crate::runtime::api::containers::{
	Container, CreateContainerRequest, DeleteContainerRequest, Runtime,
};
use crate::runtime::api::cri::{ImageSpec, PullImageRequest};
use crate::runtime::api::tasks::{
	CreateTaskRequest, DeleteTaskRequest, GetRequest, KillRequest, StartRequest, TasksClient,
};
use crate::runtime::api::types::{Descriptor, Mount, ProcessStatus};
use crate::runtime::error::{EngineError, ErrorKind, Stage};
use crate::runtime::images::{ImageResolver, ResolvedImage, RuntimeConfig};
use crate::runtime::unpack::SnapshotManager;
use crate::runtime::{
	deadline, resolve_snapshotter, rpc, spec, RuntimeChannel, RuntimeClient, RUNC_RUNTIME,
};

/// Pull side channel re-check: five probes, 300ms apart.
const BLOB_RECHECK_ATTEMPTS: u32 = 5;
const BLOB_RECHECK_DELAY: Duration = Duration::from_millis(300);

const SIGTERM: u32 = 15;
const SIGKILL: u32 = 9;

/// How often the stop protocol polls task state while waiting for exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Keeps an app container alive when its image defines no command.
const APP_FALLBACK_ARGS: &[&str] = &["/bin/sh", "-c", "trap : TERM INT; sleep infinity & wait"];
const PAUSE_FALLBACK_ARGS: &[&str] = &["/pause"];

pub struct PodEngine {
	client: RuntimeClient,
	resolver: ImageResolver,
	snapshots: SnapshotManager,
	cni: CniInvoker,
	rollback_on_cni_failure: bool,
}

impl PodEngine {
	pub async fn connect(settings: &Settings, namespace: &str) -> Result<Self, EngineError> {
		let client = RuntimeClient::connect(&settings.containerd.socket, namespace).await?;
		let snapshotter = resolve_snapshotter(&client, &settings.containerd.snapshotter).await?;
		tracing::debug!(namespace, snapshotter = %snapshotter, "pod engine connected");
		Ok(PodEngine {
			resolver: ImageResolver::new(client.clone()),
			snapshots: SnapshotManager::new(client.clone(), snapshotter),
			cni: CniInvoker::new(&settings.cni.bin_dir, &settings.cni.conf_dir),
			rollback_on_cni_failure: settings.cni.rollback_on_add_failure,
			client,
		})
	}

	/// Resolve an image, pulling it over the CRI side channel when the
	/// native store lacks it, then unpack its layers. Idempotent after the
	/// first success.
	pub async fn ensure_unpacked(&self, reference: &str) -> Result<ResolvedImage, EngineError> {
		let resolved = match self.resolver.resolve(reference).await {
			Ok(resolved) => match self.first_missing_blob(&resolved).await? {
				None => resolved,
				Some(missing) => {
					tracing::info!(reference, missing = %missing, "blobs absent, pulling via CRI");
					self.pull_and_reresolve(reference).await?
				}
			},
			Err(err) if err.kind == ErrorKind::NotFound => {
				tracing::info!(reference, "image absent, pulling via CRI");
				self.pull_and_reresolve(reference).await?
			}
			Err(err) => return Err(err),
		};

		let layers: Vec<Descriptor> = resolved.manifest.layers.iter().map(Into::into).collect();
		self.snapshots.ensure_unpacked(&layers, &resolved.chain).await?;
		Ok(resolved)
	}

	async fn first_missing_blob(
		&self,
		resolved: &ResolvedImage,
	) -> Result<Option<String>, EngineError> {
		if !self.resolver.blob_exists(&resolved.manifest.config.digest).await? {
			return Ok(Some(resolved.manifest.config.digest.clone()));
		}
		for layer in &resolved.manifest.layers {
			if !self.resolver.blob_exists(&layer.digest).await? {
				return Ok(Some(layer.digest.clone()));
			}
		}
		Ok(None)
	}

	async fn pull_and_reresolve(&self, reference: &str) -> Result<ResolvedImage, EngineError> {
		let mut cri = self.client.cri_images.clone();
		let pulled = rpc(
			deadline::PULL,
			cri.pull_image(PullImageRequest {
				image: Some(ImageSpec {
					image: reference.to_string(),
					annotations: Default::default(),
				}),
				auth: None,
			}),
		)
		.await
		.map_err(|status| {
			EngineError::from_status(Stage::Unpack, status)
				.with_hint("is the CRI plugin enabled on this containerd?")
		})?
		.into_inner()
		.image_ref;

		let mut first_missing = None;
		for attempt in 0..BLOB_RECHECK_ATTEMPTS {
			if attempt > 0 {
				tokio::time::sleep(BLOB_RECHECK_DELAY).await;
			}
			let lookup = if pulled.is_empty() {
				reference
			} else {
				pulled.as_str()
			};
			let resolved = match self.resolver.resolve(lookup).await {
				Ok(resolved) => Ok(resolved),
				Err(err) if err.kind == ErrorKind::NotFound => {
					self.resolver.resolve(reference).await
				}
				Err(err) => Err(err),
			};
			match resolved {
				Ok(resolved) => match self.first_missing_blob(&resolved).await? {
					None => return Ok(resolved),
					Some(digest) => first_missing = Some(digest),
				},
				Err(err) if err.kind == ErrorKind::NotFound => continue,
				Err(err) => return Err(err),
			}
		}

		let digest = first_missing.unwrap_or_else(|| "<image record>".to_string());
		Err(EngineError::new(
			ErrorKind::ContentMissing,
			Stage::Unpack,
			format!("blobs for {reference} still missing after pull; first missing: {digest}"),
		)
		.with_hint("check registry connectivity and the containerd content store"))
	}

	/// Create the pause sandbox for a new pod and attach it to the CNI
	/// network.
	pub async fn create_pod(
		&self,
		name: &str,
		pause_image: &str,
		resources: &ResourceSpec,
		cni_network: &str,
		cni_ifname: &str,
		shared_volume: Option<&str>,
	) -> Result<PodRecord, EngineError> {
		let image = self.ensure_unpacked(pause_image).await?;
		let parent = image.chain.last().ok_or_else(|| {
			EngineError::new(
				ErrorKind::ImageInvalid,
				Stage::Unpack,
				format!("{pause_image} has an empty layer chain"),
			)
		})?;

		let (mounts, snapshot_key) = self
			.snapshots
			.prepare_rw_snapshot(parent, &format!("{name}-pause-rootfs"))
			.await?;

		let args = derive_args(image.config.config.as_ref())
			.unwrap_or_else(|| to_args(PAUSE_FALLBACK_ARGS));
		let any_spec = spec::build(spec::SpecParams {
			args,
			env: Vec::new(),
			hostname: Some(name.to_string()),
			cwd: "/".to_string(),
			namespaces: spec::sandbox_namespaces(),
			resources: Some(resources),
			root_readonly: false,
		})?;

		let cid = name.to_string();
		if let Err(err) = self
			.create_container(&cid, &image.reference, &snapshot_key, any_spec)
			.await
		{
			self.snapshots.remove_best_effort(&snapshot_key).await;
			return Err(err);
		}

		let pid = match self.create_and_start_task(&cid, &mounts, shared_volume).await {
			Ok(pid) => pid,
			Err(err) => {
				self.delete_container_best_effort(&cid).await;
				self.snapshots.remove_best_effort(&snapshot_key).await;
				return Err(err);
			}
		};

		let ns_paths = NamespacePaths::for_pid(pid);
		let record = PodRecord {
			name: name.to_string(),
			pause: PauseProcess { cid: cid.clone(), pid },
			ns_paths: ns_paths.clone(),
			cni: CniAttachment {
				network: cni_network.to_string(),
				ifname: cni_ifname.to_string(),
			},
			snapshot_key: snapshot_key.clone(),
		};

		match self.cni.add(cni_network, &cid, &ns_paths.net, cni_ifname).await {
			Ok(result) => {
				tracing::info!(pod = name, network = cni_network, ?result, "CNI attached");
				Ok(record)
			}
			Err(err) => {
				let kind = if err.is_timeout() {
					ErrorKind::CniTimeout
				} else {
					ErrorKind::CniFailed
				};
				tracing::error!(pod = name, network = cni_network, "CNI ADD failed: {err}");
				if self.rollback_on_cni_failure {
					self.teardown_pause(&record).await;
					Err(EngineError::new(kind, Stage::Cni, err.to_string()))
				} else {
					Err(EngineError::new(kind, Stage::Cni, err.to_string()).with_hint(
						format!("pause sandbox {cid} is left running without networking; delete the pod to release it"),
					))
				}
			}
		}
	}

	/// Join one application container to an existing pod.
	pub async fn add_container(
		&self,
		pod: &PodRecord,
		container: &ContainerSpec,
		shared_volume: Option<&str>,
	) -> Result<ContainerRecord, EngineError> {
		let image = self.ensure_unpacked(&container.image).await?;
		let parent = image.chain.last().ok_or_else(|| {
			EngineError::new(
				ErrorKind::ImageInvalid,
				Stage::Unpack,
				format!("{} has an empty layer chain", container.image),
			)
		})?;

		let (mounts, snapshot_key) = self
			.snapshots
			.prepare_rw_snapshot(parent, &format!("{}-{}-rootfs", pod.name, container.name))
			.await?;

		let args = container
			.args
			.clone()
			.filter(|args| !args.is_empty())
			.or_else(|| derive_args(image.config.config.as_ref()))
			.unwrap_or_else(|| to_args(APP_FALLBACK_ARGS));

		let mut env: Vec<String> = container
			.env
			.iter()
			.map(|(key, value)| format!("{key}={value}"))
			.collect();
		env.sort();

		let cwd = image
			.config
			.config
			.as_ref()
			.and_then(|config| config.working_dir.clone())
			.filter(|dir| !dir.is_empty())
			.unwrap_or_else(|| "/".to_string());

		let any_spec = spec::build(spec::SpecParams {
			args,
			env,
			hostname: None,
			cwd,
			namespaces: spec::joined_namespaces(&pod.ns_paths),
			resources: container.resources.as_ref(),
			root_readonly: false,
		})?;

		let cid = format!("{}-{}", pod.name, container.name);
		if let Err(err) = self
			.create_container(&cid, &image.reference, &snapshot_key, any_spec)
			.await
		{
			self.snapshots.remove_best_effort(&snapshot_key).await;
			return Err(err);
		}

		match self.create_and_start_task(&cid, &mounts, shared_volume).await {
			Ok(pid) => Ok(ContainerRecord {
				cid,
				pid,
				snapshot_key,
				pod_ref: pod.name.clone(),
			}),
			Err(err) => {
				self.delete_container_best_effort(&cid).await;
				self.snapshots.remove_best_effort(&snapshot_key).await;
				Err(err)
			}
		}
	}

	/// Apply `add_container` sequentially. On the first failure the
	/// completed records are returned alongside the error; rollback is the
	/// caller's call.
	pub async fn add_containers(
		&self,
		pod: &PodRecord,
		containers: &[ContainerSpec],
		shared_volume: Option<&str>,
	) -> (
		HashMap<String, ContainerRecord>,
		Option<(String, EngineError)>,
	) {
		let mut records = HashMap::new();
		for container in containers {
			match self.add_container(pod, container, shared_volume).await {
				Ok(record) => {
					records.insert(container.name.clone(), record);
				}
				Err(err) => {
					return (records, Some((container.name.clone(), err)));
				}
			}
		}
		(records, None)
	}

	/// Tear a pod down: apps first, then the CNI attachment, then the pause
	/// sandbox and its snapshot.
	pub async fn delete_pod(
		&self,
		pod: &PodRecord,
		apps: &[ContainerRecord],
	) -> Result<(), EngineError> {
		for app in apps {
			if let Err(err) = self.stop_and_delete_task(&app.cid).await {
				tracing::warn!(cid = %app.cid, "app task teardown incomplete: {err}");
			}
			self.delete_container_best_effort(&app.cid).await;
			self.snapshots.remove_best_effort(&app.snapshot_key).await;
		}

		// DEL is advisory; plugins accepting an empty netns get one when the
		// namespace file is already gone.
		let netns = if Path::new(&pod.ns_paths.net).exists() {
			pod.ns_paths.net.clone()
		} else {
			String::new()
		};
		if let Err(err) = self
			.cni
			.del(&pod.cni.network, &pod.pause.cid, &netns, &pod.cni.ifname)
			.await
		{
			tracing::warn!(pod = %pod.name, "CNI DEL failed (ignored): {err}");
		}

		self.stop_and_delete_task(&pod.pause.cid).await?;
		self.delete_container_best_effort(&pod.pause.cid).await;
		self.snapshots.remove(&pod.snapshot_key).await?;
		Ok(())
	}

	async fn teardown_pause(&self, record: &PodRecord) {
		if let Err(err) = self.stop_and_delete_task(&record.pause.cid).await {
			tracing::warn!(cid = %record.pause.cid, "pause teardown incomplete: {err}");
		}
		self.delete_container_best_effort(&record.pause.cid).await;
		self.snapshots.remove_best_effort(&record.snapshot_key).await;
	}

	async fn create_container(
		&self,
		cid: &str,
		image_ref: &str,
		snapshot_key: &str,
		any_spec: prost_types::Any,
	) -> Result<(), EngineError> {
		let mut containers = self.client.containers.clone();
		let request = CreateContainerRequest {
			container: Some(Container {
				id: cid.to_string(),
				labels: Default::default(),
				image: image_ref.to_string(),
				runtime: Some(Runtime {
					name: RUNC_RUNTIME.to_string(),
					options: None,
				}),
				spec: Some(any_spec),
				snapshotter: self.snapshots.snapshotter().to_string(),
				snapshot_key: snapshot_key.to_string(),
			}),
		};
		match rpc(deadline::TASK_CREATE, containers.create(request)).await {
			Ok(_) => Ok(()),
			Err(status) if status.code() == tonic::Code::AlreadyExists => Err(EngineError::new(
				ErrorKind::RuntimeRpc,
				Stage::Create,
				format!("container id {cid} already exists in namespace {}", self.client.namespace),
			)),
			Err(status) => Err(EngineError::from_status(Stage::Create, status)),
		}
	}

	async fn create_and_start_task(
		&self,
		cid: &str,
		rootfs: &[Mount],
		shared_volume: Option<&str>,
	) -> Result<u32, EngineError> {
		let mut tasks = self.client.tasks.clone();

		let mut mounts = rootfs.to_vec();
		if let Some(volume) = shared_volume {
			mounts.push(Mount {
				fs_type: "bind".to_string(),
				source: volume.to_string(),
				target: volume.to_string(),
				options: vec!["rbind".to_string(), "rw".to_string()],
			});
		}

		let created = rpc(
			deadline::TASK_CREATE,
			tasks.create(CreateTaskRequest {
				container_id: cid.to_string(),
				rootfs: mounts,
				stdin: String::new(),
				stdout: String::new(),
				stderr: String::new(),
				terminal: false,
				checkpoint: None,
				options: None,
			}),
		)
		.await
		.map_err(|status| EngineError::from_status(Stage::Create, status))?
		.into_inner();

		rpc(
			deadline::TASK_START,
			tasks.start(StartRequest {
				container_id: cid.to_string(),
				exec_id: String::new(),
			}),
		)
		.await
		.map_err(|status| EngineError::from_status(Stage::Start, status))?;

		Ok(created.pid)
	}

	/// Stop protocol: SIGTERM, wait for the task to stop within the delete
	/// deadline, then SIGKILL and a final delete attempt.
	async fn stop_and_delete_task(&self, cid: &str) -> Result<(), EngineError> {
		let mut tasks = self.client.tasks.clone();

		match rpc(
			deadline::TASK_KILL,
			tasks.kill(KillRequest {
				container_id: cid.to_string(),
				exec_id: String::new(),
				signal: SIGTERM,
				all: true,
			}),
		)
		.await
		{
			Ok(_) => {}
			// No task, or already stopped: delete still needs to run.
			Err(status) if status.code() == tonic::Code::NotFound => return Ok(()),
			Err(status) if status.code() == tonic::Code::FailedPrecondition => {}
			Err(status) => return Err(EngineError::from_status(Stage::Create, status)),
		}

		let mut escalated = false;
		if !self.wait_for_stopped(cid, deadline::TASK_DELETE).await {
			tracing::debug!(cid, "task ignored SIGTERM, escalating to SIGKILL");
			self.kill_best_effort(&mut tasks, cid, SIGKILL).await;
			escalated = true;
		}

		match rpc(
			deadline::TASK_DELETE,
			tasks.delete(DeleteTaskRequest {
				container_id: cid.to_string(),
			}),
		)
		.await
		{
			Ok(_) => return Ok(()),
			Err(status) if status.code() == tonic::Code::NotFound => return Ok(()),
			Err(status) if !escalated => {
				tracing::debug!(cid, code = ?status.code(), "task delete failed, escalating to SIGKILL");
			}
			Err(status) => return Err(EngineError::from_status(Stage::Create, status)),
		}

		self.kill_best_effort(&mut tasks, cid, SIGKILL).await;
		match rpc(
			deadline::TASK_DELETE,
			tasks.delete(DeleteTaskRequest {
				container_id: cid.to_string(),
			}),
		)
		.await
		{
			Ok(_) => Ok(()),
			Err(status) if status.code() == tonic::Code::NotFound => Ok(()),
			Err(status) => Err(EngineError::from_status(Stage::Create, status)),
		}
	}

	/// Poll task state until it reports stopped (or is gone), bounded by
	/// `limit`.
	async fn wait_for_stopped(&self, cid: &str, limit: Duration) -> bool {
		let mut tasks = self.client.tasks.clone();
		let wait_until = tokio::time::Instant::now() + limit;
		loop {
			match rpc(
				deadline::TASK_KILL,
				tasks.get(GetRequest {
					container_id: cid.to_string(),
					exec_id: String::new(),
				}),
			)
			.await
			{
				Ok(response) => {
					let stopped = response
						.into_inner()
						.process
						.map(|process| process.status == ProcessStatus::Stopped as i32)
						.unwrap_or(true);
					if stopped {
						return true;
					}
				}
				Err(status) if status.code() == tonic::Code::NotFound => return true,
				Err(status) => {
					tracing::debug!(cid, code = ?status.code(), "task state poll failed");
					return false;
				}
			}
			if tokio::time::Instant::now() + STOP_POLL_INTERVAL > wait_until {
				return false;
			}
			tokio::time::sleep(STOP_POLL_INTERVAL).await;
		}
	}

	async fn kill_best_effort(
		&self,
		tasks: &mut TasksClient<RuntimeChannel>,
		cid: &str,
		signal: u32,
	) {
		if let Err(status) = rpc(
			deadline::TASK_KILL,
			tasks.kill(KillRequest {
				container_id: cid.to_string(),
				exec_id: String::new(),
				signal,
				all: true,
			}),
		)
		.await
		{
			if status.code() != tonic::Code::NotFound {
				tracing::warn!(cid, signal, "kill failed: {}", status.message());
			}
		}
	}

	async fn delete_container_best_effort(&self, cid: &str) {
		let mut containers = self.client.containers.clone();
		match rpc(
			deadline::TASK_DELETE,
			containers.delete(DeleteContainerRequest {
				id: cid.to_string(),
			}),
		)
		.await
		{
			Ok(_) => {}
			Err(status) if status.code() == tonic::Code::NotFound => {}
			Err(status) => {
				tracing::warn!(cid, "container delete failed: {}", status.message());
			}
		}
	}
}

/// Entrypoint ++ Cmd from the image config, when either is present.
fn derive_args(config: Option<&RuntimeConfig>) -> Option<Vec<String>> {
	let config = config?;
	let mut args = Vec::new();
	if let Some(entrypoint) = &config.entrypoint {
		args.extend(entrypoint.iter().cloned());
	}
	if let Some(cmd) = &config.cmd {
		args.extend(cmd.iter().cloned());
	}
	if args.is_empty() {
		None
	} else {
		Some(args)
	}
}

fn to_args(parts: &[&str]) -> Vec<String> {
	parts.iter().map(|part| part.to_string()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn args_derive_entrypoint_then_cmd() {
		let config = RuntimeConfig {
			entrypoint: Some(vec!["/entry".to_string()]),
			cmd: Some(vec!["serve".to_string(), "--port=80".to_string()]),
			working_dir: None,
		};
		assert_eq!(
			derive_args(Some(&config)).unwrap(),
			vec!["/entry", "serve", "--port=80"]
		);
	}

	#[test]
	fn empty_config_yields_no_args() {
		assert!(derive_args(None).is_none());
		let config = RuntimeConfig::default();
		assert!(derive_args(Some(&config)).is_none());
	}

	#[test]
	fn cmd_only_images_work() {
		let config = RuntimeConfig {
			entrypoint: None,
			cmd: Some(vec!["/pause".to_string()]),
			working_dir: None,
		};
		assert_eq!(derive_args(Some(&config)).unwrap(), vec!["/pause"]);
	}

	#[test]
	fn stopped_status_matches_the_wire_value() {
		// The stop wait compares against the raw enum value the runtime
		// sends; it must stay 3.
		assert_eq!(ProcessStatus::Stopped as i32, 3);
	}

	#[test]
	fn fallback_args_keep_a_shell_alive() {
		let args = to_args(APP_FALLBACK_ARGS);
		assert_eq!(args[0], "/bin/sh");
		assert!(args[2].contains("sleep infinity"));
	}
}
