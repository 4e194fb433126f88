//! Layered snapshot management: idempotent unpacking of image layers into
//! chain-ID-named snapshots, and writable layers for containers.
//!
//! Concurrency discipline: prepare under unique random keys, commit under
//! deterministic chain IDs, and treat ALREADY_EXISTS on commit as another
//! unpacker winning the same layer.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tonic::metadata::{Ascii, MetadataValue};
use uuid::Uuid;

use crate::runtime::api::diff::ApplyRequest;
use crate::runtime::api::leases::{CreateRequest as LeaseCreateRequest, DeleteRequest as LeaseDeleteRequest};
use crate::runtime::api::snapshots::{
	CommitSnapshotRequest, PrepareSnapshotRequest, RemoveSnapshotRequest, StatSnapshotRequest,
};
use crate::runtime::api::types::{Descriptor, Mount};
use crate::runtime::error::{EngineError, ErrorKind, Stage};
use crate::runtime::{deadline, rpc, RuntimeClient};

/// gRPC metadata key binding a request to a lease.
const LEASE_HEADER: &str = "containerd-lease";

fn rand_suffix(len: usize) -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(len)
		.map(char::from)
		.collect::<String>()
		.to_lowercase()
}

/// Attach a lease id to a request so the referenced content and snapshots
/// survive garbage collection until the lease is dropped.
fn leased<M>(message: M, lease: Option<&MetadataValue<Ascii>>) -> tonic::Request<M> {
	let mut request = tonic::Request::new(message);
	if let Some(value) = lease {
		request.metadata_mut().insert(LEASE_HEADER, value.clone());
	}
	request
}

#[derive(Clone)]
pub struct SnapshotManager {
	client: RuntimeClient,
	snapshotter: String,
}

impl SnapshotManager {
	pub fn new(client: RuntimeClient, snapshotter: String) -> Self {
		SnapshotManager {
			client,
			snapshotter,
		}
	}

	pub fn snapshotter(&self) -> &str {
		&self.snapshotter
	}

	/// Unpack every layer that is not already committed under its chain ID.
	/// Safe to race: the loser of a commit race removes its prepared key and
	/// carries on.
	pub async fn ensure_unpacked(
		&self,
		layers: &[Descriptor],
		chain: &[String],
	) -> Result<(), EngineError> {
		if layers.len() != chain.len() {
			return Err(EngineError::new(
				ErrorKind::ImageInvalid,
				Stage::Unpack,
				format!(
					"{} layers vs {} chain ids",
					layers.len(),
					chain.len()
				),
			));
		}

		let lease = self.create_lease().await;
		let result = self.unpack_layers(layers, chain, lease.as_ref().map(|l| &l.1)).await;
		if let Some((lease_id, _)) = lease {
			self.drop_lease(&lease_id).await;
		}
		result
	}

	async fn unpack_layers(
		&self,
		layers: &[Descriptor],
		chain: &[String],
		lease: Option<&MetadataValue<Ascii>>,
	) -> Result<(), EngineError> {
		let mut parent = String::new();
		for (index, name) in chain.iter().enumerate() {
			if self.exists(name).await? {
				parent = name.clone();
				continue;
			}

			let key = format!("unpack-{}-{index}", rand_suffix(8));
			let mounts = self.prepare(&key, &parent, lease).await?;

			if let Err(err) = self.apply(&layers[index], &mounts, lease).await {
				self.remove_best_effort(&key).await;
				return Err(err);
			}

			match self.commit(name, &key, lease).await {
				Ok(()) => {}
				Err(status) if status.code() == tonic::Code::AlreadyExists => {
					// A concurrent unpack of the same chain won the commit.
					tracing::debug!(layer = %name, "snapshot already committed, converging");
					self.remove_best_effort(&key).await;
				}
				Err(status) => {
					self.remove_best_effort(&key).await;
					return Err(EngineError::from_status(Stage::Snapshot, status));
				}
			}
			parent = name.clone();
		}
		Ok(())
	}

	/// Fresh read-write layer over a committed parent chain. The key gets a
	/// random suffix so concurrent pods never collide.
	pub async fn prepare_rw_snapshot(
		&self,
		parent_chain: &str,
		hint: &str,
	) -> Result<(Vec<Mount>, String), EngineError> {
		let key = format!("{hint}-{}", rand_suffix(8));
		let mounts = self.prepare(&key, parent_chain, None).await?;
		Ok((mounts, key))
	}

	/// Remove an active snapshot key. Absent keys are fine; removal is
	/// idempotent.
	pub async fn remove(&self, key: &str) -> Result<(), EngineError> {
		let mut snapshots = self.client.snapshots.clone();
		match rpc(
			deadline::SNAPSHOT,
			snapshots.remove(RemoveSnapshotRequest {
				snapshotter: self.snapshotter.clone(),
				key: key.to_string(),
			}),
		)
		.await
		{
			Ok(_) => Ok(()),
			Err(status) if status.code() == tonic::Code::NotFound => Ok(()),
			Err(status) => Err(EngineError::from_status(Stage::Snapshot, status)),
		}
	}

	pub async fn remove_best_effort(&self, key: &str) {
		if let Err(err) = self.remove(key).await {
			tracing::warn!(key, "leaving stale prepared snapshot behind: {err}");
		}
	}

	async fn exists(&self, name: &str) -> Result<bool, EngineError> {
		let mut snapshots = self.client.snapshots.clone();
		match rpc(
			deadline::SNAPSHOT,
			snapshots.stat(StatSnapshotRequest {
				snapshotter: self.snapshotter.clone(),
				key: name.to_string(),
			}),
		)
		.await
		{
			Ok(_) => Ok(true),
			Err(status) if status.code() == tonic::Code::NotFound => Ok(false),
			Err(status) => Err(EngineError::from_status(Stage::Snapshot, status)),
		}
	}

	async fn prepare(
		&self,
		key: &str,
		parent: &str,
		lease: Option<&MetadataValue<Ascii>>,
	) -> Result<Vec<Mount>, EngineError> {
		let mut snapshots = self.client.snapshots.clone();
		let request = leased(
			PrepareSnapshotRequest {
				snapshotter: self.snapshotter.clone(),
				key: key.to_string(),
				parent: parent.to_string(),
				labels: Default::default(),
			},
			lease,
		);
		rpc(deadline::SNAPSHOT, snapshots.prepare(request))
			.await
			.map(|response| response.into_inner().mounts)
			.map_err(|status| EngineError::from_status(Stage::Snapshot, status))
	}

	async fn apply(
		&self,
		layer: &Descriptor,
		mounts: &[Mount],
		lease: Option<&MetadataValue<Ascii>>,
	) -> Result<(), EngineError> {
		let mut diff = self.client.diff.clone();
		let request = leased(
			ApplyRequest {
				diff: Some(layer.clone()),
				mounts: mounts.to_vec(),
				payloads: Default::default(),
			},
			lease,
		);
		rpc(deadline::SNAPSHOT, diff.apply(request))
			.await
			.map(|_| ())
			.map_err(|status| EngineError::from_status(Stage::Unpack, status))
	}

	async fn commit(
		&self,
		name: &str,
		key: &str,
		lease: Option<&MetadataValue<Ascii>>,
	) -> Result<(), tonic::Status> {
		let mut snapshots = self.client.snapshots.clone();
		let request = leased(
			CommitSnapshotRequest {
				snapshotter: self.snapshotter.clone(),
				name: name.to_string(),
				key: key.to_string(),
				labels: Default::default(),
			},
			lease,
		);
		rpc(deadline::SNAPSHOT, snapshots.commit(request))
			.await
			.map(|_| ())
	}

	/// Best-effort lease around an unpack. Returns the id and its metadata
	/// form; unpacking proceeds without one if the lease service balks.
	async fn create_lease(&self) -> Option<(String, MetadataValue<Ascii>)> {
		let id = format!("unpack-{}", Uuid::new_v4());
		let mut leases = self.client.leases.clone();
		match rpc(
			deadline::SNAPSHOT,
			leases.create(LeaseCreateRequest {
				id: id.clone(),
				labels: Default::default(),
			}),
		)
		.await
		{
			Ok(_) => match MetadataValue::try_from(id.as_str()) {
				Ok(value) => Some((id, value)),
				Err(_) => None,
			},
			Err(status) => {
				tracing::warn!("unpacking without a lease: {}", status.message());
				None
			}
		}
	}

	async fn drop_lease(&self, id: &str) {
		let mut leases = self.client.leases.clone();
		if let Err(status) = rpc(
			deadline::SNAPSHOT,
			leases.delete(LeaseDeleteRequest {
				id: id.to_string(),
				sync: false,
			}),
		)
		.await
		{
			tracing::warn!(lease = id, "lease delete failed: {}", status.message());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn random_suffixes_are_lowercase_alphanumeric_and_unique() {
		let a = rand_suffix(8);
		let b = rand_suffix(8);
		assert_eq!(a.len(), 8);
		assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
		assert_ne!(a, b);
	}

	#[test]
	fn leased_requests_carry_the_header() {
		let value = MetadataValue::try_from("unpack-lease-1").unwrap();
		let request = leased((), Some(&value));
		assert_eq!(
			request.metadata().get(LEASE_HEADER).unwrap(),
			&MetadataValue::try_from("unpack-lease-1").unwrap()
		);
		let bare = leased((), None);
		assert!(bare.metadata().get(LEASE_HEADER).is_none());
	}
}
