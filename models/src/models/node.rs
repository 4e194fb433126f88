use serde::{Deserialize, Serialize};

/// A worker node as registered in the control-plane registry, keyed by its
/// private DNS name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
	pub private_dns: String,
	pub ip: String,
	pub instance_id: String,
	pub namespace: String,
	pub instance_type: String,
}

/// Schedulable capacity advertised for a node, used by the placement planner
/// when a request does not carry explicit worker capacities.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeCapacity {
	pub cpu: u64,
	pub memory: u64,
}
