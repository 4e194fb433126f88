use serde::{Deserialize, Serialize};

/// Where a container landed: its address and the node that hosts it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContainerLocation {
	pub ip_address: String,
	pub node: String,
}

/// Health-check configuration stored per application cluster.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClusterHealth {
	pub port: u16,
	pub url: String,
	/// Probe interval in milliseconds.
	pub interval: u64,
	/// Consecutive failing checks before a member is marked unhealthy.
	pub checks: u32,
}
