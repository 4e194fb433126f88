use serde::{Deserialize, Serialize};

/// Free capacity on one schedulable worker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerCapacity {
	pub cpu: u64,
	pub memory: u64,
}

/// Demand of one service: per-instance requirement and replica count.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceDemand {
	pub cpu: u64,
	pub memory: u64,
	pub instances: u32,
}

/// One concrete instance of a service awaiting (or holding) a slot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceRef {
	pub service: String,
	pub instance: u32,
}

/// Result of a planning round. `assignments` is index-aligned with the
/// worker list; instances that fit nowhere end up in `unplaced`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PlacementOutcome {
	pub assignments: Vec<Vec<InstanceRef>>,
	pub unplaced: Vec<InstanceRef>,
	/// Capacity estimate, only populated when planning ran with no workers.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub nodes_needed: Option<u64>,
}
