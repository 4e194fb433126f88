use serde::{Deserialize, Serialize};

/// Static facts about a worker host.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SystemInfo {
	pub system: Option<String>,
	pub kernel: Option<String>,
	pub os_version: Option<String>,
	pub host_name: Option<String>,
	pub cpu_count: u64,
	pub physical_cpu_count: Option<u64>,
	pub cpu_frequency_mhz: u64,
	pub total_memory_bytes: u64,
}

/// Point-in-time usage snapshot of a worker host.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UsageInfo {
	/// Per-core load percentage.
	pub cpu_percent: Vec<f32>,
	pub total_memory_bytes: u64,
	pub used_memory_bytes: u64,
	pub available_memory_bytes: u64,
	pub total_swap_bytes: u64,
	pub used_swap_bytes: u64,
}
