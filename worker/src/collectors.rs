//! Host telemetry collectors answering the worker-info task family.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use models::models::telemetry::{SystemInfo, UsageInfo};
use sysinfo::{CpuExt, CpuRefreshKind, RefreshKind, System, SystemExt};

/// Static facts about this host.
pub fn system_info() -> SystemInfo {
	let mut sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()).with_memory());
	sys.refresh_cpu();
	sys.refresh_memory();

	let cpus = sys.cpus();
	SystemInfo {
		system: sys.name(),
		kernel: sys.kernel_version(),
		os_version: sys.os_version(),
		host_name: sys.host_name(),
		cpu_count: cpus.len() as u64,
		physical_cpu_count: sys.physical_core_count().map(|count| count as u64),
		cpu_frequency_mhz: cpus.first().map(|cpu| cpu.frequency()).unwrap_or(0),
		total_memory_bytes: sys.total_memory(),
	}
}

/// Usage snapshot. CPU load needs two refreshes a moment apart, so this
/// blocks for a quarter second; run it on a blocking thread.
pub fn usage() -> UsageInfo {
	let mut sys = System::new_with_specifics(
		RefreshKind::new()
			.with_cpu(CpuRefreshKind::new().with_cpu_usage())
			.with_memory(),
	);
	sys.refresh_cpu();
	std::thread::sleep(std::time::Duration::from_millis(250));
	sys.refresh_cpu();
	sys.refresh_memory();

	UsageInfo {
		cpu_percent: sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect(),
		total_memory_bytes: sys.total_memory(),
		used_memory_bytes: sys.used_memory(),
		available_memory_bytes: sys.available_memory(),
		total_swap_bytes: sys.total_swap(),
		used_swap_bytes: sys.used_swap(),
	}
}

/// First address the local hostname resolves to, preferring IPv4.
pub fn host_ip() -> io::Result<String> {
	let host = hostname::get()?
		.into_string()
		.map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not UTF-8"))?;
	let addrs: Vec<SocketAddr> = (host.as_str(), 0).to_socket_addrs()?.collect();
	addrs
		.iter()
		.find(|addr| addr.is_ipv4())
		.or_else(|| addrs.first())
		.map(|addr| addr.ip().to_string())
		.ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::NotFound,
				format!("hostname {host} resolves to no addresses"),
			)
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn system_info_reports_cores_and_memory() {
		let info = system_info();
		assert!(info.cpu_count > 0);
		assert!(info.total_memory_bytes > 0);
	}

	#[test]
	fn usage_reports_one_sample_per_core() {
		let usage = usage();
		assert!(!usage.cpu_percent.is_empty());
		assert!(usage.total_memory_bytes >= usage.used_memory_bytes);
	}
}
