//! Minimal OCI runtime spec construction. The runtime consumes the spec as
//! JSON wrapped in an Any with the containerd spec type URL.

use models::models::pod::NamespacePaths;
use models::models::resources::ResourceSpec;
use serde::Serialize;

use crate::runtime::error::{EngineError, ErrorKind, Stage};
use crate::runtime::OCI_SPEC_TYPE_URL;

pub const OCI_VERSION: &str = "1.0.2";

pub const DEFAULT_PATH_ENV: &str =
	"PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Capability set granted to every container.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
	"CAP_CHOWN",
	"CAP_DAC_OVERRIDE",
	"CAP_FSETID",
	"CAP_FOWNER",
	"CAP_MKNOD",
	"CAP_NET_RAW",
	"CAP_SETGID",
	"CAP_SETUID",
	"CAP_SETFCAP",
	"CAP_SETPCAP",
	"CAP_NET_BIND_SERVICE",
	"CAP_SYS_CHROOT",
	"CAP_KILL",
	"CAP_AUDIT_WRITE",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OciSpec {
	pub oci_version: String,
	pub process: Process,
	pub root: Root,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hostname: Option<String>,
	pub mounts: Vec<OciMount>,
	pub linux: Linux,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
	pub terminal: bool,
	pub user: User,
	pub args: Vec<String>,
	pub env: Vec<String>,
	pub cwd: String,
	pub capabilities: Capabilities,
	pub no_new_privileges: bool,
}

#[derive(Debug, Serialize)]
pub struct User {
	pub uid: u32,
	pub gid: u32,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
	pub bounding: Vec<String>,
	pub effective: Vec<String>,
	pub permitted: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Root {
	pub path: String,
	pub readonly: bool,
}

#[derive(Debug, Serialize)]
pub struct OciMount {
	pub destination: String,
	#[serde(rename = "type")]
	pub fs_type: String,
	pub source: String,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Linux {
	pub namespaces: Vec<LinuxNamespace>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resources: Option<LinuxResources>,
}

/// A namespace entry: no path means create fresh, a path means join the
/// namespace behind it.
#[derive(Debug, Clone, Serialize)]
pub struct LinuxNamespace {
	#[serde(rename = "type")]
	pub ns_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxResources {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cpu: Option<LinuxCpu>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub memory: Option<LinuxMemory>,
}

#[derive(Debug, Serialize)]
pub struct LinuxCpu {
	pub shares: u64,
	pub quota: i64,
	pub period: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cpus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinuxMemory {
	pub limit: i64,
}

/// cgroup mapping for a resource budget: shares scale 1024 per full core
/// with a floor of 2, quota scales against a 100ms period with the kernel's
/// 1ms floor.
pub fn linux_resources(resources: &ResourceSpec) -> LinuxResources {
	let millicores = resources.cpu_millicores;
	let shares = ((1024 * millicores + 500) / 1000).max(2);
	let quota = (((100_000 * millicores + 500) / 1000).max(1000)) as i64;
	LinuxResources {
		cpu: Some(LinuxCpu {
			shares,
			quota,
			period: 100_000,
			cpus: resources.cpuset.clone(),
		}),
		memory: Some(LinuxMemory {
			limit: resources.memory as i64,
		}),
	}
}

fn namespace(ns_type: &str, path: Option<String>) -> LinuxNamespace {
	LinuxNamespace {
		ns_type: ns_type.to_string(),
		path,
	}
}

/// Five fresh namespaces for a pause sandbox.
pub fn sandbox_namespaces() -> Vec<LinuxNamespace> {
	["pid", "network", "ipc", "uts", "mount"]
		.into_iter()
		.map(|ns_type| namespace(ns_type, None))
		.collect()
}

/// Join a sandbox's pid/net/ipc/uts namespaces; the mount namespace stays
/// private to the container.
pub fn joined_namespaces(paths: &NamespacePaths) -> Vec<LinuxNamespace> {
	vec![
		namespace("pid", Some(paths.pid.clone())),
		namespace("network", Some(paths.net.clone())),
		namespace("ipc", Some(paths.ipc.clone())),
		namespace("uts", Some(paths.uts.clone())),
		namespace("mount", None),
	]
}

fn default_mounts() -> Vec<OciMount> {
	vec![
		OciMount {
			destination: "/proc".to_string(),
			fs_type: "proc".to_string(),
			source: "proc".to_string(),
			options: vec![],
		},
		OciMount {
			destination: "/dev".to_string(),
			fs_type: "tmpfs".to_string(),
			source: "tmpfs".to_string(),
			options: vec![
				"nosuid".to_string(),
				"strictatime".to_string(),
				"mode=755".to_string(),
				"size=65536k".to_string(),
			],
		},
		OciMount {
			destination: "/dev/pts".to_string(),
			fs_type: "devpts".to_string(),
			source: "devpts".to_string(),
			options: vec![
				"nosuid".to_string(),
				"noexec".to_string(),
				"newinstance".to_string(),
				"ptmxmode=0666".to_string(),
				"mode=0620".to_string(),
			],
		},
		OciMount {
			destination: "/dev/shm".to_string(),
			fs_type: "tmpfs".to_string(),
			source: "shm".to_string(),
			options: vec![
				"nosuid".to_string(),
				"noexec".to_string(),
				"nodev".to_string(),
				"mode=1777".to_string(),
				"size=65536k".to_string(),
			],
		},
		OciMount {
			destination: "/sys".to_string(),
			fs_type: "sysfs".to_string(),
			source: "sysfs".to_string(),
			options: vec![
				"nosuid".to_string(),
				"noexec".to_string(),
				"nodev".to_string(),
				"ro".to_string(),
			],
		},
		OciMount {
			destination: "/sys/fs/cgroup".to_string(),
			fs_type: "cgroup".to_string(),
			source: "cgroup".to_string(),
			options: vec![
				"nosuid".to_string(),
				"noexec".to_string(),
				"nodev".to_string(),
				"relatime".to_string(),
				"ro".to_string(),
			],
		},
	]
}

/// High-level inputs for one container spec.
pub struct SpecParams<'a> {
	pub args: Vec<String>,
	pub env: Vec<String>,
	pub hostname: Option<String>,
	pub cwd: String,
	pub namespaces: Vec<LinuxNamespace>,
	pub resources: Option<&'a ResourceSpec>,
	pub root_readonly: bool,
}

/// Build the runtime spec and wrap it for the containers service.
pub fn build(params: SpecParams<'_>) -> Result<prost_types::Any, EngineError> {
	let caps: Vec<String> = DEFAULT_CAPABILITIES
		.iter()
		.map(|cap| cap.to_string())
		.collect();

	let mut env = params.env;
	if !env.iter().any(|entry| entry.starts_with("PATH=")) {
		env.insert(0, DEFAULT_PATH_ENV.to_string());
	}

	let spec = OciSpec {
		oci_version: OCI_VERSION.to_string(),
		process: Process {
			terminal: false,
			user: User { uid: 0, gid: 0 },
			args: params.args,
			env,
			cwd: params.cwd,
			capabilities: Capabilities {
				bounding: caps.clone(),
				effective: caps.clone(),
				permitted: caps,
			},
			no_new_privileges: true,
		},
		root: Root {
			path: "rootfs".to_string(),
			readonly: params.root_readonly,
		},
		hostname: params.hostname,
		mounts: default_mounts(),
		linux: Linux {
			namespaces: params.namespaces,
			resources: params.resources.map(linux_resources),
		},
	};

	let value = serde_json::to_vec(&spec).map_err(|err| {
		EngineError::new(
			ErrorKind::Internal,
			Stage::Spec,
			format!("cannot serialize runtime spec: {err}"),
		)
	})?;
	Ok(prost_types::Any {
		type_url: OCI_SPEC_TYPE_URL.to_string(),
		value,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn decode(any: &prost_types::Any) -> serde_json::Value {
		serde_json::from_slice(&any.value).unwrap()
	}

	fn base_params() -> SpecParams<'static> {
		SpecParams {
			args: vec!["/pause".to_string()],
			env: vec![],
			hostname: Some("p1".to_string()),
			cwd: "/".to_string(),
			namespaces: sandbox_namespaces(),
			resources: None,
			root_readonly: false,
		}
	}

	#[test]
	fn sandbox_spec_creates_five_fresh_namespaces() {
		let any = build(base_params()).unwrap();
		assert_eq!(any.type_url, OCI_SPEC_TYPE_URL);
		let spec = decode(&any);
		assert_eq!(spec["ociVersion"], "1.0.2");
		let namespaces = spec["linux"]["namespaces"].as_array().unwrap();
		assert_eq!(namespaces.len(), 5);
		for ns in namespaces {
			assert!(ns.get("path").is_none());
		}
		assert_eq!(spec["process"]["args"][0], "/pause");
		assert_eq!(
			spec["process"]["env"][0],
			DEFAULT_PATH_ENV
		);
	}

	#[test]
	fn joined_spec_references_sandbox_paths_except_mount() {
		let paths = models::models::pod::NamespacePaths::for_pid(77);
		let mut params = base_params();
		params.namespaces = joined_namespaces(&paths);
		let spec = decode(&build(params).unwrap());
		let namespaces = spec["linux"]["namespaces"].as_array().unwrap();
		assert_eq!(namespaces.len(), 5);
		for ns in namespaces {
			match ns["type"].as_str().unwrap() {
				"mount" => assert!(ns.get("path").is_none()),
				"network" => assert_eq!(ns["path"], "/proc/77/ns/net"),
				_ => assert!(ns["path"].as_str().unwrap().starts_with("/proc/77/ns/")),
			}
		}
	}

	#[test]
	fn capability_set_is_the_documented_fourteen() {
		let spec = decode(&build(base_params()).unwrap());
		let bounding = spec["process"]["capabilities"]["bounding"]
			.as_array()
			.unwrap();
		assert_eq!(bounding.len(), 14);
		assert!(bounding.iter().any(|c| c == "CAP_NET_BIND_SERVICE"));
		assert!(bounding.iter().all(|c| c.as_str().unwrap().starts_with("CAP_")));
	}

	#[test]
	fn default_mount_list_covers_proc_dev_sys() {
		let spec = decode(&build(base_params()).unwrap());
		let destinations: Vec<&str> = spec["mounts"]
			.as_array()
			.unwrap()
			.iter()
			.map(|m| m["destination"].as_str().unwrap())
			.collect();
		assert_eq!(
			destinations,
			vec!["/proc", "/dev", "/dev/pts", "/dev/shm", "/sys", "/sys/fs/cgroup"]
		);
	}

	#[test]
	fn cgroup_mapping_rounds_and_floors() {
		let spec = ResourceSpec::new(500, 64 * 1024 * 1024);
		let resources = linux_resources(&spec);
		let cpu = resources.cpu.unwrap();
		assert_eq!(cpu.shares, 512);
		assert_eq!(cpu.quota, 50_000);
		assert_eq!(cpu.period, 100_000);
		assert_eq!(resources.memory.unwrap().limit, 67_108_864);

		// Tiny budgets hit the floors.
		let tiny = linux_resources(&ResourceSpec::new(1, 1));
		let cpu = tiny.cpu.unwrap();
		assert_eq!(cpu.shares, 2);
		assert_eq!(cpu.quota, 1000);
	}

	#[test]
	fn cpuset_flows_through() {
		let mut spec = ResourceSpec::new(1000, 1024);
		spec.cpuset = Some("0-1".to_string());
		let cpu = linux_resources(&spec).cpu.unwrap();
		assert_eq!(cpu.shares, 1024);
		assert_eq!(cpu.quota, 100_000);
		assert_eq!(cpu.cpus.as_deref(), Some("0-1"));
	}
}
