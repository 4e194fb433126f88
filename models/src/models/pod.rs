use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::resources::ResourceSpec;

/// Requested application container inside a pod.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContainerSpec {
	pub name: String,
	pub image: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub args: Option<Vec<String>>,
	#[serde(default)]
	pub env: HashMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resources: Option<ResourceSpec>,
}

/// The pause sandbox process backing a pod.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PauseProcess {
	pub cid: String,
	pub pid: u32,
}

/// Namespace file paths under /proc/<pid>/ns that app containers join.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NamespacePaths {
	pub pid: String,
	pub net: String,
	pub ipc: String,
	pub uts: String,
}

impl NamespacePaths {
	pub fn for_pid(pid: u32) -> Self {
		NamespacePaths {
			pid: format!("/proc/{pid}/ns/pid"),
			net: format!("/proc/{pid}/ns/net"),
			ipc: format!("/proc/{pid}/ns/ipc"),
			uts: format!("/proc/{pid}/ns/uts"),
		}
	}
}

/// The CNI network a pod was attached to.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CniAttachment {
	pub network: String,
	pub ifname: String,
}

/// A created pod: pause sandbox plus everything needed to join or tear it
/// down. Mutated only by the engine that created it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PodRecord {
	pub name: String,
	pub pause: PauseProcess,
	pub ns_paths: NamespacePaths,
	pub cni: CniAttachment,
	pub snapshot_key: String,
}

/// An application container joined to a pod's namespaces.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContainerRecord {
	pub cid: String,
	pub pid: u32,
	pub snapshot_key: String,
	pub pod_ref: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn namespace_paths_follow_proc_layout() {
		let ns = NamespacePaths::for_pid(4242);
		assert_eq!(ns.pid, "/proc/4242/ns/pid");
		assert_eq!(ns.net, "/proc/4242/ns/net");
		assert_eq!(ns.ipc, "/proc/4242/ns/ipc");
		assert_eq!(ns.uts, "/proc/4242/ns/uts");
	}

	#[test]
	fn container_spec_defaults() {
		let spec: ContainerSpec =
			serde_json::from_str(r#"{"name":"web","image":"nginx"}"#).unwrap();
		assert!(spec.args.is_none());
		assert!(spec.env.is_empty());
		assert!(spec.resources.is_none());
	}
}
