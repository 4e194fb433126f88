//! CNI plugin invocation: a `cnitool` fast path when the helper is on PATH,
//! otherwise direct execution of the first plugin of the named conflist.
//! The environment contract and stdin JSON follow the CNI spec; plugin
//! stderr is surfaced verbatim.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Subprocess budget; a stuck plugin must not wedge pod teardown.
const CNI_TIMEOUT: Duration = Duration::from_secs(20);

const HELPER_BINARY: &str = "cnitool";

#[derive(Debug, thiserror::Error)]
pub enum CniError {
	#[error("no CNI network {network:?} configured under {conf_dir}")]
	NetworkNotFound { network: String, conf_dir: String },
	#[error("CNI config {path} is invalid: {reason}")]
	BadConfig { path: String, reason: String },
	#[error("CNI plugin failed: {stderr}")]
	PluginFailed { stderr: String },
	#[error("CNI invocation exceeded {0:?}")]
	Timeout(Duration),
	#[error("CNI plugin produced invalid JSON: {0}")]
	BadOutput(#[from] serde_json::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl CniError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, CniError::Timeout(_))
	}
}

/// One object owns every plugin invocation, so the env contract and the
/// timeout live in a single place.
#[derive(Clone)]
pub struct CniInvoker {
	bin_dir: PathBuf,
	conf_dir: PathBuf,
}

impl CniInvoker {
	pub fn new(bin_dir: impl Into<PathBuf>, conf_dir: impl Into<PathBuf>) -> Self {
		CniInvoker {
			bin_dir: bin_dir.into(),
			conf_dir: conf_dir.into(),
		}
	}

	/// Attach `netns` to `network`. Returns the plugin's JSON result.
	pub async fn add(
		&self,
		network: &str,
		container_id: &str,
		netns: &str,
		ifname: &str,
	) -> Result<Value, CniError> {
		self.invoke("ADD", network, container_id, netns, ifname).await
	}

	/// Detach `netns` from `network`. Callers treat failures as advisory;
	/// teardown never blocks on them.
	pub async fn del(
		&self,
		network: &str,
		container_id: &str,
		netns: &str,
		ifname: &str,
	) -> Result<(), CniError> {
		self.invoke("DEL", network, container_id, netns, ifname)
			.await
			.map(|_| ())
	}

	async fn invoke(
		&self,
		command: &str,
		network: &str,
		container_id: &str,
		netns: &str,
		ifname: &str,
	) -> Result<Value, CniError> {
		let env_contract = vec![
			("CNI_COMMAND".to_string(), command.to_string()),
			("CNI_CONTAINERID".to_string(), container_id.to_string()),
			("CNI_NETNS".to_string(), netns.to_string()),
			("CNI_IFNAME".to_string(), ifname.to_string()),
			(
				"CNI_PATH".to_string(),
				self.bin_dir.to_string_lossy().into_owned(),
			),
			("CNI_ARGS".to_string(), "IgnoreUnknown=1".to_string()),
		];

		if let Some(helper) = find_on_path(HELPER_BINARY) {
			let mut extra = env_contract.clone();
			// cnitool locates the conflist itself via NETCONFPATH.
			extra.push((
				"NETCONFPATH".to_string(),
				self.conf_dir.to_string_lossy().into_owned(),
			));
			let verb = command.to_ascii_lowercase();
			return self
				.run(&helper, &[verb.as_str(), network, netns], &extra, None)
				.await;
		}

		let config = self.load_network_config(network)?;
		let plugin = first_plugin(&config)?;
		let plugin_type = plugin
			.get("type")
			.and_then(Value::as_str)
			.ok_or_else(|| CniError::BadConfig {
				path: self.conf_dir.to_string_lossy().into_owned(),
				reason: format!("plugin in network {network:?} has no type"),
			})?
			.to_string();
		let binary = self.bin_dir.join(&plugin_type);
		let stdin = serde_json::to_vec(&plugin)?;
		self.run(&binary, &[], &env_contract, Some(stdin)).await
	}

	/// Scan the config directory for the conflist named `network`. A bare
	/// `.conf` single-plugin file is wrapped into a synthetic conflist.
	pub fn load_network_config(&self, network: &str) -> Result<Value, CniError> {
		let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.conf_dir)?
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| {
				matches!(
					path.extension().and_then(|e| e.to_str()),
					Some("conf") | Some("conflist")
				)
			})
			.collect();
		entries.sort();

		for path in entries {
			let raw = std::fs::read_to_string(&path)?;
			let parsed: Value = match serde_json::from_str(&raw) {
				Ok(value) => value,
				Err(err) => {
					tracing::warn!(path = %path.display(), "skipping unparseable CNI config: {err}");
					continue;
				}
			};
			let wrapped = if path.extension().and_then(|e| e.to_str()) == Some("conf") {
				wrap_single_conf(parsed)
			} else {
				parsed
			};
			if wrapped.get("name").and_then(Value::as_str) == Some(network) {
				return Ok(wrapped);
			}
		}
		Err(CniError::NetworkNotFound {
			network: network.to_string(),
			conf_dir: self.conf_dir.to_string_lossy().into_owned(),
		})
	}

	async fn run(
		&self,
		program: &Path,
		args: &[&str],
		envs: &[(String, String)],
		stdin: Option<Vec<u8>>,
	) -> Result<Value, CniError> {
		let mut command = Command::new(program);
		command
			.args(args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		for (key, value) in envs {
			command.env(key, value);
		}

		let mut child = command.spawn()?;
		if let Some(bytes) = stdin {
			if let Some(mut pipe) = child.stdin.take() {
				pipe.write_all(&bytes).await?;
				// Closing stdin tells the plugin the config is complete.
				drop(pipe);
			}
		} else {
			drop(child.stdin.take());
		}

		let output = match timeout(CNI_TIMEOUT, child.wait_with_output()).await {
			Ok(result) => result?,
			Err(_) => return Err(CniError::Timeout(CNI_TIMEOUT)),
		};

		if !output.status.success() {
			return Err(CniError::PluginFailed {
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}
		if output.stdout.iter().all(|byte| byte.is_ascii_whitespace()) {
			// DEL frequently prints nothing.
			return Ok(Value::Null);
		}
		Ok(serde_json::from_slice(&output.stdout)?)
	}
}

/// Merge a single `.conf` plugin into the conflist shape the invoker works
/// with.
fn wrap_single_conf(conf: Value) -> Value {
	let name = conf.get("name").cloned().unwrap_or(Value::Null);
	let version = conf.get("cniVersion").cloned().unwrap_or(Value::Null);
	serde_json::json!({
		"name": name,
		"cniVersion": version,
		"plugins": [conf],
	})
}

/// First plugin of the chain, with the list's name and cniVersion folded in
/// the way a CNI runtime would before exec.
fn first_plugin(conflist: &Value) -> Result<Value, CniError> {
	let plugins = conflist
		.get("plugins")
		.and_then(Value::as_array)
		.filter(|plugins| !plugins.is_empty())
		.ok_or_else(|| CniError::BadConfig {
			path: String::new(),
			reason: "conflist has no plugins".to_string(),
		})?;
	let mut plugin = plugins[0].clone();
	if let Some(object) = plugin.as_object_mut() {
		if let Some(name) = conflist.get("name") {
			object.insert("name".to_string(), name.clone());
		}
		if let Some(version) = conflist.get("cniVersion") {
			object.insert("cniVersion".to_string(), version.clone());
		}
	}
	Ok(plugin)
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
	search_dirs(binary, env::var_os("PATH").map(|paths| env::split_paths(&paths).collect())?)
}

fn search_dirs(binary: &str, dirs: Vec<PathBuf>) -> Option<PathBuf> {
	dirs.into_iter()
		.map(|dir| dir.join(binary))
		.find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn conflist(dir: &Path, file: &str, body: &str) {
		fs::write(dir.join(file), body).unwrap();
	}

	#[test]
	fn finds_conflist_by_network_name() {
		let dir = tempfile::tempdir().unwrap();
		conflist(
			dir.path(),
			"10-calico.conflist",
			r#"{"name":"calico","cniVersion":"0.4.0","plugins":[{"type":"calico","mtu":1500}]}"#,
		);
		conflist(
			dir.path(),
			"20-bridge.conflist",
			r#"{"name":"podnet","cniVersion":"0.4.0","plugins":[{"type":"bridge"}]}"#,
		);

		let invoker = CniInvoker::new("/opt/cni/bin", dir.path());
		let config = invoker.load_network_config("calico").unwrap();
		assert_eq!(config["plugins"][0]["type"], "calico");

		let plugin = first_plugin(&config).unwrap();
		assert_eq!(plugin["type"], "calico");
		assert_eq!(plugin["name"], "calico");
		assert_eq!(plugin["cniVersion"], "0.4.0");
		assert_eq!(plugin["mtu"], 1500);
	}

	#[test]
	fn single_conf_is_wrapped_into_a_conflist() {
		let dir = tempfile::tempdir().unwrap();
		conflist(
			dir.path(),
			"99-loopback.conf",
			r#"{"name":"lo","cniVersion":"0.3.1","type":"loopback"}"#,
		);

		let invoker = CniInvoker::new("/opt/cni/bin", dir.path());
		let config = invoker.load_network_config("lo").unwrap();
		let plugins = config["plugins"].as_array().unwrap();
		assert_eq!(plugins.len(), 1);
		assert_eq!(plugins[0]["type"], "loopback");
	}

	#[test]
	fn unknown_network_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let invoker = CniInvoker::new("/opt/cni/bin", dir.path());
		let err = invoker.load_network_config("nope").unwrap_err();
		assert!(matches!(err, CniError::NetworkNotFound { .. }));
	}

	#[test]
	fn unparseable_configs_are_skipped_not_fatal() {
		let dir = tempfile::tempdir().unwrap();
		conflist(dir.path(), "00-broken.conflist", "{nope");
		conflist(
			dir.path(),
			"10-good.conflist",
			r#"{"name":"good","plugins":[{"type":"bridge"}]}"#,
		);
		let invoker = CniInvoker::new("/opt/cni/bin", dir.path());
		assert!(invoker.load_network_config("good").is_ok());
	}

	#[test]
	fn path_search_only_matches_files() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("cnitool"), "").unwrap();
		let found = search_dirs("cnitool", vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()]);
		assert_eq!(found.unwrap(), dir.path().join("cnitool"));
		assert!(search_dirs("missing-helper", vec![dir.path().to_path_buf()]).is_none());
	}
}
