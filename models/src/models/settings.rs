use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name looked up inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the config directory.
const CONFIG_DIR_ENV: &str = "PODLINK_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("cannot read {path}: {source}")]
	Unreadable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("cannot parse {path}: {source}")]
	Unparseable {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("encryption.key must not be empty")]
	EmptySecret,
}

/// Process-wide settings, loaded once at startup from
/// `<config-dir>/config.json`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
	pub encryption: EncryptionSettings,
	#[serde(default)]
	pub redis: RedisSettings,
	#[serde(default)]
	pub amqp: AmqpSettings,
	#[serde(default)]
	pub api: ApiSettings,
	#[serde(default)]
	pub containerd: ContainerdSettings,
	#[serde(default)]
	pub cni: CniSettings,
	#[serde(default)]
	pub cloud: CloudSettings,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub admin: Option<AdminSeed>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EncryptionSettings {
	pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RedisSettings {
	pub url: String,
}

impl Default for RedisSettings {
	fn default() -> Self {
		RedisSettings {
			url: "redis://127.0.0.1:6379/0".to_string(),
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AmqpSettings {
	pub url: String,
}

impl Default for AmqpSettings {
	fn default() -> Self {
		AmqpSettings {
			url: "amqp://127.0.0.1:5672/%2f".to_string(),
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiSettings {
	pub host: String,
	pub port: u16,
}

impl Default for ApiSettings {
	fn default() -> Self {
		ApiSettings {
			host: "0.0.0.0".to_string(),
			port: 8000,
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContainerdSettings {
	pub socket: String,
	pub namespace: String,
	/// Preferred snapshotter; empty means probe the usual candidates.
	#[serde(default)]
	pub snapshotter: String,
	#[serde(default = "default_pause_image")]
	pub pause_image: String,
}

fn default_pause_image() -> String {
	"registry.k8s.io/pause:3.9".to_string()
}

impl Default for ContainerdSettings {
	fn default() -> Self {
		ContainerdSettings {
			socket: "/run/containerd/containerd.sock".to_string(),
			namespace: "k8s.io".to_string(),
			snapshotter: String::new(),
			pause_image: default_pause_image(),
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CniSettings {
	pub bin_dir: String,
	pub conf_dir: String,
	pub network: String,
	pub ifname: String,
	/// Tear the pause sandbox down when CNI ADD fails. The default keeps the
	/// sandbox up so an operator can inspect it.
	#[serde(default)]
	pub rollback_on_add_failure: bool,
}

impl Default for CniSettings {
	fn default() -> Self {
		CniSettings {
			bin_dir: "/opt/cni/bin".to_string(),
			conf_dir: "/etc/cni/net.d".to_string(),
			network: "calico".to_string(),
			ifname: "eth0".to_string(),
			rollback_on_add_failure: false,
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CloudSettings {
	/// Logical name of the cloud lifecycle service queue.
	pub service: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region: Option<String>,
}

impl Default for CloudSettings {
	fn default() -> Self {
		CloudSettings {
			service: "aws_interface".to_string(),
			region: None,
		}
	}
}

/// Optional credential seeded into the registry at control-plane startup.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdminSeed {
	pub username: String,
	pub password: String,
}

impl Settings {
	/// Load settings from an explicit directory, falling back to
	/// `$PODLINK_CONFIG_DIR` and then `config/`.
	pub fn load(config_dir: Option<&Path>) -> Result<Self, SettingsError> {
		let dir = match config_dir {
			Some(dir) => dir.to_path_buf(),
			None => env::var_os(CONFIG_DIR_ENV)
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from("config")),
		};
		let path = dir.join(CONFIG_FILE);
		let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Unreadable {
			path: path.clone(),
			source,
		})?;
		let settings: Settings =
			serde_json::from_str(&raw).map_err(|source| SettingsError::Unparseable {
				path: path.clone(),
				source,
			})?;
		settings.validate()
	}

	pub fn validate(self) -> Result<Self, SettingsError> {
		if self.encryption.key.is_empty() {
			return Err(SettingsError::EmptySecret);
		}
		Ok(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minimal_settings_fill_defaults() {
		let settings: Settings =
			serde_json::from_str(r#"{"encryption":{"key":"k"}}"#).unwrap();
		let settings = settings.validate().unwrap();
		assert_eq!(settings.containerd.namespace, "k8s.io");
		assert_eq!(settings.cni.network, "calico");
		assert_eq!(settings.cloud.service, "aws_interface");
		assert!(!settings.cni.rollback_on_add_failure);
	}

	#[test]
	fn empty_secret_is_fatal() {
		let settings: Settings =
			serde_json::from_str(r#"{"encryption":{"key":""}}"#).unwrap();
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::EmptySecret)
		));
	}
}
