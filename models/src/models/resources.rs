use serde::{Deserialize, Deserializer, Serialize};

/// Resource budget for a single container.
///
/// Memory accepts either a plain byte count or a kubernetes-style quantity
/// string ("64Mi", "1Gi", "512M") on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResourceSpec {
	pub cpu_millicores: u64,
	#[serde(deserialize_with = "memory_bytes")]
	pub memory: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cpuset: Option<String>,
}

impl ResourceSpec {
	pub fn new(cpu_millicores: u64, memory: u64) -> Self {
		ResourceSpec {
			cpu_millicores,
			memory,
			cpuset: None,
		}
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("bad memory quantity: {0}")]
pub struct QuantityError(pub String);

/// Parse a memory quantity: binary suffixes (Ki/Mi/Gi) are powers of 1024,
/// decimal ones (K/KB/M/MB/G/GB) powers of 1000, bare numbers are bytes.
pub fn parse_quantity(raw: &str) -> Result<u64, QuantityError> {
	let trimmed = raw.trim();
	let lower = trimmed.to_ascii_lowercase();
	let (digits, multiplier) = if let Some(v) = lower.strip_suffix("ki") {
		(v, 1024u64)
	} else if let Some(v) = lower.strip_suffix("mi") {
		(v, 1024 * 1024)
	} else if let Some(v) = lower.strip_suffix("gi") {
		(v, 1024 * 1024 * 1024)
	} else if let Some(v) = lower.strip_suffix("kb") {
		(v, 1000)
	} else if let Some(v) = lower.strip_suffix("mb") {
		(v, 1000 * 1000)
	} else if let Some(v) = lower.strip_suffix("gb") {
		(v, 1000 * 1000 * 1000)
	} else if let Some(v) = lower.strip_suffix('k') {
		(v, 1000)
	} else if let Some(v) = lower.strip_suffix('m') {
		(v, 1000 * 1000)
	} else if let Some(v) = lower.strip_suffix('g') {
		(v, 1000 * 1000 * 1000)
	} else {
		(lower.as_str(), 1)
	};

	let value: u64 = digits
		.trim()
		.parse()
		.map_err(|_| QuantityError(raw.to_string()))?;
	value
		.checked_mul(multiplier)
		.ok_or_else(|| QuantityError(raw.to_string()))
}

fn memory_bytes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Bytes(u64),
		Quantity(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Bytes(bytes) => Ok(bytes),
		Raw::Quantity(quantity) => parse_quantity(&quantity).map_err(serde::de::Error::custom),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn binary_and_decimal_suffixes() {
		assert_eq!(parse_quantity("64Mi").unwrap(), 64 * 1024 * 1024);
		assert_eq!(parse_quantity("1Gi").unwrap(), 1024 * 1024 * 1024);
		assert_eq!(parse_quantity("512Ki").unwrap(), 512 * 1024);
		assert_eq!(parse_quantity("256M").unwrap(), 256_000_000);
		assert_eq!(parse_quantity("512MB").unwrap(), 512_000_000);
		assert_eq!(parse_quantity("268435456").unwrap(), 268_435_456);
	}

	#[test]
	fn garbage_is_rejected() {
		assert!(parse_quantity("lots").is_err());
		assert!(parse_quantity("12Q").is_err());
		assert!(parse_quantity("").is_err());
	}

	#[test]
	fn resource_spec_accepts_quantity_strings() {
		let spec: ResourceSpec =
			serde_json::from_str(r#"{"cpu_millicores":500,"memory":"64Mi"}"#).unwrap();
		assert_eq!(spec.memory, 64 * 1024 * 1024);
		let spec: ResourceSpec =
			serde_json::from_str(r#"{"cpu_millicores":500,"memory":1048576}"#).unwrap();
		assert_eq!(spec.memory, 1_048_576);
	}
}
