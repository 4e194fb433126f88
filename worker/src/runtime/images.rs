//! Image reference resolution, manifest/config loading and chain-ID
//! computation over the runtime's image and content stores.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::runtime::api::content::{InfoRequest, ReadContentRequest};
use crate::runtime::api::images::GetImageRequest;
use crate::runtime::api::types::Descriptor;
use crate::runtime::error::{EngineError, ErrorKind, Stage};
use crate::runtime::{deadline, rpc, RuntimeClient};

pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

fn is_index(media_type: &str) -> bool {
	media_type.ends_with("image.index.v1+json") || media_type == DOCKER_LIST
}

fn is_manifest(media_type: &str) -> bool {
	media_type.ends_with("image.manifest.v1+json") || media_type == DOCKER_MANIFEST
}

/// Expansions tried for user shorthand: a missing tag defaults to `:latest`
/// and single-segment names get the docker library prefix.
pub fn candidates(reference: &str) -> Vec<String> {
	let has_digest = reference.contains('@');
	let last_segment = reference.rsplit('/').next().unwrap_or(reference);
	let has_tag = last_segment.contains(':');

	let normalized = if has_digest || has_tag {
		reference.to_string()
	} else {
		format!("{reference}:latest")
	};

	let mut out = vec![normalized.clone()];
	if !reference.contains('/') {
		out.push(format!("docker.io/library/{normalized}"));
	}
	out
}

/// Host platform as a registry `(os, architecture)` pair.
pub fn host_platform() -> (&'static str, &'static str) {
	let arch = match std::env::consts::ARCH {
		"x86_64" => "amd64",
		"aarch64" => "arm64",
		"arm" => "arm",
		"powerpc64" => "ppc64le",
		other => other,
	};
	("linux", arch)
}

/// Chain IDs over uncompressed layer digests: `chain[0] = diff_ids[0]`,
/// `chain[i] = sha256(chain[i-1] + " " + diff_ids[i])`. These name the
/// committed snapshots, so the bytes must match across restarts.
pub fn chain_ids(diff_ids: &[String]) -> Vec<String> {
	let mut chain: Vec<String> = Vec::with_capacity(diff_ids.len());
	for diff_id in diff_ids {
		let next = match chain.last() {
			None => diff_id.clone(),
			Some(previous) => {
				let mut hasher = Sha256::new();
				hasher.update(previous.as_bytes());
				hasher.update(b" ");
				hasher.update(diff_id.as_bytes());
				format!("sha256:{}", hex::encode(hasher.finalize()))
			}
		};
		chain.push(next);
	}
	chain
}

#[derive(Debug, Deserialize)]
pub struct IndexEntry {
	#[serde(rename = "mediaType", default)]
	pub media_type: String,
	pub digest: String,
	#[serde(default)]
	pub size: i64,
	#[serde(default)]
	pub platform: Option<PlatformEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PlatformEntry {
	#[serde(default)]
	pub os: String,
	#[serde(default)]
	pub architecture: String,
}

#[derive(Debug, Deserialize)]
struct ImageIndex {
	#[serde(default)]
	manifests: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BlobRef {
	#[serde(rename = "mediaType", default)]
	pub media_type: String,
	pub digest: String,
	#[serde(default)]
	pub size: i64,
}

impl From<&BlobRef> for Descriptor {
	fn from(blob: &BlobRef) -> Descriptor {
		Descriptor {
			media_type: blob.media_type.clone(),
			digest: blob.digest.clone(),
			size: blob.size,
			annotations: Default::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Manifest {
	pub config: BlobRef,
	#[serde(default)]
	pub layers: Vec<BlobRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageConfig {
	#[serde(default)]
	pub rootfs: Option<RootFs>,
	#[serde(default)]
	pub config: Option<RuntimeConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RootFs {
	#[serde(default)]
	pub diff_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RuntimeConfig {
	#[serde(rename = "Entrypoint", default)]
	pub entrypoint: Option<Vec<String>>,
	#[serde(rename = "Cmd", default)]
	pub cmd: Option<Vec<String>>,
	#[serde(rename = "WorkingDir", default)]
	pub working_dir: Option<String>,
}

/// Everything the engine needs once an image is resolved and parsed.
pub struct ResolvedImage {
	pub reference: String,
	pub manifest: Manifest,
	pub config: ImageConfig,
	pub chain: Vec<String>,
}

/// The config must name exactly one uncompressed digest per manifest layer;
/// anything else makes the image unusable for unpacking.
fn validate_rootfs(manifest: &Manifest, config: &ImageConfig) -> Result<(), EngineError> {
	let diff_ids = config
		.rootfs
		.as_ref()
		.map(|rootfs| rootfs.diff_ids.len())
		.unwrap_or(0);
	if diff_ids == 0 {
		return Err(EngineError::new(
			ErrorKind::ImageInvalid,
			Stage::Unpack,
			format!("image config {} has no rootfs diff_ids", manifest.config.digest),
		));
	}
	if diff_ids != manifest.layers.len() {
		return Err(EngineError::new(
			ErrorKind::ImageInvalid,
			Stage::Unpack,
			format!(
				"manifest lists {} layers but config has {} diff_ids",
				manifest.layers.len(),
				diff_ids
			),
		));
	}
	Ok(())
}

#[derive(Clone)]
pub struct ImageResolver {
	client: RuntimeClient,
}

impl ImageResolver {
	pub fn new(client: RuntimeClient) -> Self {
		ImageResolver { client }
	}

	/// Look the reference up in the image store, trying each shorthand
	/// expansion. Returns the matching name and its target descriptor.
	pub async fn resolve_target(
		&self,
		reference: &str,
	) -> Result<(String, Descriptor), EngineError> {
		let tried = candidates(reference);
		for name in &tried {
			let mut images = self.client.images.clone();
			match rpc(
				deadline::IMAGE_READ,
				images.get(GetImageRequest { name: name.clone() }),
			)
			.await
			{
				Ok(response) => {
					let image = response.into_inner().image.ok_or_else(|| {
						EngineError::new(
							ErrorKind::ImageInvalid,
							Stage::Unpack,
							format!("image store returned an empty record for {name}"),
						)
					})?;
					let target = image.target.ok_or_else(|| {
						EngineError::new(
							ErrorKind::ImageInvalid,
							Stage::Unpack,
							format!("image {name} has no target descriptor"),
						)
					})?;
					return Ok((image.name, target));
				}
				Err(status) if status.code() == tonic::Code::NotFound => continue,
				Err(status) => return Err(EngineError::from_status(Stage::Unpack, status)),
			}
		}
		Err(EngineError::new(
			ErrorKind::NotFound,
			Stage::Unpack,
			format!("image {reference} not in store (tried {tried:?})"),
		))
	}

	/// Resolve an image reference down to its concrete, platform-specific
	/// manifest descriptor.
	pub async fn resolve_manifest(&self, reference: &str) -> Result<Descriptor, EngineError> {
		let (_, target) = self.resolve_target(reference).await?;
		self.concrete_manifest(target).await
	}

	/// Walk index manifests down to the platform manifest. A missing
	/// platform match falls back to the first entry; permissive on purpose.
	pub async fn concrete_manifest(
		&self,
		mut descriptor: Descriptor,
	) -> Result<Descriptor, EngineError> {
		// Indexes only ever nest one level in practice; two keeps us safe.
		for _ in 0..2 {
			if is_manifest(&descriptor.media_type) {
				return Ok(descriptor);
			}
			if !is_index(&descriptor.media_type) {
				return Err(EngineError::new(
					ErrorKind::ImageInvalid,
					Stage::Unpack,
					format!("unsupported manifest media type {}", descriptor.media_type),
				));
			}

			let raw = self.read_blob(&descriptor.digest).await?;
			let index: ImageIndex = serde_json::from_slice(&raw).map_err(|err| {
				EngineError::new(
					ErrorKind::ImageInvalid,
					Stage::Unpack,
					format!("cannot parse index {}: {err}", descriptor.digest),
				)
			})?;
			if index.manifests.is_empty() {
				return Err(EngineError::new(
					ErrorKind::ImageInvalid,
					Stage::Unpack,
					format!("index {} lists no manifests", descriptor.digest),
				));
			}

			let (want_os, want_arch) = host_platform();
			let selected = index
				.manifests
				.iter()
				.find(|entry| {
					entry.platform.as_ref().is_some_and(|platform| {
						platform.os == want_os && platform.architecture == want_arch
					})
				})
				.unwrap_or_else(|| {
					tracing::warn!(
						os = want_os,
						arch = want_arch,
						digest = %index.manifests[0].digest,
						"no manifest for host platform, falling back to first entry"
					);
					&index.manifests[0]
				});
			descriptor = Descriptor {
				media_type: selected.media_type.clone(),
				digest: selected.digest.clone(),
				size: selected.size,
				annotations: Default::default(),
			};
		}
		Err(EngineError::new(
			ErrorKind::ImageInvalid,
			Stage::Unpack,
			"manifest index nesting exceeded two levels",
		))
	}

	/// Stream a blob out of the content store, chunk by chunk.
	pub async fn read_blob(&self, digest: &str) -> Result<Vec<u8>, EngineError> {
		let mut content = self.client.content.clone();
		let digest = digest.to_string();
		let read_all = async move {
			let mut stream = content
				.read(ReadContentRequest {
					digest,
					offset: 0,
					size: 0,
				})
				.await?
				.into_inner();
			let mut buffer = Vec::new();
			while let Some(chunk) = stream.message().await? {
				buffer.extend_from_slice(&chunk.data);
			}
			Ok::<_, tonic::Status>(buffer)
		};
		match tokio::time::timeout(deadline::IMAGE_READ, read_all).await {
			Ok(Ok(buffer)) => Ok(buffer),
			Ok(Err(status)) => Err(EngineError::from_status(Stage::Unpack, status)),
			Err(_) => Err(EngineError::new(
				ErrorKind::RuntimeRpc,
				Stage::Unpack,
				format!("blob read exceeded {:?}", deadline::IMAGE_READ),
			)),
		}
	}

	/// Whether the content store holds a blob.
	pub async fn blob_exists(&self, digest: &str) -> Result<bool, EngineError> {
		let mut content = self.client.content.clone();
		match rpc(
			deadline::IMAGE_READ,
			content.info(InfoRequest {
				digest: digest.to_string(),
			}),
		)
		.await
		{
			Ok(_) => Ok(true),
			Err(status) if status.code() == tonic::Code::NotFound => Ok(false),
			Err(status) => Err(EngineError::from_status(Stage::Unpack, status)),
		}
	}

	/// Fetch and parse the manifest and image config behind a descriptor,
	/// validating the layer list against the config's diff_ids.
	pub async fn load_manifest_and_config(
		&self,
		descriptor: &Descriptor,
	) -> Result<(Manifest, ImageConfig), EngineError> {
		let raw = self.read_blob(&descriptor.digest).await?;
		let manifest: Manifest = serde_json::from_slice(&raw).map_err(|err| {
			EngineError::new(
				ErrorKind::ImageInvalid,
				Stage::Unpack,
				format!("cannot parse manifest {}: {err}", descriptor.digest),
			)
		})?;

		let raw = self.read_blob(&manifest.config.digest).await?;
		let config: ImageConfig = serde_json::from_slice(&raw).map_err(|err| {
			EngineError::new(
				ErrorKind::ImageInvalid,
				Stage::Unpack,
				format!("cannot parse image config {}: {err}", manifest.config.digest),
			)
		})?;

		validate_rootfs(&manifest, &config)?;
		Ok((manifest, config))
	}

	/// Full resolution: reference to manifest, config and chain IDs.
	pub async fn resolve(&self, reference: &str) -> Result<ResolvedImage, EngineError> {
		let (name, target) = self.resolve_target(reference).await?;
		let descriptor = self.concrete_manifest(target).await?;
		let (manifest, config) = self.load_manifest_and_config(&descriptor).await?;
		let chain = chain_ids(
			&config
				.rootfs
				.as_ref()
				.expect("diff_ids validated by load_manifest_and_config")
				.diff_ids,
		);
		Ok(ResolvedImage {
			reference: name,
			manifest,
			config,
			chain,
		})
	}

	/// Canonical snapshot name for an image's full rootfs stack.
	pub async fn chain_id_for_image(&self, reference: &str) -> Result<String, EngineError> {
		let resolved = self.resolve(reference).await?;
		Ok(resolved
			.chain
			.last()
			.expect("chain is non-empty when diff_ids validated")
			.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_names_expand_to_library_latest() {
		assert_eq!(
			candidates("nginx"),
			vec!["nginx:latest", "docker.io/library/nginx:latest"]
		);
	}

	#[test]
	fn tagged_and_digested_refs_pass_through() {
		assert_eq!(candidates("nginx:1.25"), vec![
			"nginx:1.25",
			"docker.io/library/nginx:1.25"
		]);
		assert_eq!(
			candidates("registry.k8s.io/pause:3.9"),
			vec!["registry.k8s.io/pause:3.9"]
		);
		assert_eq!(
			candidates("docker.io/library/alpine@sha256:abcd"),
			vec!["docker.io/library/alpine@sha256:abcd"]
		);
	}

	#[test]
	fn registry_with_port_is_not_mistaken_for_a_tag() {
		assert_eq!(
			candidates("localhost:5000/app"),
			vec!["localhost:5000/app:latest"]
		);
	}

	#[test]
	fn chain_id_recursion_matches_documented_vectors() {
		let diff_ids = vec!["sha256:aa".to_string(), "sha256:bb".to_string()];
		let chain = chain_ids(&diff_ids);
		assert_eq!(chain[0], "sha256:aa");
		assert_eq!(
			chain[1],
			"sha256:b68ad689d6d1ec110ea1c13617437ad6f3766d4b3b309f6a603a222e07a0164f"
		);

		let three = chain_ids(&[
			"sha256:aa".to_string(),
			"sha256:bb".to_string(),
			"sha256:cc".to_string(),
		]);
		assert_eq!(three[0], chain[0]);
		assert_eq!(three[1], chain[1]);
		assert_eq!(
			three[2],
			"sha256:ced946a3b9b1c697ead0fa9bf9ad36e03198566077f3950076f64a4760acde1b"
		);
	}

	#[test]
	fn chain_ids_of_empty_list_is_empty() {
		assert!(chain_ids(&[]).is_empty());
	}

	#[test]
	fn mismatched_layer_and_diff_id_counts_are_invalid() {
		let manifest: Manifest = serde_json::from_str(
			r#"{
				"config": {"mediaType":"application/vnd.oci.image.config.v1+json","digest":"sha256:cfg","size":10},
				"layers": [
					{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","digest":"sha256:l1","size":1},
					{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","digest":"sha256:l2","size":2}
				]
			}"#,
		)
		.unwrap();

		let good: ImageConfig =
			serde_json::from_str(r#"{"rootfs":{"diff_ids":["sha256:aa","sha256:bb"]}}"#).unwrap();
		assert!(validate_rootfs(&manifest, &good).is_ok());

		let short: ImageConfig =
			serde_json::from_str(r#"{"rootfs":{"diff_ids":["sha256:aa"]}}"#).unwrap();
		let err = validate_rootfs(&manifest, &short).unwrap_err();
		assert_eq!(err.kind, ErrorKind::ImageInvalid);

		let none: ImageConfig = serde_json::from_str(r#"{}"#).unwrap();
		let err = validate_rootfs(&manifest, &none).unwrap_err();
		assert_eq!(err.kind, ErrorKind::ImageInvalid);
	}

	#[test]
	fn media_type_discrimination() {
		assert!(is_index(OCI_INDEX));
		assert!(is_index(DOCKER_LIST));
		assert!(is_manifest(OCI_MANIFEST));
		assert!(is_manifest(DOCKER_MANIFEST));
		assert!(!is_manifest(OCI_INDEX));
		assert!(!is_index(DOCKER_MANIFEST));
	}
}
