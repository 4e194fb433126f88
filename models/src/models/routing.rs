use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Both queue names and credential hashes are truncated to this length.
pub const ROUTE_KEY_LEN: usize = 48;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("routing secret must not be empty")]
pub struct EmptySecret;

/// Keyed-hostname router: derives stable, opaque routing keys from logical
/// endpoint names under a shared secret. The same construction hashes
/// credentials, so stored passwords never appear in plaintext either.
#[derive(Clone)]
pub struct RouteKey {
	secret: Vec<u8>,
}

impl RouteKey {
	pub fn new(secret: &str) -> Result<Self, EmptySecret> {
		if secret.is_empty() {
			return Err(EmptySecret);
		}
		Ok(RouteKey {
			secret: secret.as_bytes().to_vec(),
		})
	}

	fn keyed48(&self, phrase: &str) -> String {
		let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
			.expect("HMAC-SHA256 accepts keys of any length");
		mac.update(phrase.as_bytes());
		let digest = hex::encode(mac.finalize().into_bytes());
		digest[..ROUTE_KEY_LEN].to_string()
	}

	/// Queue name and routing key for a logical endpoint.
	pub fn route_key(&self, logical_name: &str) -> String {
		self.keyed48(logical_name)
	}

	/// Keyed hash of a credential, comparable with the registry copy.
	pub fn credential_hash(&self, password: &str) -> String {
		self.keyed48(password)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_secret_is_rejected() {
		assert!(RouteKey::new("").is_err());
		assert!(RouteKey::new("k").is_ok());
	}

	#[test]
	fn keys_are_deterministic_and_bounded() {
		let router = RouteKey::new("orchestrator-secret").unwrap();
		let a = router.route_key("worker-a.internal");
		let b = router.route_key("worker-a.internal");
		assert_eq!(a, b);
		assert_eq!(a.len(), ROUTE_KEY_LEN);
		assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(a, router.route_key("worker-b.internal"));
	}

	#[test]
	fn known_vector() {
		// First 48 hex chars of HMAC-SHA256("k", "aws_interface").
		let router = RouteKey::new("k").unwrap();
		assert_eq!(
			router.route_key("aws_interface"),
			"4b322fa7311e0162d16d13779d93e20002147bc3174612b6"
		);
	}

	#[test]
	fn credential_hash_matches_route_key_construction() {
		let router = RouteKey::new("k").unwrap();
		assert_eq!(
			router.credential_hash("aws_interface"),
			router.route_key("aws_interface")
		);
	}
}
