//! CSRF/nonce token generation and PKCE primitives (RFC 7636).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, error::ClientConfigError};

/// Minimum entropy for opaque `state`/`nonce` tokens (128 bits).
pub const MIN_OPAQUE_ENTROPY: usize = 16;
/// Minimum entropy for PKCE code verifiers (RFC 7636 §4.1 lower bound).
pub const MIN_VERIFIER_ENTROPY: usize = 32;
/// Default entropy for PKCE code verifiers.
pub const DEFAULT_VERIFIER_ENTROPY: usize = 64;
/// Maximum entropy for PKCE code verifiers (RFC 7636 §4.1 upper bound).
pub const MAX_VERIFIER_ENTROPY: usize = 96;

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Generates an opaque, URL-safe, single-use token from a CSPRNG.
///
/// Used for the CSRF `state` parameter and the ID Token `nonce`. Requests for
/// fewer than [`MIN_OPAQUE_ENTROPY`] bytes are rejected rather than weakened.
pub fn generate_opaque_token(entropy_bytes: usize) -> Result<String, ClientConfigError> {
	if entropy_bytes < MIN_OPAQUE_ENTROPY {
		return Err(ClientConfigError::ConstraintViolation {
			reason: format!(
				"opaque tokens require at least {MIN_OPAQUE_ENTROPY} bytes of entropy, got {entropy_bytes}"
			),
		});
	}

	Ok(URL_SAFE_NO_PAD.encode(random_bytes(entropy_bytes)))
}

/// Generates a `state` token with the default entropy.
pub fn generate_state() -> String {
	URL_SAFE_NO_PAD.encode(random_bytes(MIN_OPAQUE_ENTROPY))
}

/// Generates a `nonce` token with the default entropy.
pub fn generate_nonce() -> String {
	generate_state()
}

/// Generates a PKCE code verifier from `entropy_bytes` of CSPRNG output.
///
/// Entropy outside [[`MIN_VERIFIER_ENTROPY`], [`MAX_VERIFIER_ENTROPY`]] is
/// rejected; the base64url encoding keeps the result inside the RFC 7636
/// charset and the 43..=128 length window.
pub fn generate_code_verifier(entropy_bytes: usize) -> Result<String, ClientConfigError> {
	if !(MIN_VERIFIER_ENTROPY..=MAX_VERIFIER_ENTROPY).contains(&entropy_bytes) {
		return Err(ClientConfigError::ConstraintViolation {
			reason: format!(
				"code verifier entropy must be within [{MIN_VERIFIER_ENTROPY}, {MAX_VERIFIER_ENTROPY}] bytes, got {entropy_bytes}"
			),
		});
	}

	let verifier = URL_SAFE_NO_PAD.encode(random_bytes(entropy_bytes));

	check_code_verifier(&verifier)?;

	Ok(verifier)
}

/// Validates a PKCE code verifier against the RFC 7636 charset and length rules.
pub fn check_code_verifier(candidate: &str) -> Result<(), ClientConfigError> {
	let len = candidate.len();

	if !(VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&len) {
		return Err(ClientConfigError::ConstraintViolation {
			reason: format!(
				"code verifier length must be within [{VERIFIER_MIN_LEN}, {VERIFIER_MAX_LEN}], got {len}"
			),
		});
	}
	if !candidate.chars().all(is_verifier_char) {
		return Err(ClientConfigError::ConstraintViolation {
			reason: "code verifier contains characters outside [A-Za-z0-9-._~]".into(),
		});
	}

	Ok(())
}

fn is_verifier_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn random_bytes(len: usize) -> Vec<u8> {
	let mut buf = vec![0_u8; len];

	rand::rng().fill_bytes(&mut buf);

	buf
}

/// PKCE challenge methods advertised to the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
	/// SHA-256 digest of the verifier (RFC 7636 S256).
	S256,
	/// Degraded mode where the challenge equals the verifier.
	Plain,
}
impl CodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the method.
	pub fn as_str(self) -> &'static str {
		match self {
			CodeChallengeMethod::S256 => "S256",
			CodeChallengeMethod::Plain => "plain",
		}
	}
}
impl Display for CodeChallengeMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Verifier/challenge pair binding an authorization request to its code exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
	verifier: String,
	/// Challenge value sent with the authorization request.
	pub challenge: String,
	/// Method used to derive the challenge.
	pub method: CodeChallengeMethod,
}
impl PkceChallenge {
	/// Generates a fresh pair with the default verifier entropy.
	pub fn generate() -> Self {
		let verifier = URL_SAFE_NO_PAD.encode(random_bytes(DEFAULT_VERIFIER_ENTROPY));
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self { verifier, challenge, method: CodeChallengeMethod::S256 }
	}

	/// Derives the S256 challenge for an existing verifier.
	pub fn derive(verifier: impl Into<String>) -> Result<Self, ClientConfigError> {
		let verifier = verifier.into();

		check_code_verifier(&verifier)?;

		let digest = Sha256::digest(verifier.as_bytes());
		let challenge = URL_SAFE_NO_PAD.encode(digest);

		Ok(Self { verifier, challenge, method: CodeChallengeMethod::S256 })
	}

	/// Builds a degraded `plain` pair for platforms without a SHA-256 primitive.
	///
	/// The pair is flagged via [`PkceChallenge::is_degraded`] and a warning is
	/// emitted so the downgrade never disappears from diagnostics.
	pub fn plain(verifier: impl Into<String>) -> Result<Self, ClientConfigError> {
		let verifier = verifier.into();

		check_code_verifier(&verifier)?;

		#[cfg(feature = "tracing")]
		tracing::warn!(
			method = "plain",
			"PKCE downgraded to the plain challenge method; S256 is unavailable"
		);

		Ok(Self { challenge: verifier.clone(), verifier, method: CodeChallengeMethod::Plain })
	}

	/// Exposes the secret verifier for the code exchange.
	pub fn verifier(&self) -> &str {
		&self.verifier
	}

	/// Returns `true` when the pair uses the degraded `plain` method.
	pub fn is_degraded(&self) -> bool {
		matches!(self.method, CodeChallengeMethod::Plain)
	}
}
impl Debug for PkceChallenge {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceChallenge")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn opaque_token_rejects_insufficient_entropy() {
		assert!(generate_opaque_token(15).is_err());
		assert!(generate_opaque_token(16).is_ok());
	}

	#[test]
	fn opaque_tokens_are_unique() {
		assert_ne!(generate_state(), generate_state());
	}

	#[test]
	fn verifier_entropy_bounds_are_enforced() {
		assert!(generate_code_verifier(31).is_err());
		assert!(generate_code_verifier(97).is_err());

		let low = generate_code_verifier(32).expect("32 bytes of entropy should be accepted.");
		let high = generate_code_verifier(96).expect("96 bytes of entropy should be accepted.");

		assert_eq!(low.len(), 43);
		assert_eq!(high.len(), 128);
	}

	#[test]
	fn verifier_check_accepts_full_valid_range() {
		for len in VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN {
			let candidate = "a".repeat(len);

			assert!(check_code_verifier(&candidate).is_ok(), "length {len} should be accepted");
		}

		assert!(check_code_verifier(&"a".repeat(VERIFIER_MIN_LEN - 1)).is_err());
		assert!(check_code_verifier(&"a".repeat(VERIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn verifier_check_rejects_forbidden_characters() {
		let candidate = format!("{}+", "a".repeat(50));

		assert!(check_code_verifier(&candidate).is_err());
	}

	#[test]
	fn s256_challenge_matches_rfc_7636_test_vector() {
		let pair = PkceChallenge::derive("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk")
			.expect("RFC 7636 appendix verifier should be accepted.");

		assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
		assert_eq!(pair.method, CodeChallengeMethod::S256);
		assert!(!pair.is_degraded());
	}

	#[test]
	fn plain_challenge_is_flagged_degraded() {
		let verifier = generate_code_verifier(DEFAULT_VERIFIER_ENTROPY)
			.expect("Default entropy should produce a valid verifier.");
		let pair = PkceChallenge::plain(verifier.clone())
			.expect("Plain challenge should accept a valid verifier.");

		assert_eq!(pair.challenge, verifier);
		assert!(pair.is_degraded());
	}
}
