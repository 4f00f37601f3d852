//! Compact ID Token decoding and OpenID Connect Core validation.
//!
//! Signature verification is deliberately absent: tokens arrive over the
//! TLS-authenticated channel to the token endpoint, which is the trust anchor
//! for this family of clients. Validation is claim-based and fail-fast, one
//! distinct error per rule.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	error::IdTokenValidationError,
	protocol::{GrantType, TokenRequest},
};

/// Maximum tolerated deviation between the token's `iat` and the local clock.
const ISSUED_AT_MAX_SKEW: Duration = Duration::seconds(600);

/// Decoded ID Token claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdToken {
	/// `iss` claim.
	pub issuer: String,
	/// `sub` claim.
	pub subject: String,
	/// `aud` claim, normalized to a list.
	pub audience: Vec<String>,
	/// `exp` claim, epoch seconds.
	pub expiration: i64,
	/// `iat` claim, epoch seconds.
	pub issued_at: i64,
	/// `nonce` claim, when bound at authorization time.
	pub nonce: Option<String>,
	/// `azp` claim.
	pub authorized_party: Option<String>,
	/// Remaining claims, untouched.
	pub extra_claims: BTreeMap<String, serde_json::Value>,
}
impl IdToken {
	/// Decodes a compact serialized token (`header.claims.signature`).
	///
	/// Requires at least two dot-separated sections; the header is checked only
	/// for structural validity and the signature section is ignored.
	pub fn parse(compact: &str) -> Result<Self, IdTokenValidationError> {
		let mut sections = compact.split('.');
		let header = sections.next().filter(|s| !s.is_empty()).ok_or_else(|| {
			IdTokenValidationError::Malformed { message: "missing header section".into() }
		})?;
		let claims = sections.next().filter(|s| !s.is_empty()).ok_or_else(|| {
			IdTokenValidationError::Malformed { message: "missing claims section".into() }
		})?;

		// Header content is irrelevant, but it must at least be base64url JSON.
		let _: serde_json::Value = decode_section(header, "header")?;

		let claims: Claims = decode_section(claims, "claims")?;

		Ok(Self {
			issuer: claims.iss,
			subject: claims.sub,
			audience: claims.aud.into_vec(),
			expiration: claims.exp,
			issued_at: claims.iat,
			nonce: claims.nonce,
			authorized_party: claims.azp,
			extra_claims: claims.extra,
		})
	}

	/// Validates the claims against the originating token request.
	///
	/// `relax_issuer_https` disables the issuer https/host/query checks and
	/// exists for tests against plain-HTTP mock providers only.
	pub fn validate(
		&self,
		request: &TokenRequest,
		now: OffsetDateTime,
		relax_issuer_https: bool,
	) -> Result<(), IdTokenValidationError> {
		if let Some(expected) = &request.config.issuer {
			self.check_issuer(expected, relax_issuer_https)?;
		}

		self.check_audience(&request.client_id)?;

		let now = now.unix_timestamp();

		if now > self.expiration {
			return Err(IdTokenValidationError::Expired { expiration: self.expiration });
		}
		// Checked arithmetic keeps extreme iat claims a validation error
		// rather than an integer overflow.
		let skew = now.checked_sub(self.issued_at).map(i64::unsigned_abs);

		if skew.is_none_or(|skew| skew > ISSUED_AT_MAX_SKEW.whole_seconds().unsigned_abs()) {
			return Err(IdTokenValidationError::IssuedAtOutOfSkew { issued_at: self.issued_at });
		}

		// Nonce binding only applies to the code exchange; refreshes reuse an
		// ID Token minted for an earlier request.
		if request.grant_type == GrantType::AuthorizationCode
			&& request.nonce != self.nonce
		{
			return Err(IdTokenValidationError::NonceMismatch);
		}

		Ok(())
	}

	fn check_issuer(
		&self,
		expected: &Url,
		relax_issuer_https: bool,
	) -> Result<(), IdTokenValidationError> {
		if self.issuer != trim_trailing_slash(expected.as_str())
			&& self.issuer != expected.as_str()
		{
			return Err(IdTokenValidationError::IssuerMismatch {
				expected: expected.to_string(),
				found: self.issuer.clone(),
			});
		}
		if relax_issuer_https {
			return Ok(());
		}

		let issuer = Url::parse(&self.issuer).map_err(|_| {
			IdTokenValidationError::IssuerUnparsable { issuer: self.issuer.clone() }
		})?;

		if issuer.scheme() != "https" {
			return Err(IdTokenValidationError::InsecureIssuer { issuer: self.issuer.clone() });
		}
		if issuer.host_str().is_none_or(str::is_empty) {
			return Err(IdTokenValidationError::MissingIssuerHost { issuer: self.issuer.clone() });
		}
		if issuer.query().is_some() || issuer.fragment().is_some() {
			return Err(IdTokenValidationError::IssuerQueryOrFragment {
				issuer: self.issuer.clone(),
			});
		}

		Ok(())
	}

	fn check_audience(&self, client_id: &str) -> Result<(), IdTokenValidationError> {
		if self.audience.iter().any(|aud| aud == client_id) {
			return Ok(());
		}
		if self.authorized_party.as_deref() == Some(client_id) {
			return Ok(());
		}

		Err(IdTokenValidationError::AudienceMismatch { client_id: client_id.to_owned() })
	}
}

fn decode_section<T>(section: &str, label: &str) -> Result<T, IdTokenValidationError>
where
	T: serde::de::DeserializeOwned,
{
	let bytes = URL_SAFE_NO_PAD.decode(section).map_err(|e| IdTokenValidationError::Malformed {
		message: format!("{label} section is not base64url: {e}"),
	})?;

	serde_json::from_slice(&bytes).map_err(|e| IdTokenValidationError::Malformed {
		message: format!("{label} section is not valid JSON: {e}"),
	})
}

fn trim_trailing_slash(value: &str) -> &str {
	value.strip_suffix('/').unwrap_or(value)
}

#[derive(Deserialize)]
struct Claims {
	iss: String,
	sub: String,
	aud: Audience,
	exp: i64,
	iat: i64,
	#[serde(default)]
	nonce: Option<String>,
	#[serde(default)]
	azp: Option<String>,
	#[serde(flatten)]
	extra: BTreeMap<String, serde_json::Value>,
}

/// `aud` may be a single string or an array of strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
	One(String),
	Many(Vec<String>),
}
impl Audience {
	fn into_vec(self) -> Vec<String> {
		match self {
			Audience::One(value) => vec![value],
			Audience::Many(values) => values,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::ServiceConfig;

	fn encode_token(claims: serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
		let claims = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());

		format!("{header}.{claims}.sig")
	}

	fn config() -> ServiceConfig {
		ServiceConfig::new(
			Url::parse("https://idp.example.com/authorize").expect("Authorize URL should parse."),
			Url::parse("https://idp.example.com/token").expect("Token URL should parse."),
		)
		.with_issuer(Url::parse("https://idp.example.com").expect("Issuer URL should parse."))
	}

	fn code_request(nonce: Option<&str>) -> TokenRequest {
		let mut builder = TokenRequest::builder(config(), "client-1", GrantType::AuthorizationCode)
			.code("ABC")
			.redirect_uri(Url::parse("https://app.example.com/cb").expect("URL should parse."));

		if let Some(nonce) = nonce {
			builder = builder.nonce(nonce);
		}

		builder.build().expect("Token request fixture should build.")
	}

	fn claims(now: OffsetDateTime) -> serde_json::Value {
		serde_json::json!({
			"iss": "https://idp.example.com",
			"sub": "user-1",
			"aud": "client-1",
			"exp": now.unix_timestamp() + 300,
			"iat": now.unix_timestamp(),
			"nonce": "nonce-1"
		})
	}

	#[test]
	fn parse_rejects_single_section_tokens() {
		let err = IdToken::parse("only-one-section")
			.expect_err("A token without a claims section should be rejected.");

		assert!(matches!(err, IdTokenValidationError::Malformed { .. }));
	}

	#[test]
	fn parse_normalizes_audience_forms() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["aud"] = serde_json::json!(["client-1", "other"]);

		let token = IdToken::parse(&encode_token(body))
			.expect("Array-audience token should parse.");

		assert_eq!(token.audience, vec!["client-1".to_owned(), "other".to_owned()]);
	}

	#[test]
	fn valid_token_passes_validation() {
		let now = OffsetDateTime::now_utc();
		let token = IdToken::parse(&encode_token(claims(now))).expect("Token should parse.");

		token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect("Valid token should pass validation.");
	}

	#[test]
	fn issuer_mismatch_is_rejected() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["iss"] = serde_json::json!("https://evil.example.com");

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect_err("Foreign issuer should be rejected.");

		assert!(matches!(err, IdTokenValidationError::IssuerMismatch { .. }));
	}

	#[test]
	fn audience_must_include_client_or_azp() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["aud"] = serde_json::json!("someone-else");

		let token = IdToken::parse(&encode_token(body.clone())).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect_err("Foreign audience without azp should be rejected.");

		assert!(matches!(err, IdTokenValidationError::AudienceMismatch { .. }));

		body["azp"] = serde_json::json!("client-1");

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");

		token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect("Matching azp should compensate for a foreign audience.");
	}

	#[test]
	fn expired_token_is_rejected() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["exp"] = serde_json::json!(now.unix_timestamp() - 1);

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect_err("Expired token should be rejected.");

		assert!(matches!(err, IdTokenValidationError::Expired { .. }));
	}

	#[test]
	fn issued_at_outside_skew_window_is_rejected() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["iat"] = serde_json::json!(now.unix_timestamp() - 601);

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect_err("Stale issued-at should be rejected.");

		assert!(matches!(err, IdTokenValidationError::IssuedAtOutOfSkew { .. }));
	}

	#[test]
	fn extreme_issued_at_is_rejected_without_overflow() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body["iat"] = serde_json::json!(i64::MIN);

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("nonce-1")), now, false)
			.expect_err("Extreme issued-at should be rejected.");

		assert!(matches!(err, IdTokenValidationError::IssuedAtOutOfSkew { .. }));
	}

	#[test]
	fn nonce_mismatch_is_rejected_for_code_grant() {
		let now = OffsetDateTime::now_utc();
		let token = IdToken::parse(&encode_token(claims(now))).expect("Token should parse.");
		let err = token
			.validate(&code_request(Some("different-nonce")), now, false)
			.expect_err("Nonce mismatch should be rejected.");

		assert_eq!(err, IdTokenValidationError::NonceMismatch);

		let err = token
			.validate(&code_request(None), now, false)
			.expect_err("Token nonce without a request nonce should be rejected.");

		assert_eq!(err, IdTokenValidationError::NonceMismatch);
	}

	#[test]
	fn nonce_is_ignored_for_refresh_grant() {
		let now = OffsetDateTime::now_utc();
		let token = IdToken::parse(&encode_token(claims(now))).expect("Token should parse.");
		let request = TokenRequest::refresh(config(), "client-1", "rt-1")
			.expect("Refresh request fixture should build.");

		token
			.validate(&request, now, false)
			.expect("Refresh exchanges should skip the nonce rule.");
	}

	#[test]
	fn both_nonces_absent_passes() {
		let now = OffsetDateTime::now_utc();
		let mut body = claims(now);

		body.as_object_mut().expect("Claims should be an object.").remove("nonce");

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");

		token
			.validate(&code_request(None), now, false)
			.expect("Both-absent nonces should pass.");
	}

	#[test]
	fn insecure_issuer_is_rejected_unless_relaxed() {
		let now = OffsetDateTime::now_utc();
		let config = ServiceConfig::new(
			Url::parse("http://127.0.0.1:8080/authorize").expect("URL should parse."),
			Url::parse("http://127.0.0.1:8080/token").expect("URL should parse."),
		)
		.with_issuer(Url::parse("http://127.0.0.1:8080").expect("Issuer URL should parse."));
		let request = TokenRequest::builder(config, "client-1", GrantType::AuthorizationCode)
			.code("ABC")
			.redirect_uri(Url::parse("https://app.example.com/cb").expect("URL should parse."))
			.nonce("nonce-1")
			.build()
			.expect("Token request fixture should build.");
		let mut body = claims(now);

		body["iss"] = serde_json::json!("http://127.0.0.1:8080");

		let token = IdToken::parse(&encode_token(body)).expect("Token should parse.");
		let err = token
			.validate(&request, now, false)
			.expect_err("Plain-HTTP issuer should be rejected by default.");

		assert!(matches!(err, IdTokenValidationError::InsecureIssuer { .. }));

		token
			.validate(&request, now, true)
			.expect("Relaxed mode should accept a plain-HTTP issuer.");
	}
}
