//! Token endpoint request/response records.

// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::ClientConfigError, protocol, provider::ServiceConfig};

const RESERVED: &[&str] = &[
	"client_id",
	"grant_type",
	"code",
	"redirect_uri",
	"refresh_token",
	"scope",
	"code_verifier",
];

/// Grant types the token endpoint client can exercise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization code exchange after a completed authorization flow.
	AuthorizationCode,
	/// Refresh-token-for-token exchange.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 wire identifier.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Immutable token endpoint request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenRequest {
	/// Provider metadata the request targets.
	pub config: ServiceConfig,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Grant being exercised.
	pub grant_type: GrantType,
	/// Authorization code (authorization_code grant).
	pub code: Option<String>,
	/// Redirect URI the code was issued against (authorization_code grant).
	pub redirect_uri: Option<Url>,
	/// Refresh token (refresh_token grant).
	pub refresh_token: Option<String>,
	/// Scope narrowing for the exchange.
	pub scope: Option<String>,
	/// PKCE code verifier proving possession of the original challenge.
	pub code_verifier: Option<String>,
	/// Nonce from the originating authorization request, used to validate the
	/// returned ID Token. Not emitted on the wire.
	pub nonce: Option<String>,
	/// Extra form parameters.
	pub additional_parameters: BTreeMap<String, String>,
}
impl TokenRequest {
	/// Returns a builder for the provided grant.
	pub fn builder(
		config: ServiceConfig,
		client_id: impl Into<String>,
		grant_type: GrantType,
	) -> TokenRequestBuilder {
		TokenRequestBuilder {
			config,
			client_id: client_id.into(),
			grant_type,
			code: None,
			redirect_uri: None,
			refresh_token: None,
			scope: None,
			code_verifier: None,
			nonce: None,
			additional_parameters: BTreeMap::new(),
		}
	}

	/// Convenience builder for a refresh-token exchange.
	pub fn refresh(
		config: ServiceConfig,
		client_id: impl Into<String>,
		refresh_token: impl Into<String>,
	) -> Result<Self, ClientConfigError> {
		Self::builder(config, client_id, GrantType::RefreshToken)
			.refresh_token(refresh_token)
			.build()
	}

	/// Encodes the request as form key/value pairs.
	///
	/// `client_id` is always present in the body; confidential client
	/// authentication layers its own material on top (header or extra
	/// parameters) at the exchange boundary.
	pub fn to_form_parameters(&self) -> Vec<(String, String)> {
		let mut params = vec![
			("grant_type".to_owned(), self.grant_type.as_str().to_owned()),
			("client_id".to_owned(), self.client_id.clone()),
		];

		if let Some(code) = &self.code {
			params.push(("code".to_owned(), code.clone()));
		}
		if let Some(redirect_uri) = &self.redirect_uri {
			params.push(("redirect_uri".to_owned(), redirect_uri.to_string()));
		}
		if let Some(refresh_token) = &self.refresh_token {
			params.push(("refresh_token".to_owned(), refresh_token.clone()));
		}
		if let Some(scope) = &self.scope {
			params.push(("scope".to_owned(), scope.clone()));
		}
		if let Some(verifier) = &self.code_verifier {
			params.push(("code_verifier".to_owned(), verifier.clone()));
		}
		for (key, value) in &self.additional_parameters {
			params.push((key.clone(), value.clone()));
		}

		params
	}

	/// Percent-encodes the form parameters into a request body (RFC 3986).
	pub fn to_form_body(&self) -> String {
		let mut serializer = form_urlencoded::Serializer::new(String::new());

		for (key, value) in self.to_form_parameters() {
			serializer.append_pair(&key, &value);
		}

		serializer.finish()
	}
}

/// Fixed-field builder for [`TokenRequest`]; validates then freezes.
#[derive(Clone, Debug)]
pub struct TokenRequestBuilder {
	config: ServiceConfig,
	client_id: String,
	grant_type: GrantType,
	code: Option<String>,
	redirect_uri: Option<Url>,
	refresh_token: Option<String>,
	scope: Option<String>,
	code_verifier: Option<String>,
	nonce: Option<String>,
	additional_parameters: BTreeMap<String, String>,
}
impl TokenRequestBuilder {
	/// Sets the authorization code.
	pub fn code(mut self, value: impl Into<String>) -> Self {
		self.code = Some(value.into());

		self
	}

	/// Sets the redirect URI the code was issued against.
	pub fn redirect_uri(mut self, value: Url) -> Self {
		self.redirect_uri = Some(value);

		self
	}

	/// Sets the refresh token.
	pub fn refresh_token(mut self, value: impl Into<String>) -> Self {
		self.refresh_token = Some(value.into());

		self
	}

	/// Sets the requested scope.
	pub fn scope(mut self, value: impl Into<String>) -> Self {
		self.scope = Some(value.into());

		self
	}

	/// Sets the PKCE code verifier.
	pub fn code_verifier(mut self, value: impl Into<String>) -> Self {
		self.code_verifier = Some(value.into());

		self
	}

	/// Carries the authorization request nonce for ID Token validation.
	pub fn nonce(mut self, value: impl Into<String>) -> Self {
		self.nonce = Some(value.into());

		self
	}

	/// Adds one additional form parameter.
	pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_parameters.insert(key.into(), value.into());

		self
	}

	/// Validates the assembled fields and freezes the request.
	pub fn build(self) -> Result<TokenRequest, ClientConfigError> {
		protocol::require_non_empty("client_id", &self.client_id)?;
		protocol::ensure_no_reserved(&self.additional_parameters, RESERVED)?;

		match self.grant_type {
			GrantType::AuthorizationCode => {
				if self.code.as_deref().is_none_or(|code| code.trim().is_empty()) {
					return Err(ClientConfigError::MissingArgument { name: "code".to_owned() });
				}

				let redirect_uri = self
					.redirect_uri
					.as_ref()
					.ok_or(ClientConfigError::MissingArgument {
						name: "redirect_uri".to_owned(),
					})?;

				protocol::validate_redirect_uri(redirect_uri)?;

				if let Some(verifier) = &self.code_verifier {
					crate::crypto::check_code_verifier(verifier)?;
				}
			},
			GrantType::RefreshToken =>
				if self.refresh_token.as_deref().is_none_or(|token| token.trim().is_empty()) {
					return Err(ClientConfigError::MissingArgument {
						name: "refresh_token".to_owned(),
					});
				},
		}

		Ok(TokenRequest {
			config: self.config,
			client_id: self.client_id,
			grant_type: self.grant_type,
			code: self.code,
			redirect_uri: self.redirect_uri,
			refresh_token: self.refresh_token,
			scope: self.scope,
			code_verifier: self.code_verifier,
			nonce: self.nonce,
			additional_parameters: self.additional_parameters,
		})
	}
}

/// Token endpoint response with `expires_in` resolved to an absolute expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Token type, usually `Bearer`.
	pub token_type: Option<String>,
	/// Issued access token.
	pub access_token: Option<String>,
	/// Absolute access token expiry computed from `expires_in`, when given.
	pub access_token_expiry: Option<OffsetDateTime>,
	/// Compact-form ID Token.
	pub id_token: Option<String>,
	/// Rotated refresh token, when the provider issued one.
	pub refresh_token: Option<String>,
	/// Granted scope as returned by the provider.
	pub scope: Option<String>,
	/// Unrecognized response fields.
	pub additional_parameters: BTreeMap<String, serde_json::Value>,
}
impl TokenResponse {
	/// Maps a decoded wire body onto the response, resolving `expires_in`
	/// against the provided clock instant.
	///
	/// An `expires_in` that pushes the expiry outside the representable
	/// instant range is a malformed body, not a panic.
	pub fn from_wire(wire: TokenResponseWire, now: OffsetDateTime) -> Result<Self> {
		let TokenResponseWire {
			token_type,
			access_token,
			expires_in,
			id_token,
			refresh_token,
			scope,
			additional_parameters,
		} = wire;
		let access_token_expiry = expires_in
			.map(|secs| {
				now.checked_add(Duration::seconds(secs)).ok_or_else(|| Error::MalformedResponse {
					message: format!("expires_in of {secs} seconds overflows the expiry instant"),
					path: Some("expires_in".into()),
				})
			})
			.transpose()?;

		Ok(Self {
			token_type,
			access_token,
			access_token_expiry,
			id_token,
			refresh_token,
			scope,
			additional_parameters,
		})
	}
}

/// Raw token endpoint JSON body as defined by RFC 6749 §5.1.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponseWire {
	/// `token_type` field.
	#[serde(default)]
	pub token_type: Option<String>,
	/// `access_token` field.
	#[serde(default)]
	pub access_token: Option<String>,
	/// `expires_in` field, relative seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// `id_token` field.
	#[serde(default)]
	pub id_token: Option<String>,
	/// `refresh_token` field.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// `scope` field.
	#[serde(default)]
	pub scope: Option<String>,
	/// Everything else in the body.
	#[serde(flatten)]
	pub additional_parameters: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn config() -> ServiceConfig {
		ServiceConfig::new(
			Url::parse("https://idp.example.com/authorize").expect("Authorize URL should parse."),
			Url::parse("https://idp.example.com/token").expect("Token URL should parse."),
		)
	}

	#[test]
	fn code_grant_requires_code_and_redirect() {
		let err = TokenRequest::builder(config(), "client-1", GrantType::AuthorizationCode)
			.redirect_uri(Url::parse("https://app.example.com/cb").expect("URL should parse."))
			.build()
			.expect_err("Missing code should be rejected.");

		assert!(matches!(err, ClientConfigError::MissingArgument { name } if name == "code"));

		let err = TokenRequest::builder(config(), "client-1", GrantType::AuthorizationCode)
			.code("ABC")
			.build()
			.expect_err("Missing redirect URI should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "redirect_uri")
		);
	}

	#[test]
	fn refresh_grant_requires_refresh_token() {
		let err = TokenRequest::builder(config(), "client-1", GrantType::RefreshToken)
			.build()
			.expect_err("Missing refresh token should be rejected.");

		assert!(
			matches!(err, ClientConfigError::MissingArgument { name } if name == "refresh_token")
		);
	}

	#[test]
	fn form_body_percent_encodes_values() {
		let request = TokenRequest::builder(config(), "client 1", GrantType::RefreshToken)
			.refresh_token("tok/en+value")
			.scope("openid profile")
			.build()
			.expect("Refresh request fixture should build.");
		let body = request.to_form_body();

		assert!(body.contains("grant_type=refresh_token"));
		assert!(body.contains("client_id=client+1"));
		assert!(body.contains("refresh_token=tok%2Fen%2Bvalue"));
		assert!(body.contains("scope=openid+profile"));
	}

	#[test]
	fn reserved_additional_parameter_is_rejected() {
		let err = TokenRequest::builder(config(), "client-1", GrantType::RefreshToken)
			.refresh_token("tok")
			.additional_parameter("grant_type", "password")
			.build()
			.expect_err("Reserved parameter collision should be rejected.");

		assert!(matches!(err, ClientConfigError::ReservedParameter { .. }));
	}

	#[test]
	fn wire_body_resolves_relative_expiry() {
		let wire: TokenResponseWire = serde_json::from_str(
			r#"{
				"access_token": "at-1",
				"token_type": "Bearer",
				"expires_in": 3600,
				"refresh_token": "rt-1",
				"scope": "openid",
				"custom_field": true
			}"#,
		)
		.expect("Wire body fixture should decode.");
		let now = macros::datetime!(2025-06-01 12:00 UTC);
		let response =
			TokenResponse::from_wire(wire, now).expect("In-range expiry should resolve.");

		assert_eq!(response.access_token.as_deref(), Some("at-1"));
		assert_eq!(
			response.access_token_expiry,
			Some(macros::datetime!(2025-06-01 13:00 UTC))
		);
		assert_eq!(
			response.additional_parameters.get("custom_field"),
			Some(&serde_json::Value::Bool(true))
		);
	}

	#[test]
	fn overflowing_expires_in_is_a_malformed_response() {
		let wire: TokenResponseWire = serde_json::from_str(
			r#"{"access_token":"at-1","expires_in":9223372036854775807}"#,
		)
		.expect("Wire body fixture should decode.");
		let err = TokenResponse::from_wire(wire, OffsetDateTime::now_utc())
			.expect_err("Out-of-range expiry should be rejected.");

		assert!(matches!(
			err,
			Error::MalformedResponse { path: Some(path), .. } if path == "expires_in"
		));
	}

	#[test]
	fn request_and_response_round_trip_through_json() {
		let request = TokenRequest::builder(config(), "client-1", GrantType::AuthorizationCode)
			.code("ABC")
			.redirect_uri(Url::parse("https://app.example.com/cb").expect("URL should parse."))
			.code_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk")
			.nonce("nonce-1")
			.additional_parameter("audience", "https://api.example.com")
			.build()
			.expect("Token request fixture should build.");
		let blob = serde_json::to_string(&request).expect("Request should serialize.");
		let round_trip: TokenRequest =
			serde_json::from_str(&blob).expect("Serialized request should deserialize.");

		assert_eq!(request, round_trip);

		let response = TokenResponse::from_wire(
			serde_json::from_str::<TokenResponseWire>(
				r#"{"access_token":"at","expires_in":60,"id_token":"x.y.z"}"#,
			)
			.expect("Wire body fixture should decode."),
			OffsetDateTime::now_utc(),
		)
		.expect("In-range expiry should resolve.");
		let blob = serde_json::to_string(&response).expect("Response should serialize.");
		let round_trip: TokenResponse =
			serde_json::from_str(&blob).expect("Serialized response should deserialize.");

		assert_eq!(response, round_trip);
	}
}
