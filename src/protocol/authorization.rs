//! Authorization endpoint request/response records.

// self
use crate::{
	_prelude::*,
	crypto::{self, PkceChallenge},
	error::ClientConfigError,
	protocol::{self, GrantType, TokenRequest},
	provider::ServiceConfig,
};

const RESERVED: &[&str] = &[
	"client_id",
	"response_type",
	"redirect_uri",
	"scope",
	"state",
	"nonce",
	"code_challenge",
	"code_challenge_method",
];

/// Immutable authorization request dispatched to the external user-agent.
///
/// The `state` token is single-use CSRF material and the `nonce` binds the
/// eventual ID Token to this request; both default to freshly generated
/// high-entropy values when not supplied to the builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
	/// Provider metadata the request targets.
	pub config: ServiceConfig,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Response type, `code` for the flows this crate drives.
	pub response_type: String,
	/// Redirect URI the provider will send the user-agent back to.
	pub redirect_uri: Url,
	/// Requested scope string, space-delimited.
	pub scope: Option<String>,
	/// Opaque CSRF token echoed by the provider.
	pub state: String,
	/// Opaque replay-mitigation value bound into the ID Token.
	pub nonce: String,
	/// PKCE verifier/challenge pair, when the client uses PKCE.
	pub code_challenge: Option<PkceChallenge>,
	/// Extra parameters appended to the request URI.
	pub additional_parameters: BTreeMap<String, String>,
}
impl AuthorizationRequest {
	/// Returns a builder for the mandatory request fields.
	pub fn builder(config: ServiceConfig, client_id: impl Into<String>, redirect_uri: Url) -> AuthorizationRequestBuilder {
		AuthorizationRequestBuilder {
			config,
			client_id: client_id.into(),
			response_type: "code".into(),
			redirect_uri,
			scope: None,
			state: None,
			nonce: None,
			code_challenge: None,
			additional_parameters: BTreeMap::new(),
		}
	}

	/// Encodes the request as the outbound authorization URI.
	pub fn to_request_uri(&self) -> Url {
		let mut url = self.config.authorization_endpoint.clone();

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("response_type", &self.response_type);
			pairs.append_pair("client_id", &self.client_id);
			pairs.append_pair("redirect_uri", self.redirect_uri.as_str());

			if let Some(scope) = &self.scope {
				pairs.append_pair("scope", scope);
			}

			pairs.append_pair("state", &self.state);
			pairs.append_pair("nonce", &self.nonce);

			if let Some(pkce) = &self.code_challenge {
				pairs.append_pair("code_challenge", &pkce.challenge);
				pairs.append_pair("code_challenge_method", pkce.method.as_str());
			}
			for (key, value) in &self.additional_parameters {
				pairs.append_pair(key, value);
			}
		}

		url
	}
}

/// Fixed-field builder for [`AuthorizationRequest`]; validates then freezes.
#[derive(Clone, Debug)]
pub struct AuthorizationRequestBuilder {
	config: ServiceConfig,
	client_id: String,
	response_type: String,
	redirect_uri: Url,
	scope: Option<String>,
	state: Option<String>,
	nonce: Option<String>,
	code_challenge: Option<PkceChallenge>,
	additional_parameters: BTreeMap<String, String>,
}
impl AuthorizationRequestBuilder {
	/// Overrides the response type (defaults to `code`).
	pub fn response_type(mut self, value: impl Into<String>) -> Self {
		self.response_type = value.into();

		self
	}

	/// Sets the requested scope.
	pub fn scope(mut self, value: impl Into<String>) -> Self {
		self.scope = Some(value.into());

		self
	}

	/// Overrides the generated `state` token.
	pub fn state(mut self, value: impl Into<String>) -> Self {
		self.state = Some(value.into());

		self
	}

	/// Overrides the generated `nonce`.
	pub fn nonce(mut self, value: impl Into<String>) -> Self {
		self.nonce = Some(value.into());

		self
	}

	/// Attaches a PKCE verifier/challenge pair.
	pub fn code_challenge(mut self, pkce: PkceChallenge) -> Self {
		self.code_challenge = Some(pkce);

		self
	}

	/// Adds one additional request parameter.
	pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_parameters.insert(key.into(), value.into());

		self
	}

	/// Validates the assembled fields and freezes the request.
	pub fn build(self) -> Result<AuthorizationRequest, ClientConfigError> {
		protocol::require_non_empty("client_id", &self.client_id)?;
		protocol::require_non_empty("response_type", &self.response_type)?;
		protocol::validate_redirect_uri(&self.redirect_uri)?;
		protocol::ensure_no_reserved(&self.additional_parameters, RESERVED)?;

		Ok(AuthorizationRequest {
			config: self.config,
			client_id: self.client_id,
			response_type: self.response_type,
			redirect_uri: self.redirect_uri,
			scope: self.scope,
			state: self.state.unwrap_or_else(crypto::generate_state),
			nonce: self.nonce.unwrap_or_else(crypto::generate_nonce),
			code_challenge: self.code_challenge,
			additional_parameters: self.additional_parameters,
		})
	}
}

/// Authorization response parsed from the redirect callback URI.
///
/// Carries the originating request so the later code exchange and ID Token
/// validation can consult the request's PKCE verifier and nonce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
	/// The request this response answers.
	pub request: AuthorizationRequest,
	/// Authorization code, when the provider granted one.
	pub code: Option<String>,
	/// Echoed `state` parameter as received.
	pub state: Option<String>,
	/// Unrecognized callback parameters.
	pub additional_parameters: BTreeMap<String, String>,
}
impl AuthorizationResponse {
	/// Parses the callback query parameters against the originating request.
	///
	/// No trust decisions happen here; the pending flow machine checks the
	/// `error` and `state` parameters before this value reaches the caller.
	pub fn from_redirect(request: AuthorizationRequest, callback: &Url) -> Self {
		let mut code = None;
		let mut state = None;
		let mut additional_parameters = BTreeMap::new();

		for (key, value) in callback.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" | "error_description" | "error_uri" => {},
				_ => {
					additional_parameters.insert(key.into_owned(), value.into_owned());
				},
			}
		}

		Self { request, code, state, additional_parameters }
	}

	/// Builds the follow-up code-for-token exchange request.
	pub fn create_token_exchange_request(&self) -> Result<TokenRequest, ClientConfigError> {
		let code = self
			.code
			.clone()
			.ok_or(ClientConfigError::MissingArgument { name: "code".to_owned() })?;
		let mut builder = TokenRequest::builder(
			self.request.config.clone(),
			self.request.client_id.clone(),
			GrantType::AuthorizationCode,
		)
		.code(code)
		.redirect_uri(self.request.redirect_uri.clone())
		.nonce(self.request.nonce.clone());

		if let Some(pkce) = &self.request.code_challenge {
			builder = builder.code_verifier(pkce.verifier());
		}
		if let Some(scope) = &self.request.scope {
			builder = builder.scope(scope.clone());
		}

		builder.build()
	}
}
