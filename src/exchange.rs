//! Token and registration endpoint exchanges with pluggable client
//! authentication.
//!
//! A response body carrying an `error` field is a protocol error even under
//! HTTP 200; a non-2xx response whose body is not a parsable OAuth error
//! classifies as a network failure. A 2xx body that fails to decode is a
//! malformed response. Successful token responses carrying an `id_token` are
//! validated before the exchange is considered successful; a validation
//! failure discards the exchange entirely.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	error::ClientConfigError,
	http::{HttpRequest, HttpResponse, HttpTransport},
	id_token::IdToken,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::{
		GrantType, RegistrationRequest, RegistrationResponse, RegistrationResponseWire,
		TokenRequest, TokenResponse, TokenResponseWire,
	},
	provider::ServiceConfig,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Client authentication strategies for the token endpoint (RFC 6749 §2.3).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAuthentication {
	/// Public client; PKCE is the proof of possession.
	None,
	/// HTTP Basic with form-urlencoded credentials (RFC 6749 §2.3.1).
	ClientSecretBasic {
		/// Confidential client secret.
		client_secret: String,
	},
	/// Secret passed as a POST body parameter.
	ClientSecretPost {
		/// Confidential client secret.
		client_secret: String,
	},
}
impl ClientAuthentication {
	/// Wire name of the method, as used in provider metadata.
	pub fn method_name(&self) -> &'static str {
		match self {
			ClientAuthentication::None => "none",
			ClientAuthentication::ClientSecretBasic { .. } => "client_secret_basic",
			ClientAuthentication::ClientSecretPost { .. } => "client_secret_post",
		}
	}

	/// Headers contributed to the token request.
	pub fn request_headers(&self, client_id: &str) -> Vec<(String, String)> {
		match self {
			ClientAuthentication::ClientSecretBasic { client_secret } => {
				let credentials = format!(
					"{}:{}",
					form_encode_component(client_id),
					form_encode_component(client_secret)
				);

				vec![("Authorization".to_owned(), format!("Basic {}", STANDARD.encode(credentials)))]
			},
			_ => Vec::new(),
		}
	}

	/// Body parameters contributed to the token request.
	pub fn request_parameters(&self) -> Vec<(String, String)> {
		match self {
			ClientAuthentication::ClientSecretPost { client_secret } =>
				vec![("client_secret".to_owned(), client_secret.clone())],
			_ => Vec::new(),
		}
	}

	fn ensure_supported(&self, config: &ServiceConfig) -> Result<(), ClientConfigError> {
		let Some(supported) = &config.token_endpoint_auth_methods_supported else {
			return Ok(());
		};

		if supported.iter().any(|method| method == self.method_name()) {
			Ok(())
		} else {
			Err(ClientConfigError::UnsupportedClientAuthMethod {
				method: self.method_name().to_owned(),
			})
		}
	}
}
impl Debug for ClientAuthentication {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			ClientAuthentication::None => f.write_str("ClientAuthentication::None"),
			ClientAuthentication::ClientSecretBasic { .. } =>
				f.write_str("ClientAuthentication::ClientSecretBasic(<redacted>)"),
			ClientAuthentication::ClientSecretPost { .. } =>
				f.write_str("ClientAuthentication::ClientSecretPost(<redacted>)"),
		}
	}
}

fn form_encode_component(value: &str) -> String {
	form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Executes code-for-token, refresh, and registration exchanges over an
/// injected transport.
#[derive(Clone)]
pub struct TokenExchangeClient {
	transport: Arc<dyn HttpTransport>,
	relax_issuer_https: bool,
}
impl TokenExchangeClient {
	/// Creates a client over the provided transport.
	pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
		Self { transport, relax_issuer_https: false }
	}

	/// Disables the issuer-https requirement during ID Token validation.
	/// Intended for tests against plain-HTTP mock providers only.
	pub fn relax_issuer_https(mut self) -> Self {
		self.relax_issuer_https = true;

		self
	}

	/// Performs a token endpoint exchange for the request's grant.
	pub async fn exchange(
		&self,
		request: &TokenRequest,
		client_auth: &ClientAuthentication,
	) -> Result<TokenResponse> {
		let kind = match request.grant_type {
			GrantType::AuthorizationCode => FlowKind::CodeExchange,
			GrantType::RefreshToken => FlowKind::Refresh,
		};
		let span = FlowSpan::new(kind, "exchange");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange_inner(request, client_auth)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	async fn exchange_inner(
		&self,
		request: &TokenRequest,
		client_auth: &ClientAuthentication,
	) -> Result<TokenResponse> {
		client_auth.ensure_supported(&request.config)?;

		let mut body = request.to_form_body();

		for (key, value) in client_auth.request_parameters() {
			let mut serializer = form_urlencoded::Serializer::new(String::new());

			serializer.append_pair(&key, &value);

			if !body.is_empty() {
				body.push('&');
			}

			body.push_str(&serializer.finish());
		}

		let mut http_request = HttpRequest::post(
			request.config.token_endpoint.clone(),
			FORM_CONTENT_TYPE,
			body.into_bytes(),
		);

		for (name, value) in client_auth.request_headers(&request.client_id) {
			http_request = http_request.with_header(name, value);
		}

		let response = self
			.transport
			.execute(http_request)
			.await
			.map_err(|e| Error::Network { message: e.message })?;
		let value = parse_response_body(&response)?;
		let wire: TokenResponseWire = decode_wire(value)?;
		let token_response = TokenResponse::from_wire(wire, OffsetDateTime::now_utc())?;

		if let Some(id_token) = &token_response.id_token {
			let id_token = IdToken::parse(id_token)?;

			id_token.validate(request, OffsetDateTime::now_utc(), self.relax_issuer_https)?;
		}

		Ok(token_response)
	}

	/// Performs a dynamic client registration exchange.
	pub async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse> {
		const KIND: FlowKind = FlowKind::Registration;

		let span = FlowSpan::new(KIND, "register");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.register_inner(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn register_inner(
		&self,
		request: &RegistrationRequest,
	) -> Result<RegistrationResponse> {
		let endpoint = request
			.config
			.registration_endpoint
			.clone()
			.ok_or_else(|| ClientConfigError::MissingEndpoint { endpoint: "registration".into() })?;
		let http_request =
			HttpRequest::post(endpoint, JSON_CONTENT_TYPE, request.to_json_body().into_bytes());
		let response = self
			.transport
			.execute(http_request)
			.await
			.map_err(|e| Error::Network { message: e.message })?;
		let value = parse_response_body(&response)?;
		let wire: RegistrationResponseWire = decode_wire(value)?;

		Ok(RegistrationResponse::from_wire(wire)?)
	}
}
impl Debug for TokenExchangeClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchangeClient")
			.field("relax_issuer_https", &self.relax_issuer_https)
			.finish()
	}
}

/// Applies the error-body-first classification shared by every exchange.
fn parse_response_body(response: &HttpResponse) -> Result<serde_json::Value> {
	let parsed: Result<serde_json::Value, _> = serde_json::from_slice(&response.body);

	match parsed {
		Ok(value) => {
			if let Some(code) = value.get("error").and_then(serde_json::Value::as_str) {
				let description = value
					.get("error_description")
					.and_then(serde_json::Value::as_str)
					.map(ToOwned::to_owned);
				let uri = value
					.get("error_uri")
					.and_then(serde_json::Value::as_str)
					.and_then(|raw| Url::parse(raw).ok());

				return Err(crate::error::ProtocolError::from_wire(code, description, uri).into());
			}
			if !response.is_success() {
				return Err(Error::Network {
					message: format!(
						"provider answered with HTTP {} and no OAuth error body",
						response.status
					),
				});
			}

			Ok(value)
		},
		Err(e) =>
			if response.is_success() {
				Err(Error::MalformedResponse { message: e.to_string(), path: None })
			} else {
				Err(Error::Network {
					message: format!(
						"provider answered with HTTP {} and an unparsable body",
						response.status
					),
				})
			},
	}
}

fn decode_wire<T>(value: serde_json::Value) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|e| Error::MalformedResponse {
		message: e.inner().to_string(),
		path: Some(e.path().to_string()),
	})
}
