//! RP-initiated logout (end-session) request/response records.

// self
use crate::{_prelude::*, crypto, error::ClientConfigError, protocol, provider::ServiceConfig};

const RESERVED: &[&str] =
	&["id_token_hint", "post_logout_redirect_uri", "state", "client_id"];

/// Immutable end-session request dispatched to the external user-agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndSessionRequest {
	/// Provider metadata the request targets.
	pub config: ServiceConfig,
	/// ID Token identifying the session being terminated.
	pub id_token_hint: Option<String>,
	/// URI the provider redirects back to after logout.
	pub post_logout_redirect_uri: Option<Url>,
	/// Opaque CSRF token echoed by the provider.
	pub state: String,
	/// Extra parameters appended to the request URI.
	pub additional_parameters: BTreeMap<String, String>,
}
impl EndSessionRequest {
	/// Returns a builder targeting the provided configuration.
	pub fn builder(config: ServiceConfig) -> EndSessionRequestBuilder {
		EndSessionRequestBuilder {
			config,
			id_token_hint: None,
			post_logout_redirect_uri: None,
			state: None,
			additional_parameters: BTreeMap::new(),
		}
	}

	/// Encodes the request as the outbound end-session URI.
	///
	/// Fails when the service configuration does not declare an end-session
	/// endpoint.
	pub fn to_request_uri(&self) -> Result<Url, ClientConfigError> {
		let mut url = self
			.config
			.end_session_endpoint
			.clone()
			.ok_or_else(|| ClientConfigError::MissingEndpoint { endpoint: "end-session".into() })?;

		{
			let mut pairs = url.query_pairs_mut();

			if let Some(hint) = &self.id_token_hint {
				pairs.append_pair("id_token_hint", hint);
			}
			if let Some(redirect) = &self.post_logout_redirect_uri {
				pairs.append_pair("post_logout_redirect_uri", redirect.as_str());
			}

			pairs.append_pair("state", &self.state);

			for (key, value) in &self.additional_parameters {
				pairs.append_pair(key, value);
			}
		}

		Ok(url)
	}
}

/// Fixed-field builder for [`EndSessionRequest`]; validates then freezes.
#[derive(Clone, Debug)]
pub struct EndSessionRequestBuilder {
	config: ServiceConfig,
	id_token_hint: Option<String>,
	post_logout_redirect_uri: Option<Url>,
	state: Option<String>,
	additional_parameters: BTreeMap<String, String>,
}
impl EndSessionRequestBuilder {
	/// Sets the ID Token hint.
	pub fn id_token_hint(mut self, value: impl Into<String>) -> Self {
		self.id_token_hint = Some(value.into());

		self
	}

	/// Sets the post-logout redirect URI.
	pub fn post_logout_redirect_uri(mut self, value: Url) -> Self {
		self.post_logout_redirect_uri = Some(value);

		self
	}

	/// Overrides the generated `state` token.
	pub fn state(mut self, value: impl Into<String>) -> Self {
		self.state = Some(value.into());

		self
	}

	/// Adds one additional request parameter.
	pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_parameters.insert(key.into(), value.into());

		self
	}

	/// Validates the assembled fields and freezes the request.
	pub fn build(self) -> Result<EndSessionRequest, ClientConfigError> {
		if let Some(redirect) = &self.post_logout_redirect_uri {
			protocol::validate_redirect_uri(redirect)?;
		}

		protocol::ensure_no_reserved(&self.additional_parameters, RESERVED)?;

		Ok(EndSessionRequest {
			config: self.config,
			id_token_hint: self.id_token_hint,
			post_logout_redirect_uri: self.post_logout_redirect_uri,
			state: self.state.unwrap_or_else(crypto::generate_state),
			additional_parameters: self.additional_parameters,
		})
	}
}

/// End-session response parsed from the post-logout callback URI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndSessionResponse {
	/// The request this response answers.
	pub request: EndSessionRequest,
	/// Echoed `state` parameter as received.
	pub state: Option<String>,
}
impl EndSessionResponse {
	/// Parses the post-logout callback against the originating request.
	pub fn from_redirect(request: EndSessionRequest, callback: &Url) -> Self {
		let state = callback
			.query_pairs()
			.find(|(key, _)| key == "state")
			.map(|(_, value)| value.into_owned());

		Self { request, state }
	}
}
