//! Validated identity-provider metadata consumed by requests and flows.

// self
use crate::_prelude::*;

/// Immutable endpoint/capability metadata for one identity provider.
///
/// Either assembled manually for statically configured providers or decoded
/// from a published OpenID Connect discovery document via
/// [`ServiceConfig::from_discovery`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
	/// Issuer identifier as published by the provider, when known.
	pub issuer: Option<Url>,
	/// Authorization endpoint used by the authorization code flow.
	pub authorization_endpoint: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token_endpoint: Url,
	/// Optional RP-initiated logout endpoint.
	pub end_session_endpoint: Option<Url>,
	/// Optional dynamic client registration endpoint.
	pub registration_endpoint: Option<Url>,
	/// Client authentication methods the token endpoint accepts, when declared.
	pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
}
impl ServiceConfig {
	/// Creates a configuration carrying only the two mandatory endpoints.
	pub fn new(authorization_endpoint: Url, token_endpoint: Url) -> Self {
		Self {
			issuer: None,
			authorization_endpoint,
			token_endpoint,
			end_session_endpoint: None,
			registration_endpoint: None,
			token_endpoint_auth_methods_supported: None,
		}
	}

	/// Sets the issuer identifier.
	pub fn with_issuer(mut self, issuer: Url) -> Self {
		self.issuer = Some(issuer);

		self
	}

	/// Sets the end-session endpoint.
	pub fn with_end_session_endpoint(mut self, endpoint: Url) -> Self {
		self.end_session_endpoint = Some(endpoint);

		self
	}

	/// Sets the registration endpoint.
	pub fn with_registration_endpoint(mut self, endpoint: Url) -> Self {
		self.registration_endpoint = Some(endpoint);

		self
	}

	/// Declares the client authentication methods the token endpoint accepts.
	pub fn with_token_endpoint_auth_methods(
		mut self,
		methods: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		self.token_endpoint_auth_methods_supported =
			Some(methods.into_iter().map(Into::into).collect());

		self
	}

	/// Decodes a provider-published discovery document.
	///
	/// Only the fields this crate consumes are read; everything else in the
	/// document is ignored.
	pub fn from_discovery(document: &str) -> Result<Self> {
		let doc: DiscoveryDocument =
			serde_json::from_str(document).map_err(|e| Error::MalformedResponse {
				message: format!("discovery document: {e}"),
				path: None,
			})?;

		Ok(Self {
			issuer: Some(doc.issuer),
			authorization_endpoint: doc.authorization_endpoint,
			token_endpoint: doc.token_endpoint,
			end_session_endpoint: doc.end_session_endpoint,
			registration_endpoint: doc.registration_endpoint,
			token_endpoint_auth_methods_supported: doc.token_endpoint_auth_methods_supported,
		})
	}
}

#[derive(Deserialize)]
struct DiscoveryDocument {
	issuer: Url,
	authorization_endpoint: Url,
	token_endpoint: Url,
	#[serde(default)]
	end_session_endpoint: Option<Url>,
	#[serde(default)]
	registration_endpoint: Option<Url>,
	#[serde(default)]
	token_endpoint_auth_methods_supported: Option<Vec<String>>,
}
