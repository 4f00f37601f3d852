//! Accumulated authorization state and the atomic rules that update it.

// self
use crate::{
	_prelude::*,
	protocol::{AuthorizationResponse, RegistrationResponse, TokenResponse},
	provider::ServiceConfig,
};

/// Tokens inside this window of their expiry count as stale.
pub const FRESHNESS_TOLERANCE: Duration = Duration::seconds(60);

/// Everything a client has accumulated about one authorization session.
///
/// Updates are atomic against whole responses: each `update_*` method applies
/// the success or failure of a single endpoint round trip, and the resulting
/// state is always internally consistent. Tokens from a previous grant never
/// survive a new authorization success.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationState {
	/// Provider endpoints this session is bound to.
	pub config: Option<ServiceConfig>,
	/// Scope granted by the most recent successful response that carried one.
	pub scope: Option<String>,
	/// Current refresh token.
	pub refresh_token: Option<String>,
	/// Most recent successful authorization response.
	pub last_authorization_response: Option<AuthorizationResponse>,
	/// Most recent successful token response.
	pub last_token_response: Option<TokenResponse>,
	/// Dynamic registration outcome, if the client registered itself.
	pub last_registration_response: Option<RegistrationResponse>,
	/// Most recent recorded failure, cleared by the next success.
	pub last_error: Option<Error>,
}
impl AuthorizationState {
	/// Applies an authorization endpoint outcome.
	///
	/// Success replaces the previous response and invalidates every token
	/// artifact of the prior grant. Failure records the error and likewise
	/// drops the prior grant's tokens; the registration outcome survives
	/// either way.
	pub fn update_authorization(&mut self, outcome: Result<AuthorizationResponse>) {
		self.last_token_response = None;
		self.refresh_token = None;

		match outcome {
			Ok(response) => {
				self.config = Some(response.request.config.clone());
				self.scope.clone_from(&response.request.scope);
				self.last_authorization_response = Some(response);
				self.last_error = None;
			},
			Err(e) => {
				self.last_authorization_response = None;
				self.last_error = Some(e);
			},
		}
	}

	/// Applies a token endpoint outcome.
	///
	/// Success merges field-by-field: only fields present in the response
	/// replace their stored counterparts, so a refresh response without a
	/// rotated refresh token keeps the existing one. Failure records the
	/// error and leaves the stored tokens alone.
	pub fn update_token(&mut self, outcome: Result<TokenResponse>) {
		match outcome {
			Ok(response) => {
				if let Some(refresh_token) = &response.refresh_token {
					self.refresh_token = Some(refresh_token.clone());
				}
				if let Some(scope) = &response.scope {
					self.scope = Some(scope.clone());
				}

				self.last_token_response = Some(response);
				self.last_error = None;
			},
			Err(e) => self.last_error = Some(e),
		}
	}

	/// Applies a dynamic registration outcome.
	///
	/// Success resets the session to a freshly registered client: every
	/// authorization and token artifact belongs to the previous client
	/// identity and is dropped, while the provider configuration stays.
	pub fn update_registration(&mut self, outcome: Result<RegistrationResponse>) {
		match outcome {
			Ok(response) => {
				self.last_registration_response = Some(response);
				self.last_authorization_response = None;
				self.last_token_response = None;
				self.refresh_token = None;
				self.scope = None;
				self.last_error = None;
			},
			Err(e) => self.last_error = Some(e),
		}
	}

	/// Current access token, if any.
	pub fn access_token(&self) -> Option<&str> {
		self.last_token_response.as_ref()?.access_token.as_deref()
	}

	/// Expiry of the current access token, if the provider reported one.
	pub fn access_token_expiry(&self) -> Option<OffsetDateTime> {
		self.last_token_response.as_ref()?.access_token_expiry
	}

	/// Raw ID token from the most recent token response.
	pub fn id_token(&self) -> Option<&str> {
		self.last_token_response.as_ref()?.id_token.as_deref()
	}

	/// Current refresh token, if any.
	pub fn refresh_token(&self) -> Option<&str> {
		self.refresh_token.as_deref()
	}

	/// Whether the stored access token can be used without a refresh.
	///
	/// A token without a reported expiry never goes stale on its own; only a
	/// forced refresh replaces it.
	pub fn is_access_token_fresh(&self, now: OffsetDateTime) -> bool {
		if self.access_token().is_none() {
			return false;
		}

		match self.access_token_expiry() {
			Some(expiry) => now + FRESHNESS_TOLERANCE < expiry,
			None => true,
		}
	}

	/// Serializes the state for persistence.
	pub fn to_blob(&self) -> Result<String, crate::store::StoreError> {
		serde_json::to_string(self)
			.map_err(|e| crate::store::StoreError::Serialization { message: e.to_string() })
	}

	/// Restores persisted state; a corrupt blob yields a clean empty session.
	pub fn from_blob(blob: &str) -> Self {
		serde_json::from_str(blob).unwrap_or_default()
	}
}
