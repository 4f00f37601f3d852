//! Session-level error taxonomy shared across flows, exchanges, and stores.
//!
//! Every variant is `Clone` + `Serialize` because the session persists its
//! last error alongside the credential state and the refresh coordinator
//! fans a single resolved outcome out to every queued waiter. Transport and
//! JSON failures are translated into this taxonomy at the boundary; raw
//! transport errors never cross it.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum Error {
	/// Transport-level failure while contacting the provider.
	#[error("Network error occurred while contacting the provider: {message}.")]
	Network {
		/// Human-readable transport failure summary.
		message: String,
	},
	/// Provider returned a body that could not be parsed.
	#[error("Provider returned a malformed response: {message}.")]
	MalformedResponse {
		/// Parse failure summary.
		message: String,
		/// JSON path of the failing field, when known.
		path: Option<String>,
	},
	/// Provider returned an OAuth 2.0 error response.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// ID Token failed OpenID Connect Core validation.
	#[error(transparent)]
	IdTokenValidation(#[from] IdTokenValidationError),
	/// Callback `state` did not match the originating request.
	#[error("Response state does not match the originating request state.")]
	StateMismatch,
	/// The end user abandoned the flow without completing it.
	#[error("Flow was canceled by the user.")]
	UserCanceled,
	/// No external user-agent was available to dispatch the flow.
	#[error("Flow could not be dispatched because no external user-agent is available.")]
	ProgramCanceled,
	/// The flow already reached a terminal resolution.
	#[error("Flow has already been resolved.")]
	AlreadyResolved,
	/// Local configuration or construction problem.
	#[error(transparent)]
	ClientConfiguration(#[from] ClientConfigError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}

/// Configuration and construction-time failures raised by the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ClientConfigError {
	/// A required request field was empty or absent.
	#[error("Required field `{name}` is missing or empty.")]
	MissingArgument {
		/// Field name.
		name: String,
	},
	/// An additional parameter collides with a reserved protocol parameter.
	#[error("Additional parameter `{name}` collides with a reserved parameter.")]
	ReservedParameter {
		/// Colliding parameter name.
		name: String,
	},
	/// Redirect URI failed validation.
	#[error("Redirect URI is invalid: {reason}.")]
	InvalidRedirect {
		/// Validation failure summary.
		reason: String,
	},
	/// A protocol constraint (entropy, verifier charset/length) was violated.
	#[error("Protocol constraint violated: {reason}.")]
	ConstraintViolation {
		/// Violated constraint summary.
		reason: String,
	},
	/// Service configuration does not declare the required endpoint.
	#[error("Service configuration is missing the {endpoint} endpoint.")]
	MissingEndpoint {
		/// Endpoint label.
		endpoint: String,
	},
	/// Provider does not support the configured client authentication method.
	#[error("Client authentication method `{method}` is not supported by the provider.")]
	UnsupportedClientAuthMethod {
		/// Rejected method name.
		method: String,
	},
	/// No refresh token is held, so a stale access token cannot be refreshed.
	#[error("No refresh token is available to refresh the session.")]
	MissingRefreshToken,
	/// A flow of this kind is already in progress.
	#[error("A {kind} flow is already in progress.")]
	FlowAlreadyActive {
		/// Flow kind label.
		kind: String,
	},
	/// No flow of this kind is in progress.
	#[error("No {kind} flow is in progress.")]
	NoActiveFlow {
		/// Flow kind label.
		kind: String,
	},
	/// Cancellation was requested after the flow had been dispatched.
	#[error("Flow can only be canceled before it is dispatched.")]
	FlowNotCancelable,
	/// A callback arrived for a flow that was never dispatched.
	#[error("Flow has not been dispatched yet.")]
	FlowNotDispatched,
}

/// OAuth 2.0 error response mapped from the wire `error` code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Provider returned an OAuth error `{code}`{}.", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct ProtocolError {
	/// Classified error kind.
	pub kind: ProtocolErrorKind,
	/// Raw wire `error` code as received.
	pub code: String,
	/// Optional `error_description` field.
	pub description: Option<String>,
	/// Optional `error_uri` field.
	pub uri: Option<Url>,
}
impl ProtocolError {
	/// Maps a wire-level OAuth 2.0 error triple into a typed error.
	///
	/// Unrecognized codes classify as [`ProtocolErrorKind::Other`] while the raw
	/// string is preserved in `code`.
	pub fn from_wire(
		code: impl Into<String>,
		description: Option<String>,
		uri: Option<Url>,
	) -> Self {
		let code = code.into();

		Self { kind: ProtocolErrorKind::from_wire(&code), code, description, uri }
	}
}

/// Canonical OAuth 2.0 error categories covering the authorization,
/// token, and registration endpoint code sets (RFC 6749 §4.1.2.1/§5.2,
/// RFC 7591 §3.2.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorKind {
	/// The request is missing a parameter or is otherwise malformed.
	InvalidRequest,
	/// The client is not authorized to use this flow.
	UnauthorizedClient,
	/// The resource owner or provider denied the request.
	AccessDenied,
	/// The provider does not support this response type.
	UnsupportedResponseType,
	/// The requested scope is invalid or exceeds the grant.
	InvalidScope,
	/// The provider encountered an internal failure.
	ServerError,
	/// The provider is temporarily unable to handle the request.
	TemporarilyUnavailable,
	/// The authorization grant (code or refresh token) was rejected.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The provider does not support this grant type.
	UnsupportedGrantType,
	/// Registration metadata was rejected.
	InvalidClientMetadata,
	/// Registration redirect URIs were rejected.
	InvalidRedirectUri,
	/// Code not recognized by any known error table.
	Other,
}
impl ProtocolErrorKind {
	/// Classifies a raw wire code.
	pub fn from_wire(code: &str) -> Self {
		match code {
			"invalid_request" => Self::InvalidRequest,
			"unauthorized_client" => Self::UnauthorizedClient,
			"access_denied" => Self::AccessDenied,
			"unsupported_response_type" => Self::UnsupportedResponseType,
			"invalid_scope" => Self::InvalidScope,
			"server_error" => Self::ServerError,
			"temporarily_unavailable" => Self::TemporarilyUnavailable,
			"invalid_grant" => Self::InvalidGrant,
			"invalid_client" => Self::InvalidClient,
			"unsupported_grant_type" => Self::UnsupportedGrantType,
			"invalid_client_metadata" => Self::InvalidClientMetadata,
			"invalid_redirect_uri" => Self::InvalidRedirectUri,
			_ => Self::Other,
		}
	}
}

/// Rule-specific ID Token validation failures (OpenID Connect Core §3.1.3.7).
///
/// Each validation rule fails with its own variant so callers can
/// distinguish, for example, an expired token from a replayed nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum IdTokenValidationError {
	/// Token is not structurally a compact JWT.
	#[error("ID Token is malformed: {message}.")]
	Malformed {
		/// Structural failure summary.
		message: String,
	},
	/// `iss` claim does not equal the discovery issuer.
	#[error("ID Token issuer `{found}` does not match the expected issuer `{expected}`.")]
	IssuerMismatch {
		/// Issuer from discovery metadata.
		expected: String,
		/// Issuer claim from the token.
		found: String,
	},
	/// Issuer claim is not a parsable URL.
	#[error("ID Token issuer `{issuer}` is not a valid URL.")]
	IssuerUnparsable {
		/// Offending issuer claim.
		issuer: String,
	},
	/// Issuer does not use the `https` scheme.
	#[error("ID Token issuer `{issuer}` must use the https scheme.")]
	InsecureIssuer {
		/// Offending issuer claim.
		issuer: String,
	},
	/// Issuer URL has no host component.
	#[error("ID Token issuer `{issuer}` has no host.")]
	MissingIssuerHost {
		/// Offending issuer claim.
		issuer: String,
	},
	/// Issuer URL carries a query or fragment component.
	#[error("ID Token issuer `{issuer}` must not contain a query or fragment.")]
	IssuerQueryOrFragment {
		/// Offending issuer claim.
		issuer: String,
	},
	/// Neither `aud` nor `azp` matches the client id.
	#[error("ID Token audience does not include client `{client_id}`.")]
	AudienceMismatch {
		/// Client id the token was checked against.
		client_id: String,
	},
	/// `exp` is in the past.
	#[error("ID Token expired at {expiration} (epoch seconds).")]
	Expired {
		/// Expiration claim, epoch seconds.
		expiration: i64,
	},
	/// `iat` deviates from the local clock beyond the allowed skew.
	#[error("ID Token issued-at {issued_at} is outside the allowed clock skew.")]
	IssuedAtOutOfSkew {
		/// Issued-at claim, epoch seconds.
		issued_at: i64,
	},
	/// `nonce` does not match the originating request.
	#[error("ID Token nonce does not match the authorization request nonce.")]
	NonceMismatch,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn wire_codes_classify_into_known_kinds() {
		assert_eq!(ProtocolErrorKind::from_wire("invalid_grant"), ProtocolErrorKind::InvalidGrant);
		assert_eq!(ProtocolErrorKind::from_wire("access_denied"), ProtocolErrorKind::AccessDenied);
		assert_eq!(
			ProtocolErrorKind::from_wire("temporarily_unavailable"),
			ProtocolErrorKind::TemporarilyUnavailable
		);
	}

	#[test]
	fn unrecognized_wire_code_preserves_raw_string() {
		let err = ProtocolError::from_wire("definitely_not_standard", None, None);

		assert_eq!(err.kind, ProtocolErrorKind::Other);
		assert_eq!(err.code, "definitely_not_standard");
	}

	#[test]
	fn errors_round_trip_through_json() {
		let err = Error::Protocol(ProtocolError::from_wire(
			"invalid_grant",
			Some("refresh token revoked".into()),
			None,
		));
		let blob = serde_json::to_string(&err).expect("Error should serialize to JSON.");
		let round_trip: Error =
			serde_json::from_str(&blob).expect("Serialized error should deserialize.");

		assert_eq!(err, round_trip);
	}
}
