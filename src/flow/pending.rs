//! One in-flight authorization or end-session request and its resolution.
//!
//! A pending flow is created, dispatched to the external user-agent exactly
//! once, and resolved exactly once: by a redirect callback, by the agent
//! terminating without a callback (user cancellation), or by the agent being
//! unavailable before dispatch. A callback's echoed `state` must match the
//! originating request byte-for-byte; any mismatch resolves as
//! [`Error::StateMismatch`] and the response is discarded rather than
//! partially trusted.

// self
use crate::{
	_prelude::*,
	error::{ClientConfigError, ProtocolError},
	flow::{FlowType, RenderingHints, UserAgentDispatcher},
	protocol::{
		AuthorizationRequest, AuthorizationResponse, EndSessionRequest, EndSessionResponse,
	},
};

/// Request carried by a pending flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlowRequest {
	/// Authorization request.
	Authorization(AuthorizationRequest),
	/// End-session request.
	EndSession(EndSessionRequest),
}
impl FlowRequest {
	/// Flow kind of the wrapped request.
	pub fn flow_type(&self) -> FlowType {
		match self {
			FlowRequest::Authorization(_) => FlowType::Authorization,
			FlowRequest::EndSession(_) => FlowType::EndSession,
		}
	}

	/// CSRF `state` token the callback must echo.
	pub fn state(&self) -> &str {
		match self {
			FlowRequest::Authorization(request) => &request.state,
			FlowRequest::EndSession(request) => &request.state,
		}
	}

	/// Outbound request URI handed to the user-agent.
	pub fn to_request_uri(&self) -> Result<Url, ClientConfigError> {
		match self {
			FlowRequest::Authorization(request) => Ok(request.to_request_uri()),
			FlowRequest::EndSession(request) => request.to_request_uri(),
		}
	}
}

/// Successful callback payload, by flow kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlowResponse {
	/// Authorization callback.
	Authorization(AuthorizationResponse),
	/// End-session callback.
	EndSession(EndSessionResponse),
}

/// Terminal outcome of a pending flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlowResolution {
	/// Callback arrived and passed the state check.
	Success(FlowResponse),
	/// The user abandoned the flow without completing it.
	Canceled,
	/// Protocol error, state mismatch, or unavailable agent.
	Error(Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum FlowStage {
	Created,
	Dispatched,
	Resolved,
}

/// One in-flight flow awaiting its resolution.
///
/// Serializable so the flow can be persisted between dispatch and callback
/// and restored into a recreated process; only the request, expected state,
/// and machine stage persist; resolution is returned to whichever caller
/// performs the resolving operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingFlow {
	request: FlowRequest,
	expected_state: String,
	stage: FlowStage,
}
impl PendingFlow {
	/// Creates a flow in the `Created` stage.
	pub fn new(request: FlowRequest) -> Self {
		let expected_state = request.state().to_owned();

		Self { request, expected_state, stage: FlowStage::Created }
	}

	/// The request this flow carries.
	pub fn request(&self) -> &FlowRequest {
		&self.request
	}

	/// Returns `true` once the request has been handed to the user-agent.
	pub fn is_dispatched(&self) -> bool {
		matches!(self.stage, FlowStage::Dispatched | FlowStage::Resolved)
	}

	/// Returns `true` once the flow reached a terminal resolution.
	pub fn is_resolved(&self) -> bool {
		matches!(self.stage, FlowStage::Resolved)
	}

	/// Hands the request URI to the external user-agent.
	///
	/// Idempotent: redelivery after the first successful dispatch is a no-op.
	/// An unavailable agent before dispatch is fatal and resolves the flow as
	/// [`Error::ProgramCanceled`].
	pub fn dispatch(
		&mut self,
		agent: &dyn UserAgentDispatcher,
		hints: &RenderingHints,
	) -> Result<()> {
		match self.stage {
			FlowStage::Resolved => return Err(Error::AlreadyResolved),
			FlowStage::Dispatched => return Ok(()),
			FlowStage::Created => {},
		}

		let request_uri = self.request.to_request_uri()?;

		if agent.dispatch(&request_uri, hints).is_err() {
			self.stage = FlowStage::Resolved;

			return Err(Error::ProgramCanceled);
		}

		self.stage = FlowStage::Dispatched;

		Ok(())
	}

	/// Cancels the flow; allowed only before dispatch.
	pub fn cancel(&mut self) -> Result<FlowResolution> {
		match self.stage {
			FlowStage::Created => {
				self.stage = FlowStage::Resolved;

				Ok(FlowResolution::Canceled)
			},
			FlowStage::Dispatched => Err(ClientConfigError::FlowNotCancelable.into()),
			FlowStage::Resolved => Err(Error::AlreadyResolved),
		}
	}

	/// Resolves the flow from a redirect callback URI.
	pub fn resolve_callback(&mut self, callback: &Url) -> Result<FlowResolution> {
		match self.stage {
			FlowStage::Resolved => return Err(Error::AlreadyResolved),
			FlowStage::Created => return Err(ClientConfigError::FlowNotDispatched.into()),
			FlowStage::Dispatched => {},
		}

		self.stage = FlowStage::Resolved;

		if let Some(error) = parse_error_params(callback) {
			return Ok(FlowResolution::Error(error.into()));
		}

		let echoed_state = callback
			.query_pairs()
			.find(|(key, _)| key == "state")
			.map(|(_, value)| value.into_owned());

		if echoed_state.as_deref() != Some(self.expected_state.as_str()) {
			return Ok(FlowResolution::Error(Error::StateMismatch));
		}

		let response = match &self.request {
			FlowRequest::Authorization(request) => FlowResponse::Authorization(
				AuthorizationResponse::from_redirect(request.clone(), callback),
			),
			FlowRequest::EndSession(request) =>
				FlowResponse::EndSession(EndSessionResponse::from_redirect(request.clone(), callback)),
		};

		Ok(FlowResolution::Success(response))
	}

	/// Resolves the flow after the user-agent terminated without a callback.
	pub fn resolve_canceled(&mut self) -> Result<FlowResolution> {
		match self.stage {
			FlowStage::Resolved => return Err(Error::AlreadyResolved),
			FlowStage::Created => return Err(ClientConfigError::FlowNotDispatched.into()),
			FlowStage::Dispatched => {},
		}

		self.stage = FlowStage::Resolved;

		Ok(FlowResolution::Canceled)
	}
}

fn parse_error_params(callback: &Url) -> Option<ProtocolError> {
	let mut code = None;
	let mut description = None;
	let mut uri = None;

	for (key, value) in callback.query_pairs() {
		match key.as_ref() {
			"error" => code = Some(value.into_owned()),
			"error_description" => description = Some(value.into_owned()),
			"error_uri" => uri = Url::parse(&value).ok(),
			_ => {},
		}
	}

	code.map(|code| ProtocolError::from_wire(code, description, uri))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::ProtocolErrorKind,
		flow::{NoAgentDispatcher, RecordingDispatcher},
		provider::ServiceConfig,
	};

	fn config() -> ServiceConfig {
		ServiceConfig::new(
			Url::parse("https://idp.example.com/authorize").expect("Authorize URL should parse."),
			Url::parse("https://idp.example.com/token").expect("Token URL should parse."),
		)
	}

	fn flow() -> PendingFlow {
		let request = AuthorizationRequest::builder(
			config(),
			"client-1",
			Url::parse("https://app.example.com/cb").expect("Redirect URL should parse."),
		)
		.scope("openid profile")
		.build()
		.expect("Authorization request fixture should build.");

		PendingFlow::new(FlowRequest::Authorization(request))
	}

	fn callback(query: &str) -> Url {
		Url::parse(&format!("https://app.example.com/cb?{query}"))
			.unwrap_or_else(|_| panic!("Callback fixture should parse: {query}"))
	}

	#[test]
	fn dispatch_is_idempotent() {
		let mut flow = flow();
		let agent = RecordingDispatcher::default();
		let hints = RenderingHints::default();

		flow.dispatch(&agent, &hints).expect("First dispatch should succeed.");
		flow.dispatch(&agent, &hints).expect("Redelivered dispatch should be a no-op.");

		assert_eq!(agent.dispatched().len(), 1);
		assert!(flow.is_dispatched());
	}

	#[test]
	fn unavailable_agent_is_fatal_before_dispatch() {
		let mut flow = flow();
		let err = flow
			.dispatch(&NoAgentDispatcher, &RenderingHints::default())
			.expect_err("Unavailable agent should be fatal.");

		assert_eq!(err, Error::ProgramCanceled);
		assert!(flow.is_resolved());
	}

	#[test]
	fn matching_state_resolves_success_with_code() {
		let mut flow = flow();

		flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
			.expect("Dispatch should succeed.");

		let state = flow.request().state().to_owned();
		let uri = callback(&format!("code=ABC123&state={state}"));
		let resolution = flow.resolve_callback(&uri).expect("Callback should resolve the flow.");

		match resolution {
			FlowResolution::Success(FlowResponse::Authorization(response)) => {
				assert_eq!(response.code.as_deref(), Some("ABC123"));
			},
			other => panic!("Expected authorization success, got {other:?}."),
		}
	}

	#[test]
	fn mismatched_state_never_resolves_success() {
		for echoed in ["state=wrong", ""] {
			let mut flow = flow();

			flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
				.expect("Dispatch should succeed.");

			let uri = callback(&format!("code=ABC123&{echoed}"));
			let resolution =
				flow.resolve_callback(&uri).expect("Callback should resolve the flow.");

			assert_eq!(resolution, FlowResolution::Error(Error::StateMismatch));
		}
	}

	#[test]
	fn error_parameter_resolves_protocol_error() {
		let mut flow = flow();

		flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
			.expect("Dispatch should succeed.");

		let uri = callback("error=access_denied&error_description=user+said+no");
		let resolution = flow.resolve_callback(&uri).expect("Callback should resolve the flow.");

		match resolution {
			FlowResolution::Error(Error::Protocol(protocol)) => {
				assert_eq!(protocol.kind, ProtocolErrorKind::AccessDenied);
				assert_eq!(protocol.description.as_deref(), Some("user said no"));
			},
			other => panic!("Expected a protocol error resolution, got {other:?}."),
		}
	}

	#[test]
	fn resolution_happens_exactly_once() {
		let mut flow = flow();

		flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
			.expect("Dispatch should succeed.");

		flow.resolve_canceled().expect("First resolution should succeed.");

		assert_eq!(
			flow.resolve_canceled().expect_err("Second resolution should fail."),
			Error::AlreadyResolved
		);

		let state = flow.request().state().to_owned();
		let uri = callback(&format!("code=ABC&state={state}"));

		assert_eq!(
			flow.resolve_callback(&uri).expect_err("Post-resolution callback should fail."),
			Error::AlreadyResolved
		);
	}

	#[test]
	fn cancel_is_allowed_only_before_dispatch() {
		let mut flow = self::flow();

		assert_eq!(
			flow.cancel().expect("Pre-dispatch cancel should succeed."),
			FlowResolution::Canceled
		);

		let mut flow = self::flow();

		flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
			.expect("Dispatch should succeed.");

		let err = flow.cancel().expect_err("Post-dispatch cancel should fail.");

		assert_eq!(err, Error::ClientConfiguration(ClientConfigError::FlowNotCancelable));
	}

	#[test]
	fn flow_survives_serialization_between_dispatch_and_callback() {
		let mut flow = flow();

		flow.dispatch(&RecordingDispatcher::default(), &RenderingHints::default())
			.expect("Dispatch should succeed.");

		let blob = serde_json::to_string(&flow).expect("Pending flow should serialize.");
		let mut restored: PendingFlow =
			serde_json::from_str(&blob).expect("Serialized flow should deserialize.");

		assert!(restored.is_dispatched());
		assert!(!restored.is_resolved());

		let state = restored.request().state().to_owned();
		let uri = callback(&format!("code=XYZ&state={state}"));
		let resolution =
			restored.resolve_callback(&uri).expect("Restored flow should resolve callbacks.");

		assert!(matches!(resolution, FlowResolution::Success(_)));
	}
}
