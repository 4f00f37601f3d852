//! External user-agent dispatch collaborator.

// self
use crate::_prelude::*;

/// Rendering hints passed along with the outbound request URI.
///
/// The session never interprets these; they exist so hosts can steer whatever
/// user-agent they hand the URI to (ephemeral browsing context, theming, and
/// any agent-specific extras).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingHints {
	/// Prefer an ephemeral/incognito browsing context.
	pub prefers_ephemeral_session: bool,
	/// Agent-specific presentation extras.
	pub extras: BTreeMap<String, String>,
}

/// Raised when no user-agent is available to carry the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("No external user-agent is available.")]
pub struct AgentUnavailable;

/// Hands outbound authorization/end-session URIs to an external user-agent.
///
/// Dispatch is fire-and-forget: implementations return as soon as the
/// hand-off happened, and the eventual redirect (or its absence) is reported
/// back to the pending flow separately, possibly from a different task. An
/// implementation that cannot produce any user-agent returns
/// [`AgentUnavailable`] instead.
pub trait UserAgentDispatcher
where
	Self: Send + Sync,
{
	/// Dispatches the request URI, non-blocking.
	fn dispatch(&self, request_uri: &Url, hints: &RenderingHints) -> Result<(), AgentUnavailable>;
}

/// Dispatcher that records URIs in memory; for tests and headless fallbacks.
#[derive(Clone, Debug, Default)]
pub struct RecordingDispatcher {
	dispatched: Arc<Mutex<Vec<Url>>>,
}
impl RecordingDispatcher {
	/// Returns every URI dispatched so far.
	pub fn dispatched(&self) -> Vec<Url> {
		self.dispatched.lock().clone()
	}
}
impl UserAgentDispatcher for RecordingDispatcher {
	fn dispatch(&self, request_uri: &Url, _hints: &RenderingHints) -> Result<(), AgentUnavailable> {
		self.dispatched.lock().push(request_uri.clone());

		Ok(())
	}
}

/// Dispatcher with no user-agent at all; every dispatch fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAgentDispatcher;
impl UserAgentDispatcher for NoAgentDispatcher {
	fn dispatch(&self, _request_uri: &Url, _hints: &RenderingHints) -> Result<(), AgentUnavailable> {
		Err(AgentUnavailable)
	}
}
