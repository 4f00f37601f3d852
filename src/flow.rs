//! Pending-flow tracking across the external user-agent hand-off.

pub mod agent;
pub mod pending;

pub use agent::*;
pub use pending::*;

// self
use crate::_prelude::*;

/// Kinds of flows that traverse the external user-agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
	/// Authorization code flow.
	Authorization,
	/// RP-initiated logout flow.
	EndSession,
}
impl FlowType {
	/// Returns a stable label for errors and diagnostics.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowType::Authorization => "authorization",
			FlowType::EndSession => "end-session",
		}
	}
}
impl Display for FlowType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
