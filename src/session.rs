//! Session state and the single-flight refresh coordinator.

pub mod coordinator;
pub mod state;

pub use coordinator::*;
pub use state::*;
