//! Pluggable persistence for serialized session state.
//!
//! Persistence is best-effort: the session is authoritative in memory, and a
//! failing store never blocks protocol work. Backends receive and return an
//! opaque serialized blob; they never interpret its contents.

pub mod file;
pub mod memory;

pub use file::*;
pub use memory::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`StateStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors surfaced by a state store backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The state blob could not be serialized or deserialized.
	#[error("Failed to (de)serialize the session state, {message}.")]
	Serialization {
		/// Underlying serializer message.
		message: String,
	},
	/// The backend itself failed, e.g. an I/O error.
	#[error("State store backend failure, {message}.")]
	Backend {
		/// Underlying backend message.
		message: String,
	},
}

/// Durable storage for the serialized session state blob.
///
/// Implementations must tolerate concurrent saves; last write wins.
pub trait StateStore: Send + Sync {
	/// Persists the serialized state blob, replacing any previous one.
	fn save(&self, blob: String) -> StoreFuture<'_, ()>;

	/// Loads the previously persisted blob, if any.
	///
	/// A missing blob is `Ok(None)`, not an error.
	fn load(&self) -> StoreFuture<'_, Option<String>>;
}
