//! Thread-safe in-memory [`StateStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StateStore, StoreFuture},
};

/// Thread-safe storage backend that keeps the state blob in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<String>>>);
impl StateStore for MemoryStore {
	fn save(&self, blob: String) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(blob);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Option<String>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}
}
