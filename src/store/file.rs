//! Simple file-backed [`StateStore`] for desktop and CLI deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{StateStore, StoreError, StoreFuture},
};

/// Persists the state blob to a file after each save.
///
/// Writes go through a temporary sibling file and an atomic rename so a crash
/// mid-write never leaves a truncated blob behind. An unreadable file loads as
/// `None` rather than failing the session.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
}
impl FileStore {
	/// Opens a store at the provided path, creating parent directories as needed.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path })
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, blob: &str) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(blob.as_bytes()).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn read_blob(&self) -> Option<String> {
		if !self.path.exists() {
			return None;
		}

		fs::read_to_string(&self.path).ok().filter(|blob| !blob.is_empty())
	}
}
impl StateStore for FileStore {
	fn save(&self, blob: String) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.persist(&blob) })
	}

	fn load(&self) -> StoreFuture<'_, Option<String>> {
		Box::pin(async move { Ok(self.read_blob()) })
	}
}
