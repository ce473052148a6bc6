//! Simple file-backed [`KeyValueStore`] for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture, StoredEntry},
};

/// Persists entries to a JSON snapshot after each mutation. Expired entries are dropped on
/// load and whenever the snapshot is rewritten.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, StoredEntry>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading live entries.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let mut snapshot = Self::load_snapshot(&path)?;
		let now = OffsetDateTime::now_utc();

		snapshot.retain(|_, entry| !entry.is_expired_at(now));

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot on disk.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, StoredEntry>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &mut HashMap<String, StoredEntry>) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();

		contents.retain(|_, entry| !entry.is_expired_at(now));

		let serialized =
			serde_json::to_vec_pretty(&*contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
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
}
impl KeyValueStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.inner
				.read()
				.get(key)
				.filter(|entry| !entry.is_expired_at(now))
				.map(|entry| entry.value.clone()))
		})
	}

	fn put<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if !ttl.is_positive() {
				return Err(StoreError::Backend {
					message: format!("Refusing to store {key} with a non-positive TTL"),
				});
			}

			let mut guard = self.inner.write();

			guard.insert(key.to_owned(), StoredEntry::new(value, ttl, OffsetDateTime::now_utc()));
			self.persist_locked(&mut guard)
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(key).is_some() {
				self.persist_locked(&mut guard)?;
			}

			Ok(())
		})
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.inner.write();
			let taken = guard.remove(key);

			if taken.is_some() {
				self.persist_locked(&mut guard)?;
			}

			Ok(taken.filter(|entry| !entry.is_expired_at(now)).map(|entry| entry.value))
		})
	}
}
