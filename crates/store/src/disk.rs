use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustc_hash::FxHasher;

use crate::{CacheStore, Result, StoreError};

/// One-file-per-key store under a root directory.
///
/// Keys are sanitized into filenames and suffixed with a key hash so that
/// distinct keys never collide on disk. Writes go through a temp file and a
/// rename, so a crashed writer leaves either the old payload or the new one,
/// never a torn file.
#[derive(Debug)]
pub struct DiskStore {
	root: PathBuf,
}

impl DiskStore {
	/// Opens (creating if needed) a store rooted at `root`.
	pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		tokio::fs::create_dir_all(&root)
			.await
			.map_err(|source| StoreError::Io {
				key: root.display().to_string(),
				source,
			})?;
		Ok(Self { root })
	}

	/// Returns the root directory.
	pub fn root(&self) -> &Path {
		&self.root
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let mut hasher = FxHasher::default();
		key.hash(&mut hasher);
		let sanitized: String = key
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.root.join(format!("{sanitized}-{:016x}.bin", hasher.finish()))
	}
}

fn io(key: &str, source: std::io::Error) -> StoreError {
	StoreError::Io {
		key: key.to_owned(),
		source,
	}
}

#[async_trait]
impl CacheStore for DiskStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		match tokio::fs::read(self.path_for(key)).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(io(key, err)),
		}
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		let path = self.path_for(key);
		let tmp = path.with_extension("tmp");
		tokio::fs::write(&tmp, &value).await.map_err(|e| io(key, e))?;
		tokio::fs::rename(&tmp, &path).await.map_err(|e| io(key, e))?;
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		match tokio::fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(io(key, err)),
		}
	}

	async fn clear(&self) -> Result<()> {
		let mut dir = tokio::fs::read_dir(&self.root)
			.await
			.map_err(|e| io(self.root.display().to_string().as_str(), e))?;
		loop {
			let entry = match dir.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(err) => return Err(io(self.root.display().to_string().as_str(), err)),
			};
			let path = entry.path();
			if path.extension().is_some_and(|ext| ext == "bin")
				&& let Err(err) = tokio::fs::remove_file(&path).await
			{
				tracing::warn!(path = %path.display(), error = %err, "failed to remove cache file");
			}
		}
		Ok(())
	}
}
