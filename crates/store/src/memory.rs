use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{CacheStore, Result};

/// In-memory store for ephemeral processes and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the number of stored entries.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns true when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

#[async_trait]
impl CacheStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.entries.lock().get(key).cloned())
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.entries.lock().insert(key.to_owned(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		self.entries.lock().remove(key);
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		self.entries.lock().clear();
		Ok(())
	}
}
