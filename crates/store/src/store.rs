use async_trait::async_trait;

use crate::Result;

/// Abstract persisted key→value byte store.
///
/// Implementations must be last-write-wins: two writers racing on the same
/// key may interleave freely, and the later write is the one that sticks.
#[async_trait]
pub trait CacheStore: Send + Sync {
	/// Returns the stored bytes for `key`, or `None` if absent.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

	/// Stores `value` under `key`, replacing any existing entry.
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

	/// Removes the entry for `key`. Removing an absent key is not an error.
	async fn delete(&self, key: &str) -> Result<()>;

	/// Removes every entry.
	async fn clear(&self) -> Result<()>;
}
