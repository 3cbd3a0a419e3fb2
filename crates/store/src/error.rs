use thiserror::Error;

/// Errors from a cache store backend.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Underlying I/O failure for one key.
	#[error("I/O error for cache key '{key}': {source}")]
	Io {
		/// The cache key being read or written.
		key: String,
		/// The underlying I/O error.
		source: std::io::Error,
	},
}

/// Result type for cache store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
