use std::sync::Arc;

use thiserror::Error;

/// Model resolution failure.
///
/// Cloneable so every waiter coalesced onto one in-flight resolution
/// receives the same rejection. A failure never evicts a previously valid
/// cached value and never poisons the model; the next `get` retries.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
	/// The model's generator returned an error.
	#[error("model '{id}' failed to resolve: {error}")]
	Generate {
		/// Id of the failing model.
		id: String,
		/// The generator's error.
		error: Arc<anyhow::Error>,
	},

	/// The model's generator panicked.
	#[error("model '{id}' resolution panicked")]
	Panicked {
		/// Id of the failing model.
		id: String,
	},
}

impl ModelError {
	/// Id of the model that failed.
	pub fn id(&self) -> &str {
		match self {
			ModelError::Generate { id, .. } | ModelError::Panicked { id } => id,
		}
	}
}
