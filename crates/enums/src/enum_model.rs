use std::sync::Arc;

use armory_model::{Model, ModelError, ModelRegistry, ProgressReporter, ResetPolicy};

use crate::lookup::{self, EnumQuery};
use crate::table::{EnumEntry, EnumTable};

/// Conventional model id for a manifest-table-backed model.
pub fn manifest_id(table: &str) -> String {
	format!("manifest [{table}]")
}

/// A model specialization over a small reference table.
///
/// Two states only: pending (table resolving) and ready; once ready it never
/// goes back — enum tables are immutable for the session and only a restart
/// refetches them.
pub struct EnumModel<I> {
	model: Model<EnumTable<I>>,
}

impl<I> Clone for EnumModel<I> {
	fn clone(&self) -> Self {
		Self {
			model: self.model.clone(),
		}
	}
}

impl<I> EnumModel<I>
where
	I: EnumEntry + Send + Sync + 'static,
{
	/// Wraps an already-constructed table model.
	pub fn new(model: Model<EnumTable<I>>) -> Self {
		Self { model }
	}

	/// The session-tier table model for `table`, created under the
	/// `"manifest [<Table>]"` id on first use.
	pub fn for_table<F, Fut>(registry: &ModelRegistry, table: &str, generate: F) -> Self
	where
		F: Fn(ProgressReporter) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<EnumTable<I>>> + Send + 'static,
	{
		let id = manifest_id(table);
		Self::new(registry.get_or_create_session(&id, ResetPolicy::Global, generate))
	}

	/// The underlying table model.
	pub fn model(&self) -> &Model<EnumTable<I>> {
		&self.model
	}

	/// Resolves the table (joining an in-flight load if one is underway) and
	/// looks up `query` per the unique-prefix rules of [`lookup::find`].
	pub async fn get(&self, query: EnumQuery<'_>) -> Result<Option<Arc<I>>, ModelError> {
		let Some(table) = self.model.get().await? else {
			return Ok(None);
		};
		Ok(lookup::find(&table, query).cloned())
	}

	/// Resolves the table and reverse-looks-up the well-known key for
	/// whatever entry `query` resolves to.
	pub async fn name_of(&self, query: EnumQuery<'_>) -> Result<Option<String>, ModelError> {
		let Some(table) = self.model.get().await? else {
			return Ok(None);
		};
		Ok(lookup::name_of(&table, query).map(str::to_owned))
	}
}
