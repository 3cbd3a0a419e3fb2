use std::sync::Arc;

use indexmap::IndexMap;

/// One row of a reference table.
pub trait EnumEntry {
	/// Display name, matched by case-insensitive prefix.
	fn name(&self) -> &str;

	/// Definition hash, matched exactly against numeric queries.
	fn hash(&self) -> Option<u32> {
		None
	}

	/// Enum values this entry covers; a scalar value is a one-element set.
	fn enum_values(&self) -> &[i64] {
		&[]
	}
}

/// A resolved reference table: every entry in definition order, plus
/// well-known entries addressable by key (`"kinetic"`, `"arc"`, …).
pub struct EnumTable<I> {
	entries: Vec<Arc<I>>,
	named: IndexMap<String, Arc<I>>,
}

impl<I> Default for EnumTable<I> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
			named: IndexMap::new(),
		}
	}
}

impl<I> EnumTable<I> {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an entry.
	pub fn push(&mut self, entry: I) -> Arc<I> {
		let entry = Arc::new(entry);
		self.entries.push(Arc::clone(&entry));
		entry
	}

	/// Appends an entry also addressable under a well-known key.
	pub fn push_named(&mut self, key: impl Into<String>, entry: I) -> Arc<I> {
		let entry = self.push(entry);
		self.named.insert(key.into(), Arc::clone(&entry));
		entry
	}

	/// Every entry, in definition order.
	pub fn entries(&self) -> &[Arc<I>] {
		&self.entries
	}

	/// The entry registered under a well-known key.
	pub fn named(&self, key: &str) -> Option<&Arc<I>> {
		self.named.get(key)
	}

	pub(crate) fn named_entries(&self) -> impl Iterator<Item = (&str, &Arc<I>)> {
		self.named.iter().map(|(key, entry)| (key.as_str(), entry))
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// True when the table has no entries.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
