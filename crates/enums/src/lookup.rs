use std::sync::Arc;

use crate::table::{EnumEntry, EnumTable};

/// What an enum lookup is keyed on.
#[derive(Debug, Clone, Copy)]
pub enum EnumQuery<'a> {
	/// A single token: a numeric hash/enum value, or a name prefix.
	Token(&'a str),
	/// A set of enum values.
	Values(&'a [i64]),
}

impl<'a> From<&'a str> for EnumQuery<'a> {
	fn from(token: &'a str) -> Self {
		EnumQuery::Token(token)
	}
}

/// Resolves a query against a table.
///
/// A token is first tried as an exact numeric hash/enum-value match, then as
/// a case-insensitive name prefix. The prefix path is strict: an empty token
/// matches nothing (an empty filter must not match everything), and a prefix
/// matching several entries resolves to `None`, never to the first or best
/// candidate.
///
/// A value-set query returns the first entry that intersects the set:
/// any-match for a scalar entry, all-match for an entry covering several
/// enum values.
pub fn find<'t, I: EnumEntry>(table: &'t EnumTable<I>, query: EnumQuery<'_>) -> Option<&'t Arc<I>> {
	match query {
		EnumQuery::Token(token) => {
			if let Ok(wanted) = token.trim().parse::<i64>()
				&& let Some(entry) = table.entries().iter().find(|entry| {
					entry.hash().is_some_and(|hash| i64::from(hash) == wanted) || entry.enum_values().contains(&wanted)
				}) {
				return Some(entry);
			}

			let prefix = token.to_lowercase();
			if prefix.is_empty() {
				return None;
			}
			let mut matches = table
				.entries()
				.iter()
				.filter(|entry| entry.name().to_lowercase().starts_with(&prefix));
			match (matches.next(), matches.next()) {
				(Some(only), None) => Some(only),
				_ => None,
			}
		}
		EnumQuery::Values(values) => table.entries().iter().find(|entry| match entry.enum_values() {
			[] => false,
			[single] => values.contains(single),
			several => several.iter().all(|value| values.contains(value)),
		}),
	}
}

/// Reverse lookup: the well-known key whose entry is the one `find` returns
/// for this query, compared by identity.
pub fn name_of<'t, I: EnumEntry>(table: &'t EnumTable<I>, query: EnumQuery<'_>) -> Option<&'t str> {
	let found = find(table, query)?;
	table
		.named_entries()
		.find(|(_, entry)| Arc::ptr_eq(entry, found))
		.map(|(key, _)| key)
}
