//! Enumeration models over small reference tables (damage types, ammo
//! types, breaker types, …).
//!
//! An [`EnumModel`] wraps a regular model whose value is an [`EnumTable`]
//! and adds the lookup surface every filter implementation shares: exact
//! hash/enum-value match, case-insensitive unique-prefix name match, and
//! reverse lookup of the well-known key an entry is registered under. The
//! disambiguation rule is deliberately strict — an ambiguous prefix is no
//! match at all, never the first or best candidate — and lives here exactly
//! once instead of being restated at every call site.

mod enum_model;
mod lookup;
mod table;

pub use enum_model::{EnumModel, manifest_id};
pub use lookup::{EnumQuery, find, name_of};
pub use table::{EnumEntry, EnumTable};
