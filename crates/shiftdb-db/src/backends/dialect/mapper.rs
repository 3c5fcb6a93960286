//! Column definition fragments

use std::fmt;

/// One piece of an inline column definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFragment {
	Name,
	Type,
	Identity,
	PrimaryKey,
	Unique,
	ForeignKey,
	Default,
	Nullability,
}

impl ColumnFragment {
	/// Emission order used unless a dialect overrides it.
	pub const DEFAULT_ORDER: [ColumnFragment; 8] = [
		ColumnFragment::Name,
		ColumnFragment::Type,
		ColumnFragment::Identity,
		ColumnFragment::PrimaryKey,
		ColumnFragment::Unique,
		ColumnFragment::ForeignKey,
		ColumnFragment::Default,
		ColumnFragment::Nullability,
	];
}

/// Rendered column definition, kept as ordered fragments so callers can drop
/// individual clauses (e.g. `PRIMARY KEY` in a `MODIFY COLUMN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapper {
	fragments: Vec<(ColumnFragment, String)>,
}

impl ColumnMapper {
	pub(crate) fn new(fragments: Vec<(ColumnFragment, String)>) -> Self {
		Self { fragments }
	}

	pub fn fragment(&self, kind: ColumnFragment) -> Option<&str> {
		self.fragments
			.iter()
			.find(|(k, _)| *k == kind)
			.map(|(_, sql)| sql.as_str())
	}

	pub fn kinds(&self) -> impl Iterator<Item = ColumnFragment> + '_ {
		self.fragments.iter().map(|(kind, _)| *kind)
	}

	pub fn without(mut self, kind: ColumnFragment) -> Self {
		self.fragments.retain(|(k, _)| *k != kind);
		self
	}

	pub fn to_sql(&self) -> String {
		self.fragments
			.iter()
			.map(|(_, sql)| sql.as_str())
			.collect::<Vec<_>>()
			.join(" ")
	}
}

impl fmt::Display for ColumnMapper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_sql())
	}
}
