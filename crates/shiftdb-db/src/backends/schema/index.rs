//! Index definitions

use std::fmt;

use super::Value;
use crate::error::{MigrationError, Result};

/// Comparison used by a filtered (partial) index predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
	Equal,
	NotEqual,
	Less,
	LessOrEqual,
	Greater,
	GreaterOrEqual,
}

impl FilterOperator {
	pub fn as_sql(self) -> &'static str {
		match self {
			FilterOperator::Equal => "=",
			FilterOperator::NotEqual => "<>",
			FilterOperator::Less => "<",
			FilterOperator::LessOrEqual => "<=",
			FilterOperator::Greater => ">",
			FilterOperator::GreaterOrEqual => ">=",
		}
	}
}

impl fmt::Display for FilterOperator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_sql())
	}
}

/// One `column <op> literal` term of a filtered index predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
	pub column: String,
	pub operator: FilterOperator,
	pub value: Value,
}

impl FilterItem {
	pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
		Self {
			column: column.into(),
			operator,
			value: value.into(),
		}
	}
}

/// Index definition
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::schema::{FilterItem, FilterOperator, Index};
///
/// let index = Index::new("ix_orders_open", ["customer_id"])
///     .with_filter(FilterItem::new("status", FilterOperator::Equal, "open"));
/// assert!(index.validate().is_ok());
///
/// let invalid = index.clone().unique();
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Index {
	pub name: String,
	pub key_columns: Vec<String>,
	pub unique: bool,
	pub primary_key: bool,
	pub clustered: bool,
	/// Non-key columns stored in the index leaf
	pub include_columns: Vec<String>,
	/// Predicate terms joined with AND; empty for a full index
	pub filter: Vec<FilterItem>,
}

impl Index {
	pub fn new<I, S>(name: impl Into<String>, key_columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			name: name.into(),
			key_columns: key_columns.into_iter().map(Into::into).collect(),
			..Default::default()
		}
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}

	pub fn clustered(mut self) -> Self {
		self.clustered = true;
		self
	}

	pub fn include<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.include_columns = columns.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_filter(mut self, item: FilterItem) -> Self {
		self.filter.push(item);
		self
	}

	pub fn is_filtered(&self) -> bool {
		!self.filter.is_empty()
	}

	pub fn references_column(&self, column: &str) -> bool {
		self.key_columns.iter().any(|c| c == column)
			|| self.include_columns.iter().any(|c| c == column)
			|| self.filter.iter().any(|f| f.column == column)
	}

	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(MigrationError::InvalidOperation(
				"index name must not be empty".to_string(),
			));
		}
		if self.key_columns.is_empty() {
			return Err(MigrationError::InvalidOperation(format!(
				"index '{}' has no key columns",
				self.name
			)));
		}
		// Uniqueness over a filtered or synthesized key is not portable.
		if self.unique && self.is_filtered() {
			return Err(MigrationError::InvalidOperation(format!(
				"index '{}' cannot be both unique and filtered",
				self.name
			)));
		}
		// NULL only compares through IS [NOT] NULL.
		if let Some(item) = self.filter.iter().find(|item| {
			item.value.is_null()
				&& !matches!(item.operator, FilterOperator::Equal | FilterOperator::NotEqual)
		}) {
			return Err(MigrationError::InvalidOperation(format!(
				"index '{}' filters '{}' {} NULL; only = and <> accept NULL",
				self.name, item.column, item.operator
			)));
		}
		if self.primary_key && self.is_filtered() {
			return Err(MigrationError::InvalidOperation(format!(
				"primary key '{}' cannot be filtered",
				self.name
			)));
		}
		Ok(())
	}
}
