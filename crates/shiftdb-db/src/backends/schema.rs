//! Backend-independent schema model
//!
//! Value types describing columns, indexes and constraints. Dialects render
//! them into SQL and providers read them back from the database catalog.

pub mod column;
pub mod constraint;
pub mod index;
pub mod property;
pub mod value;

pub use column::{Column, DataType};
pub use constraint::{CheckConstraint, ForeignKeyAction, ForeignKeyConstraint, UniqueConstraint};
pub use index::{FilterItem, FilterOperator, Index};
pub use property::ColumnProperty;
pub use value::Value;

use std::fmt;

/// Table name with an optional schema qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
	pub schema: Option<String>,
	pub name: String,
}

impl TableName {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			schema: None,
			name: name.into(),
		}
	}

	pub fn in_schema(mut self, schema: Option<&str>) -> Self {
		self.schema = schema.map(str::to_string);
		self
	}

	pub(crate) fn to_sea_ref(&self) -> sea_query::TableRef {
		use sea_query::{Alias, IntoTableRef};

		match &self.schema {
			Some(schema) => {
				(Alias::new(schema.clone()), Alias::new(self.name.clone())).into_table_ref()
			}
			None => Alias::new(self.name.clone()).into_table_ref(),
		}
	}
}

impl fmt::Display for TableName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.schema {
			Some(schema) => write!(f, "{}.{}", schema, self.name),
			None => f.write_str(&self.name),
		}
	}
}
