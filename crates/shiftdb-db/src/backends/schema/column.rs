//! Portable column definitions

use std::fmt;

use super::{ColumnProperty, Value};
use crate::error::{MigrationError, Result};

/// Portable logical column type.
///
/// Every variant maps to a distinct native type on each supported backend so
/// that a column survives a create/introspect round trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
	Boolean,
	Int16,
	Int32,
	Int64,
	Single,
	Double,
	Decimal,
	/// Variable-length text; unbounded when no size is given
	String,
	StringFixedLength,
	Binary,
	Guid,
	Date,
	Time,
	DateTime,
}

impl DataType {
	pub const ALL: [DataType; 14] = [
		DataType::Boolean,
		DataType::Int16,
		DataType::Int32,
		DataType::Int64,
		DataType::Single,
		DataType::Double,
		DataType::Decimal,
		DataType::String,
		DataType::StringFixedLength,
		DataType::Binary,
		DataType::Guid,
		DataType::Date,
		DataType::Time,
		DataType::DateTime,
	];

	pub fn is_integer(self) -> bool {
		matches!(self, DataType::Int16 | DataType::Int32 | DataType::Int64)
	}

	pub fn is_numeric(self) -> bool {
		self.is_integer() || matches!(self, DataType::Single | DataType::Double | DataType::Decimal)
	}

	pub fn is_textual(self) -> bool {
		matches!(self, DataType::String | DataType::StringFixedLength)
	}
}

impl fmt::Display for DataType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Column definition
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::schema::{Column, ColumnProperty, DataType};
///
/// let id = Column::new("id", DataType::Int64)
///     .with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY);
/// let title = Column::new("title", DataType::String)
///     .with_size(200)
///     .with_properties(ColumnProperty::NOT_NULL);
///
/// assert!(id.validate().is_ok());
/// assert_eq!(title.size, Some(200));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
	pub name: String,
	pub data_type: DataType,
	/// Length for textual and binary types
	pub size: Option<u32>,
	pub precision: Option<u8>,
	pub scale: Option<u8>,
	pub default: Option<Value>,
	pub properties: ColumnProperty,
}

impl Column {
	pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
		Self {
			name: name.into(),
			data_type,
			size: None,
			precision: None,
			scale: None,
			default: None,
			properties: ColumnProperty::NONE,
		}
	}

	pub fn with_size(mut self, size: u32) -> Self {
		self.size = Some(size);
		self
	}

	pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
		self.precision = Some(precision);
		self.scale = Some(scale);
		self
	}

	pub fn with_default(mut self, default: impl Into<Value>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn with_properties(mut self, properties: ColumnProperty) -> Self {
		self.properties = properties;
		self
	}

	pub fn is_primary_key(&self) -> bool {
		self.properties.is_set(ColumnProperty::PRIMARY_KEY)
	}

	pub fn is_identity(&self) -> bool {
		self.properties.is_set(ColumnProperty::IDENTITY)
	}

	pub fn is_unique(&self) -> bool {
		self.properties.is_set(ColumnProperty::UNIQUE)
	}

	pub fn is_not_null(&self) -> bool {
		self.properties.is_set(ColumnProperty::NOT_NULL)
	}

	/// Checks the invariants every backend relies on before SQL is generated.
	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(MigrationError::InvalidOperation(
				"column name must not be empty".to_string(),
			));
		}
		self.properties.validate().map_err(|e| match e {
			MigrationError::InvalidOperation(msg) => {
				MigrationError::InvalidOperation(format!("column '{}': {}", self.name, msg))
			}
			other => other,
		})?;
		if self.is_identity() && !self.data_type.is_integer() {
			return Err(MigrationError::InvalidOperation(format!(
				"column '{}': identity requires an integer type, got {}",
				self.name, self.data_type
			)));
		}
		if self.properties.is_set(ColumnProperty::UNSIGNED) && !self.data_type.is_numeric() {
			return Err(MigrationError::InvalidOperation(format!(
				"column '{}': unsigned requires a numeric type, got {}",
				self.name, self.data_type
			)));
		}
		if let (Some(precision), Some(scale)) = (self.precision, self.scale) {
			if scale > precision {
				return Err(MigrationError::InvalidOperation(format!(
					"column '{}': scale {} exceeds precision {}",
					self.name, scale, precision
				)));
			}
		}
		Ok(())
	}

	/// Whether adding this column to an existing table requires a value for
	/// every existing row.
	pub fn requires_backfill(&self) -> bool {
		self.is_not_null() && self.default.is_none() && !self.is_identity()
	}
}
