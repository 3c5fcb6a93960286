//! Literal values for defaults, filters and DML helpers

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A literal value that a dialect can render into SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Decimal(Decimal),
	String(String),
	Bytes(Vec<u8>),
	Uuid(Uuid),
	DateTime(NaiveDateTime),
	/// SQL expression emitted verbatim (e.g. `CURRENT_TIMESTAMP`)
	Raw(String),
}

impl Value {
	pub fn raw(expression: impl Into<String>) -> Self {
		Value::Raw(expression.into())
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// Whether the value renders as a bare numeric literal.
	pub fn is_numeric(&self) -> bool {
		matches!(self, Value::Int(_) | Value::Float(_) | Value::Decimal(_))
	}

	pub(crate) fn to_sea_value(&self) -> sea_query::Value {
		match self {
			Value::Null => sea_query::Value::from(Option::<String>::None),
			Value::Bool(b) => sea_query::Value::from(*b),
			Value::Int(i) => sea_query::Value::from(*i),
			Value::Float(f) => sea_query::Value::from(*f),
			Value::Decimal(d) => sea_query::Value::from(*d),
			Value::String(s) => sea_query::Value::from(s.clone()),
			Value::Bytes(b) => sea_query::Value::from(b.clone()),
			Value::Uuid(u) => sea_query::Value::from(*u),
			Value::DateTime(dt) => sea_query::Value::from(*dt),
			Value::Raw(s) => sea_query::Value::from(s.clone()),
		}
	}

	pub(crate) fn to_sea_expr(&self) -> sea_query::Expr {
		match self {
			Value::Raw(expression) => sea_query::Expr::cust(expression.clone()),
			other => sea_query::Expr::val(other.to_sea_value()),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Value::Int(i)
	}
}

impl From<i32> for Value {
	fn from(i: i32) -> Self {
		Value::Int(i as i64)
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Self {
		Value::Float(f)
	}
}

impl From<Decimal> for Value {
	fn from(d: Decimal) -> Self {
		Value::Decimal(d)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::String(s)
	}
}

impl From<Vec<u8>> for Value {
	fn from(b: Vec<u8>) -> Self {
		Value::Bytes(b)
	}
}

impl From<Uuid> for Value {
	fn from(u: Uuid) -> Self {
		Value::Uuid(u)
	}
}

impl From<NaiveDateTime> for Value {
	fn from(dt: NaiveDateTime) -> Self {
		Value::DateTime(dt)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(Value::Null)
	}
}
