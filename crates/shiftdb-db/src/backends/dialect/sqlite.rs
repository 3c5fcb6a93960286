//! SQLite dialect

use async_trait::async_trait;

use super::{
	ColumnFragment, Dialect, LogicalType, NativeType, TypeMap, default_fragment,
	type_map::unsupported_native,
};
use crate::backends::provider::{SqliteProvider, TransformationProvider};
use crate::backends::schema::{Column, DataType, TableName};
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};

const RESERVED_WORDS: &[&str] = &[
	"ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "ATTACH",
	"AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST", "CHECK",
	"COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_DATE",
	"CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT", "DEFERRABLE", "DEFERRED",
	"DELETE", "DESC", "DETACH", "DISTINCT", "DROP", "EACH", "ELSE", "END", "ESCAPE", "EXCEPT",
	"EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL", "FOR", "FOREIGN", "FROM", "FULL", "GLOB", "GROUP",
	"HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED", "INITIALLY", "INNER",
	"INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LEFT", "LIKE",
	"LIMIT", "MATCH", "NATURAL", "NO", "NOT", "NOTNULL", "NULL", "OF", "OFFSET", "ON", "OR",
	"ORDER", "OUTER", "PLAN", "PRAGMA", "PRIMARY", "QUERY", "RAISE", "RECURSIVE", "REFERENCES",
	"REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RIGHT", "ROLLBACK", "ROW",
	"SAVEPOINT", "SELECT", "SET", "TABLE", "TEMP", "TEMPORARY", "THEN", "TO", "TRANSACTION",
	"TRIGGER", "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL",
	"WHEN", "WHERE", "WITH", "WITHOUT",
];

/// AUTOINCREMENT must directly follow PRIMARY KEY.
const FRAGMENT_ORDER: [ColumnFragment; 8] = [
	ColumnFragment::Name,
	ColumnFragment::Type,
	ColumnFragment::PrimaryKey,
	ColumnFragment::Identity,
	ColumnFragment::Unique,
	ColumnFragment::ForeignKey,
	ColumnFragment::Default,
	ColumnFragment::Nullability,
];

/// SQLite dialect
///
/// SQLite cannot alter most column and constraint properties in place; the
/// matching provider rebuilds the table instead, so the in-place composers
/// are only used for statements SQLite does accept.
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::dialect::{Dialect, SqliteDialect};
/// use shiftdb_db::backends::schema::{Column, ColumnProperty, DataType};
///
/// let dialect = SqliteDialect::new();
/// let id = Column::new("id", DataType::Int64)
///     .with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY);
/// assert_eq!(
///     dialect.column_sql(&id).unwrap(),
///     "id INTEGER PRIMARY KEY AUTOINCREMENT"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SqliteDialect {
	types: TypeMap,
}

impl SqliteDialect {
	pub fn new() -> Self {
		let mut types = TypeMap::new();
		types
			.register(DataType::Boolean, "BOOLEAN")
			.register(DataType::Int16, "SMALLINT")
			.register(DataType::Int32, "INT")
			.register(DataType::Int64, "INTEGER")
			.register(DataType::Single, "REAL")
			.register(DataType::Double, "DOUBLE")
			.register(DataType::Decimal, "DECIMAL($precision, $scale)")
			.register_sized(DataType::String, i32::MAX as u32, "VARCHAR($length)")
			.register(DataType::String, "TEXT")
			.register_sized(DataType::StringFixedLength, i32::MAX as u32, "CHAR($length)")
			.register(DataType::Binary, "BLOB")
			.register(DataType::Guid, "UUID")
			.register(DataType::Date, "DATE")
			.register(DataType::Time, "TIME")
			.register(DataType::DateTime, "DATETIME");
		Self { types }
	}
}

impl Default for SqliteDialect {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Dialect for SqliteDialect {
	fn name(&self) -> &'static str {
		"sqlite"
	}

	fn aliases(&self) -> &'static [&'static str] {
		&["sqlite3"]
	}

	fn drivers(&self) -> &'static [&'static str] {
		&["sqlx-sqlite"]
	}

	fn database_type(&self) -> Option<DatabaseType> {
		Some(DatabaseType::Sqlite)
	}

	fn type_map(&self) -> &TypeMap {
		&self.types
	}

	fn is_reserved(&self, word: &str) -> bool {
		RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
	}

	fn logical_type(&self, native: &NativeType) -> Result<LogicalType> {
		let logical = match native.name.as_str() {
			"BOOLEAN" | "BOOL" => LogicalType::new(DataType::Boolean),
			"SMALLINT" => LogicalType::new(DataType::Int16),
			"INT" => LogicalType::new(DataType::Int32),
			"INTEGER" | "BIGINT" => LogicalType::new(DataType::Int64),
			"REAL" | "FLOAT" => LogicalType::new(DataType::Single),
			"DOUBLE" | "DOUBLE PRECISION" => LogicalType::new(DataType::Double),
			"DECIMAL" | "NUMERIC" => LogicalType::decimal(native)?,
			"VARCHAR" | "NVARCHAR" => LogicalType::sized(DataType::String, native.arg(0)),
			"TEXT" | "CLOB" => LogicalType::new(DataType::String),
			"CHAR" | "NCHAR" | "CHARACTER" => {
				LogicalType::sized(DataType::StringFixedLength, native.arg(0))
			}
			"BLOB" => LogicalType::new(DataType::Binary),
			"UUID" | "GUID" => LogicalType::new(DataType::Guid),
			"DATE" => LogicalType::new(DataType::Date),
			"TIME" => LogicalType::new(DataType::Time),
			"DATETIME" | "TIMESTAMP" => LogicalType::new(DataType::DateTime),
			_ => return Err(unsupported_native(native)),
		};
		Ok(logical)
	}

	fn identity_sql(&self) -> Option<&'static str> {
		Some("AUTOINCREMENT")
	}

	fn fragment_order(&self) -> &'static [ColumnFragment] {
		&FRAGMENT_ORDER
	}

	fn render_fragment(&self, kind: ColumnFragment, column: &Column) -> Result<Option<String>> {
		match kind {
			// Only a single INTEGER PRIMARY KEY can be an alias of rowid.
			ColumnFragment::Identity if column.is_identity() => {
				if !column.is_primary_key() || column.data_type != DataType::Int64 {
					return Err(MigrationError::InvalidOperation(format!(
						"sqlite identity column '{}' must be a single Int64 primary key",
						column.name
					)));
				}
				Ok(Some("AUTOINCREMENT".to_string()))
			}
			// Non-rowid primary keys accept NULL unless told otherwise.
			ColumnFragment::Nullability if column.is_primary_key() && !column.is_identity() => {
				Ok(Some("NOT NULL".to_string()))
			}
			_ => default_fragment(self, kind, column),
		}
	}

	fn drop_index_sql(&self, _table: &TableName, name: &str) -> String {
		format!("DROP INDEX {}", self.quote(name))
	}

	async fn connect(
		&self,
		url: &str,
		options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>> {
		let provider = SqliteProvider::connect(self.clone(), url, options).await?;
		Ok(Box::new(provider))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::schema::{ColumnProperty, FilterItem, FilterOperator, Index, Value};
	use rstest::{fixture, rstest};

	#[fixture]
	fn dialect() -> SqliteDialect {
		SqliteDialect::new()
	}

	#[rstest]
	fn test_identity_requires_int64_primary_key(dialect: SqliteDialect) {
		let column = Column::new("id", DataType::Int32)
			.with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY);
		assert!(matches!(
			dialect.column_mapper(&column),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	fn test_primary_key_is_not_null(dialect: SqliteDialect) {
		let column = Column::new("code", DataType::String)
			.with_size(8)
			.with_properties(ColumnProperty::PRIMARY_KEY);
		assert_eq!(
			dialect.column_sql(&column).unwrap(),
			"code VARCHAR(8) PRIMARY KEY NOT NULL"
		);
	}

	#[rstest]
	fn test_reserved_word_quoted(dialect: SqliteDialect) {
		let column = Column::new("order", DataType::Boolean)
			.with_default(true)
			.with_properties(ColumnProperty::NOT_NULL);
		assert_eq!(
			dialect.column_sql(&column).unwrap(),
			"\"order\" BOOLEAN DEFAULT 1 NOT NULL"
		);
	}

	#[rstest]
	fn test_filtered_index_uses_where(dialect: SqliteDialect) {
		let index = Index::new("ix_orders_open", ["customer_id"])
			.with_filter(FilterItem::new("status", FilterOperator::Equal, "open"));
		let sql = dialect
			.create_index_sql(&TableName::new("orders"), &index)
			.unwrap();
		assert_eq!(
			sql,
			vec!["CREATE INDEX ix_orders_open ON orders (customer_id) WHERE status = 'open'"]
		);
	}

	#[rstest]
	fn test_included_columns_rejected(dialect: SqliteDialect) {
		let index = Index::new("ix_orders_customer", ["customer_id"]).include(["total"]);
		assert!(matches!(
			dialect.create_index_sql(&TableName::new("orders"), &index),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	fn test_every_type_round_trips(dialect: SqliteDialect) {
		for data_type in DataType::ALL {
			let mut column = Column::new("c", data_type);
			if data_type.is_textual() {
				column = column.with_size(12);
			}
			if data_type == DataType::Decimal {
				column = column.with_precision(10, 2);
			}
			let native = NativeType::parse(&dialect.map_type(&column).unwrap());
			let logical = dialect.logical_type(&native).unwrap();
			assert_eq!(logical.data_type, data_type);
			assert_eq!(logical.size, column.size);
			assert_eq!(logical.precision, column.precision);
			assert_eq!(logical.scale, column.scale);
		}
	}

	#[rstest]
	fn test_unknown_native_type_unsupported(dialect: SqliteDialect) {
		let native = NativeType::parse("GEOMETRY");
		assert!(matches!(
			dialect.logical_type(&native),
			Err(MigrationError::UnsupportedType(_))
		));
	}

	#[rstest]
	fn test_render_values(dialect: SqliteDialect) {
		assert_eq!(dialect.render_value(&Value::from("it's")), "'it''s'");
		assert_eq!(dialect.render_value(&Value::Bytes(vec![1, 255])), "X'01FF'");
		assert_eq!(dialect.render_value(&Value::Null), "NULL");
	}
}
