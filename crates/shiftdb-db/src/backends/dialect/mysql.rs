//! MySQL / MariaDB dialect

use async_trait::async_trait;

use super::{
	ColumnFragment, Dialect, LogicalType, NativeType, TypeMap, default_fragment, hex_upper,
	type_map::unsupported_native,
};
use crate::backends::provider::{MysqlProvider, TransformationProvider};
use crate::backends::schema::{Column, DataType, TableName};
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};

const RESERVED_WORDS: &[&str] = &[
	"ACCESSIBLE", "ADD", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "BEFORE", "BETWEEN",
	"BIGINT", "BINARY", "BLOB", "BOTH", "BY", "CALL", "CASCADE", "CASE", "CHANGE", "CHAR",
	"CHARACTER", "CHECK", "COLLATE", "COLUMN", "CONDITION", "CONSTRAINT", "CONTINUE", "CONVERT",
	"CREATE", "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
	"CURSOR", "DATABASE", "DATABASES", "DEC", "DECIMAL", "DECLARE", "DEFAULT", "DELAYED",
	"DELETE", "DESC", "DESCRIBE", "DISTINCT", "DIV", "DOUBLE", "DROP", "DUAL", "EACH", "ELSE",
	"ELSEIF", "ENCLOSED", "ESCAPED", "EXISTS", "EXIT", "EXPLAIN", "FALSE", "FETCH", "FLOAT",
	"FOR", "FORCE", "FOREIGN", "FROM", "FULLTEXT", "GENERATED", "GRANT", "GROUP", "GROUPS",
	"HAVING", "IF", "IGNORE", "IN", "INDEX", "INNER", "INSERT", "INT", "INTEGER", "INTERVAL",
	"INTO", "IS", "JOIN", "KEY", "KEYS", "KILL", "LEADING", "LEAVE", "LEFT", "LIKE", "LIMIT",
	"LINES", "LOAD", "LOCK", "LONG", "MATCH", "MOD", "NATURAL", "NOT", "NULL", "NUMERIC", "ON",
	"OPTION", "OR", "ORDER", "OUT", "OUTER", "PARTITION", "PRIMARY", "PROCEDURE", "RANGE", "RANK",
	"READ", "REAL", "REFERENCES", "REGEXP", "RENAME", "REPEAT", "REPLACE", "REQUIRE", "RESTRICT",
	"RETURN", "REVOKE", "RIGHT", "RLIKE", "ROW", "ROWS", "SCHEMA", "SELECT", "SET", "SHOW",
	"SMALLINT", "SPATIAL", "SQL", "STARTING", "TABLE", "TERMINATED", "THEN", "TO", "TRAILING",
	"TRIGGER", "TRUE", "UNION", "UNIQUE", "UNLOCK", "UNSIGNED", "UPDATE", "USAGE", "USE",
	"USING", "VALUES", "VARCHAR", "WHEN", "WHERE", "WHILE", "WINDOW", "WITH", "WRITE", "XOR",
];

/// Attribute order of the MySQL column_definition grammar.
const FRAGMENT_ORDER: [ColumnFragment; 8] = [
	ColumnFragment::Name,
	ColumnFragment::Type,
	ColumnFragment::Nullability,
	ColumnFragment::Default,
	ColumnFragment::Identity,
	ColumnFragment::Unique,
	ColumnFragment::PrimaryKey,
	ColumnFragment::ForeignKey,
];

/// MySQL dialect
///
/// MySQL has no partial indexes: a filtered index is compiled into functional
/// key parts, one `CASE WHEN` expression per key column.
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::dialect::{Dialect, MysqlDialect};
/// use shiftdb_db::backends::schema::{FilterItem, FilterOperator, Index, TableName};
///
/// let dialect = MysqlDialect::new();
/// let index = Index::new("ix_orders_open", ["customer_id"])
///     .with_filter(FilterItem::new("status", FilterOperator::Equal, "open"));
/// let sql = dialect.create_index_sql(&TableName::new("orders"), &index).unwrap();
/// assert_eq!(
///     sql[0],
///     "CREATE INDEX ix_orders_open ON orders \
///      ((CASE WHEN status = 'open' THEN customer_id ELSE NULL END))"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct MysqlDialect {
	types: TypeMap,
}

impl MysqlDialect {
	pub fn new() -> Self {
		let mut types = TypeMap::new();
		types
			.register(DataType::Boolean, "TINYINT(1)")
			.register(DataType::Int16, "SMALLINT")
			.register(DataType::Int32, "INT")
			.register(DataType::Int64, "BIGINT")
			.register(DataType::Single, "FLOAT")
			.register(DataType::Double, "DOUBLE")
			.register(DataType::Decimal, "DECIMAL($precision, $scale)")
			.register_sized(DataType::String, 16_383, "VARCHAR($length)")
			.register_sized(DataType::String, 16_777_215, "MEDIUMTEXT")
			.register(DataType::String, "LONGTEXT")
			.register_sized(DataType::StringFixedLength, 255, "CHAR($length)")
			.register_sized(DataType::Binary, 65_532, "VARBINARY($length)")
			.register_sized(DataType::Binary, 16_777_215, "MEDIUMBLOB")
			.register(DataType::Binary, "LONGBLOB")
			.register(DataType::Guid, "BINARY(16)")
			.register(DataType::Date, "DATE")
			.register(DataType::Time, "TIME")
			.register(DataType::DateTime, "DATETIME");
		Self { types }
	}

	/// Column definition for `MODIFY COLUMN`: key clauses already exist on the
	/// table and must not be repeated.
	fn modify_definition(&self, column: &Column) -> Result<String> {
		Ok(self
			.column_mapper(column)?
			.without(ColumnFragment::PrimaryKey)
			.without(ColumnFragment::Unique)
			.to_sql())
	}
}

impl Default for MysqlDialect {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Dialect for MysqlDialect {
	fn name(&self) -> &'static str {
		"mysql"
	}

	fn aliases(&self) -> &'static [&'static str] {
		&["mariadb"]
	}

	fn drivers(&self) -> &'static [&'static str] {
		&["sqlx-mysql"]
	}

	fn database_type(&self) -> Option<DatabaseType> {
		Some(DatabaseType::Mysql)
	}

	fn type_map(&self) -> &TypeMap {
		&self.types
	}

	fn is_reserved(&self, word: &str) -> bool {
		RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
	}

	fn quote_char(&self) -> char {
		'`'
	}

	/// Expects `information_schema.COLUMNS.COLUMN_TYPE`.
	fn logical_type(&self, native: &NativeType) -> Result<LogicalType> {
		let logical = match (native.name.as_str(), native.arg(0)) {
			("TINYINT", Some(1)) | ("BOOLEAN", _) | ("BOOL", _) => LogicalType::new(DataType::Boolean),
			("SMALLINT", _) => LogicalType::new(DataType::Int16),
			("INT", _) | ("INTEGER", _) => LogicalType::new(DataType::Int32),
			("BIGINT", _) => LogicalType::new(DataType::Int64),
			("FLOAT", _) => LogicalType::new(DataType::Single),
			("DOUBLE", _) | ("DOUBLE PRECISION", _) => LogicalType::new(DataType::Double),
			("DECIMAL", _) | ("NUMERIC", _) => LogicalType::decimal(native)?,
			("VARCHAR", size) => LogicalType::sized(DataType::String, size),
			("TINYTEXT", _) | ("TEXT", _) | ("MEDIUMTEXT", _) | ("LONGTEXT", _) => {
				LogicalType::new(DataType::String)
			}
			("CHAR", size) => LogicalType::sized(DataType::StringFixedLength, size),
			("VARBINARY", size) => LogicalType::sized(DataType::Binary, size),
			("TINYBLOB", _) | ("BLOB", _) | ("MEDIUMBLOB", _) | ("LONGBLOB", _) => {
				LogicalType::new(DataType::Binary)
			}
			("BINARY", Some(16)) => LogicalType::new(DataType::Guid),
			("DATE", _) => LogicalType::new(DataType::Date),
			("TIME", _) => LogicalType::new(DataType::Time),
			("DATETIME", _) => LogicalType::new(DataType::DateTime),
			_ => return Err(unsupported_native(native)),
		};
		Ok(logical)
	}

	fn identity_sql(&self) -> Option<&'static str> {
		Some("AUTO_INCREMENT")
	}

	fn fragment_order(&self) -> &'static [ColumnFragment] {
		&FRAGMENT_ORDER
	}

	fn render_fragment(&self, kind: ColumnFragment, column: &Column) -> Result<Option<String>> {
		match kind {
			ColumnFragment::Identity
				if column.is_identity() && !column.is_primary_key() && !column.is_unique() =>
			{
				Err(MigrationError::InvalidOperation(format!(
					"mysql AUTO_INCREMENT column '{}' must be a key",
					column.name
				)))
			}
			ColumnFragment::Nullability if column.is_primary_key() => Ok(Some("NOT NULL".to_string())),
			_ => default_fragment(self, kind, column),
		}
	}

	fn escape_string(&self, value: &str) -> String {
		value.replace('\\', "\\\\").replace('\'', "''")
	}

	fn render_uuid(&self, value: &uuid::Uuid) -> String {
		format!("X'{}'", hex_upper(value.as_bytes()))
	}

	fn supports_partial_indexes(&self) -> bool {
		false
	}

	fn rename_table_sql(&self, table: &TableName, new_name: &str) -> String {
		let renamed = TableName {
			schema: table.schema.clone(),
			name: new_name.to_string(),
		};
		format!(
			"RENAME TABLE {} TO {}",
			self.quote_table(table),
			self.quote_table(&renamed)
		)
	}

	fn change_column_sql(&self, table: &TableName, column: &Column) -> Result<Vec<String>> {
		Ok(vec![format!(
			"ALTER TABLE {} MODIFY COLUMN {}",
			self.quote_table(table),
			self.modify_definition(column)?
		)])
	}

	fn drop_foreign_key_sql(&self, table: &TableName, name: &str) -> String {
		format!(
			"ALTER TABLE {} DROP FOREIGN KEY {}",
			self.quote_table(table),
			self.quote(name)
		)
	}

	fn drop_primary_key_sql(&self, table: &TableName, _name: &str) -> String {
		format!("ALTER TABLE {} DROP PRIMARY KEY", self.quote_table(table))
	}

	fn drop_index_sql(&self, table: &TableName, name: &str) -> String {
		format!(
			"DROP INDEX {} ON {}",
			self.quote(name),
			self.quote_table(table)
		)
	}

	async fn connect(
		&self,
		url: &str,
		options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>> {
		let provider = MysqlProvider::connect(self.clone(), url, options).await?;
		Ok(Box::new(provider))
	}
}
