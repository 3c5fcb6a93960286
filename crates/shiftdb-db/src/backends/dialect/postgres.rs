//! PostgreSQL dialect

use async_trait::async_trait;

use super::{Dialect, LogicalType, NativeType, TypeMap, hex_upper, type_map::unsupported_native};
use crate::backends::provider::{PostgresProvider, TransformationProvider};
use crate::backends::schema::{Column, ColumnProperty, DataType, Index, TableName};
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};

const RESERVED_WORDS: &[&str] = &[
	"ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH",
	"CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_CATALOG",
	"CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
	"DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE", "FETCH",
	"FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INITIALLY", "INTERSECT", "INTO",
	"LATERAL", "LEADING", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NOT", "NULL", "OFFSET", "ON",
	"ONLY", "OR", "ORDER", "PLACING", "PRIMARY", "REFERENCES", "RETURNING", "SELECT",
	"SESSION_USER", "SOME", "SYMMETRIC", "TABLE", "THEN", "TO", "TRAILING", "TRUE", "UNION",
	"UNIQUE", "USER", "USING", "VARIADIC", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Largest length PostgreSQL accepts for `VARCHAR(n)` / `CHAR(n)`.
const MAX_CHARACTER_LENGTH: u32 = 10_485_760;

/// PostgreSQL dialect
#[derive(Debug, Clone)]
pub struct PostgresDialect {
	types: TypeMap,
}

impl PostgresDialect {
	pub fn new() -> Self {
		let mut types = TypeMap::new();
		types
			.register(DataType::Boolean, "BOOLEAN")
			.register(DataType::Int16, "SMALLINT")
			.register(DataType::Int32, "INTEGER")
			.register(DataType::Int64, "BIGINT")
			.register(DataType::Single, "REAL")
			.register(DataType::Double, "DOUBLE PRECISION")
			.register(DataType::Decimal, "NUMERIC($precision, $scale)")
			.register_sized(DataType::String, MAX_CHARACTER_LENGTH, "VARCHAR($length)")
			.register(DataType::String, "TEXT")
			.register_sized(DataType::StringFixedLength, MAX_CHARACTER_LENGTH, "CHAR($length)")
			.register(DataType::Binary, "BYTEA")
			.register(DataType::Guid, "UUID")
			.register(DataType::Date, "DATE")
			.register(DataType::Time, "TIME")
			.register(DataType::DateTime, "TIMESTAMP");
		Self { types }
	}
}

impl Default for PostgresDialect {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Dialect for PostgresDialect {
	fn name(&self) -> &'static str {
		"postgres"
	}

	fn aliases(&self) -> &'static [&'static str] {
		&["postgresql", "pg"]
	}

	fn drivers(&self) -> &'static [&'static str] {
		&["sqlx-postgres"]
	}

	fn database_type(&self) -> Option<DatabaseType> {
		Some(DatabaseType::Postgres)
	}

	fn type_map(&self) -> &TypeMap {
		&self.types
	}

	fn is_reserved(&self, word: &str) -> bool {
		RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
	}

	fn map_type(&self, column: &Column) -> Result<String> {
		if column.properties.is_set(ColumnProperty::UNSIGNED) {
			return Err(MigrationError::InvalidOperation(format!(
				"postgres has no unsigned types (column '{}')",
				column.name
			)));
		}
		self.types.map(
			column.data_type,
			column.size,
			column.precision,
			column.scale,
		)
	}

	/// Expects `format_type()` output.
	fn logical_type(&self, native: &NativeType) -> Result<LogicalType> {
		let logical = match native.name.as_str() {
			"BOOLEAN" => LogicalType::new(DataType::Boolean),
			"SMALLINT" => LogicalType::new(DataType::Int16),
			"INTEGER" => LogicalType::new(DataType::Int32),
			"BIGINT" => LogicalType::new(DataType::Int64),
			"REAL" => LogicalType::new(DataType::Single),
			"DOUBLE PRECISION" => LogicalType::new(DataType::Double),
			"NUMERIC" => LogicalType::decimal(native)?,
			"CHARACTER VARYING" => LogicalType::sized(DataType::String, native.arg(0)),
			"TEXT" => LogicalType::new(DataType::String),
			"CHARACTER" => LogicalType::sized(DataType::StringFixedLength, native.arg(0)),
			"BYTEA" => LogicalType::new(DataType::Binary),
			"UUID" => LogicalType::new(DataType::Guid),
			"DATE" => LogicalType::new(DataType::Date),
			"TIME" | "TIME WITHOUT TIME ZONE" => LogicalType::new(DataType::Time),
			"TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => LogicalType::new(DataType::DateTime),
			_ => return Err(unsupported_native(native)),
		};
		Ok(logical)
	}

	fn identity_sql(&self) -> Option<&'static str> {
		Some("GENERATED BY DEFAULT AS IDENTITY")
	}

	fn render_bool(&self, value: bool) -> String {
		let literal = if value { "TRUE" } else { "FALSE" };
		literal.to_string()
	}

	fn render_bytes(&self, value: &[u8]) -> String {
		format!("'\\x{}'::bytea", hex_upper(value))
	}

	fn supports_included_columns(&self) -> bool {
		true
	}

	fn change_column_sql(&self, table: &TableName, column: &Column) -> Result<Vec<String>> {
		column.validate()?;
		let name = self.quote(&column.name);
		let native = self.map_type(column)?;

		let mut actions = vec![format!(
			"ALTER COLUMN {} TYPE {} USING {}::{}",
			name, native, name, native
		)];
		if column.is_not_null() || column.is_primary_key() {
			actions.push(format!("ALTER COLUMN {} SET NOT NULL", name));
		} else {
			actions.push(format!("ALTER COLUMN {} DROP NOT NULL", name));
		}
		match &column.default {
			Some(value) => actions.push(format!(
				"ALTER COLUMN {} SET DEFAULT {}",
				name,
				self.render_value(value)
			)),
			None => actions.push(format!("ALTER COLUMN {} DROP DEFAULT", name)),
		}

		Ok(vec![format!(
			"ALTER TABLE {} {}",
			self.quote_table(table),
			actions.join(", ")
		)])
	}

	fn create_index_sql(&self, table: &TableName, index: &Index) -> Result<Vec<String>> {
		let mut statements = super::default_create_index_sql(self, table, index)?;
		if index.clustered {
			statements.push(format!(
				"CLUSTER {} USING {}",
				self.quote_table(table),
				self.quote(&index.name)
			));
		}
		Ok(statements)
	}

	async fn connect(
		&self,
		url: &str,
		options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>> {
		let provider = PostgresProvider::connect(self.clone(), url, options).await?;
		Ok(Box::new(provider))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::schema::{FilterItem, FilterOperator, Value};
	use rstest::{fixture, rstest};

	#[fixture]
	fn dialect() -> PostgresDialect {
		PostgresDialect::new()
	}

	#[rstest]
	fn test_identity_column(dialect: PostgresDialect) {
		let column = Column::new("id", DataType::Int64)
			.with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY);
		assert_eq!(
			dialect.column_sql(&column).unwrap(),
			"id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
		);
	}

	#[rstest]
	fn test_mixed_case_identifier_quoted(dialect: PostgresDialect) {
		let table = TableName::new("SchemaInfo").in_schema(Some("public"));
		assert_eq!(dialect.quote_table(&table), "public.\"SchemaInfo\"");
	}

	#[rstest]
	fn test_unsigned_rejected(dialect: PostgresDialect) {
		let column = Column::new("qty", DataType::Int32).with_properties(ColumnProperty::UNSIGNED);
		assert!(matches!(
			dialect.column_sql(&column),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	fn test_partial_index_with_include_and_cluster(dialect: PostgresDialect) {
		let index = Index::new("ix_orders_open", ["customer_id"])
			.include(["total"])
			.clustered()
			.with_filter(FilterItem::new("archived", FilterOperator::Equal, false));
		let sql = dialect
			.create_index_sql(&TableName::new("orders"), &index)
			.unwrap();
		assert_eq!(
			sql,
			vec![
				"CREATE INDEX ix_orders_open ON orders (customer_id) INCLUDE (total) WHERE archived = FALSE".to_string(),
				"CLUSTER orders USING ix_orders_open".to_string(),
			]
		);
	}

	#[rstest]
	fn test_change_column_single_statement(dialect: PostgresDialect) {
		let column = Column::new("title", DataType::String)
			.with_size(300)
			.with_default("untitled")
			.with_properties(ColumnProperty::NOT_NULL);
		let sql = dialect
			.change_column_sql(&TableName::new("posts"), &column)
			.unwrap();
		assert_eq!(sql.len(), 1);
		assert!(sql[0].contains("ALTER COLUMN title TYPE VARCHAR(300) USING title::VARCHAR(300)"));
		assert!(sql[0].contains("SET NOT NULL"));
		assert!(sql[0].contains("SET DEFAULT 'untitled'"));
	}

	#[rstest]
	#[case("character varying(64)", DataType::String, Some(64))]
	#[case("text", DataType::String, None)]
	#[case("character(3)", DataType::StringFixedLength, Some(3))]
	#[case("timestamp without time zone", DataType::DateTime, None)]
	#[case("double precision", DataType::Double, None)]
	fn test_format_type_mapping(
		dialect: PostgresDialect,
		#[case] text: &str,
		#[case] data_type: DataType,
		#[case] size: Option<u32>,
	) {
		let logical = dialect.logical_type(&NativeType::parse(text)).unwrap();
		assert_eq!(logical.data_type, data_type);
		assert_eq!(logical.size, size);
	}

	#[rstest]
	fn test_render_values(dialect: PostgresDialect) {
		assert_eq!(dialect.render_value(&Value::Bool(true)), "TRUE");
		assert_eq!(dialect.render_value(&Value::Bytes(vec![0xca, 0xfe])), "'\\xCAFE'::bytea");
	}
}
