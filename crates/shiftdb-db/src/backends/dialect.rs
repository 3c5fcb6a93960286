//! SQL dialects
//!
//! A [`Dialect`] owns everything engine-specific about generating DDL: the
//! logical-to-native type registry, identifier quoting, literal rendering and
//! the composition of each structural statement. The default method bodies
//! produce standard `ALTER TABLE` syntax; each backend overrides the pieces
//! its engine spells differently.

use async_trait::async_trait;

pub mod mapper;
pub mod noop;
pub mod type_map;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mapper::{ColumnFragment, ColumnMapper};
pub use noop::NoopDialect;
pub use type_map::{LogicalType, NativeType, TypeMap};

#[cfg(feature = "mysql")]
pub use mysql::MysqlDialect;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDialect;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDialect;

use crate::backends::provider::TransformationProvider;
use crate::backends::schema::{
	Column, ColumnProperty, FilterItem, FilterOperator, ForeignKeyConstraint, Index, TableName,
	Value,
};
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};

#[async_trait]
pub trait Dialect: Send + Sync {
	/// Canonical backend identifier
	fn name(&self) -> &'static str;

	/// Additional identifiers the factory resolves to this dialect
	fn aliases(&self) -> &'static [&'static str] {
		&[]
	}

	/// Driver names accepted in [`ProviderOptions::driver`]
	fn drivers(&self) -> &'static [&'static str];

	fn database_type(&self) -> Option<DatabaseType>;

	fn is_available(&self) -> bool {
		self.database_type().is_some()
	}

	fn type_map(&self) -> &TypeMap;

	fn is_reserved(&self, word: &str) -> bool;

	fn quote_char(&self) -> char {
		'"'
	}

	/// Quotes an identifier when it is reserved or would not survive unquoted
	/// (upper-case letters, punctuation, leading digit).
	fn quote(&self, identifier: &str) -> String {
		if needs_quoting(identifier) || self.is_reserved(identifier) {
			let q = self.quote_char();
			let escaped = identifier.replace(q, &format!("{}{}", q, q));
			format!("{}{}{}", q, escaped, q)
		} else {
			identifier.to_string()
		}
	}

	fn quote_table(&self, table: &TableName) -> String {
		match &table.schema {
			Some(schema) => format!("{}.{}", self.quote(schema), self.quote(&table.name)),
			None => self.quote(&table.name),
		}
	}

	fn quote_list(&self, identifiers: &[String]) -> String {
		identifiers
			.iter()
			.map(|identifier| self.quote(identifier))
			.collect::<Vec<_>>()
			.join(", ")
	}

	/// Native type for a column, including an `UNSIGNED` suffix when requested.
	fn map_type(&self, column: &Column) -> Result<String> {
		let mut native = self.type_map().map(
			column.data_type,
			column.size,
			column.precision,
			column.scale,
		)?;
		if column.properties.is_set(ColumnProperty::UNSIGNED) {
			native.push_str(" UNSIGNED");
		}
		Ok(native)
	}

	/// Reverse mapping used by introspection. Unknown native types must fail.
	fn logical_type(&self, native: &NativeType) -> Result<LogicalType>;

	fn identity_sql(&self) -> Option<&'static str>;

	fn fragment_order(&self) -> &'static [ColumnFragment] {
		&ColumnFragment::DEFAULT_ORDER
	}

	fn render_fragment(&self, kind: ColumnFragment, column: &Column) -> Result<Option<String>> {
		default_fragment(self, kind, column)
	}

	fn column_mapper(&self, column: &Column) -> Result<ColumnMapper> {
		column.validate()?;
		let mut fragments = Vec::new();
		for kind in self.fragment_order() {
			if let Some(sql) = self.render_fragment(*kind, column)? {
				fragments.push((*kind, sql));
			}
		}
		Ok(ColumnMapper::new(fragments))
	}

	fn column_sql(&self, column: &Column) -> Result<String> {
		Ok(self.column_mapper(column)?.to_sql())
	}

	fn render_bool(&self, value: bool) -> String {
		let literal = if value { "1" } else { "0" };
		literal.to_string()
	}

	fn escape_string(&self, value: &str) -> String {
		value.replace('\'', "''")
	}

	fn render_bytes(&self, value: &[u8]) -> String {
		format!("X'{}'", hex_upper(value))
	}

	fn render_uuid(&self, value: &uuid::Uuid) -> String {
		format!("'{}'", value.hyphenated())
	}

	/// Renders a literal for embedding in DDL (defaults, index predicates).
	fn render_value(&self, value: &Value) -> String {
		match value {
			Value::Null => "NULL".to_string(),
			Value::Bool(b) => self.render_bool(*b),
			Value::Int(i) => i.to_string(),
			Value::Float(f) if f.is_finite() => f.to_string(),
			Value::Float(f) => format!("'{}'", f),
			Value::Decimal(d) => d.to_string(),
			Value::String(s) => format!("'{}'", self.escape_string(s)),
			Value::Bytes(b) => self.render_bytes(b),
			Value::Uuid(u) => self.render_uuid(u),
			Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
			Value::Raw(expression) => expression.clone(),
		}
	}

	/// `AND`-joined predicate for a filtered index.
	fn filter_predicate(&self, items: &[FilterItem]) -> String {
		items
			.iter()
			.map(|item| {
				let column = self.quote(&item.column);
				match (&item.value, item.operator) {
					(Value::Null, FilterOperator::Equal) => format!("{} IS NULL", column),
					(Value::Null, FilterOperator::NotEqual) => format!("{} IS NOT NULL", column),
					(value, operator) => {
						format!("{} {} {}", column, operator.as_sql(), self.render_value(value))
					}
				}
			})
			.collect::<Vec<_>>()
			.join(" AND ")
	}

	fn supports_partial_indexes(&self) -> bool {
		true
	}

	fn supports_included_columns(&self) -> bool {
		false
	}

	fn create_table_sql(&self, table: &TableName, columns: &[Column]) -> Result<String> {
		if columns.is_empty() {
			return Err(MigrationError::InvalidOperation(format!(
				"table '{}' must have at least one column",
				table
			)));
		}
		ensure_distinct_columns(table, columns)?;

		let (columns, composite_key) = split_composite_primary_key(columns);
		let mut definitions = columns
			.iter()
			.map(|column| self.column_sql(column))
			.collect::<Result<Vec<_>>>()?;
		if !composite_key.is_empty() {
			definitions.push(format!("PRIMARY KEY ({})", self.quote_list(&composite_key)));
		}

		Ok(format!(
			"CREATE TABLE {} ({})",
			self.quote_table(table),
			definitions.join(", ")
		))
	}

	fn drop_table_sql(&self, table: &TableName) -> String {
		format!("DROP TABLE {}", self.quote_table(table))
	}

	fn rename_table_sql(&self, table: &TableName, new_name: &str) -> String {
		format!(
			"ALTER TABLE {} RENAME TO {}",
			self.quote_table(table),
			self.quote(new_name)
		)
	}

	fn add_column_sql(&self, table: &TableName, column: &Column) -> Result<String> {
		Ok(format!(
			"ALTER TABLE {} ADD COLUMN {}",
			self.quote_table(table),
			self.column_sql(column)?
		))
	}

	fn drop_column_sql(&self, table: &TableName, column: &str) -> String {
		format!(
			"ALTER TABLE {} DROP COLUMN {}",
			self.quote_table(table),
			self.quote(column)
		)
	}

	fn rename_column_sql(&self, table: &TableName, old_name: &str, new_name: &str) -> String {
		format!(
			"ALTER TABLE {} RENAME COLUMN {} TO {}",
			self.quote_table(table),
			self.quote(old_name),
			self.quote(new_name)
		)
	}

	/// Statements redefining an existing column in place.
	fn change_column_sql(&self, _table: &TableName, column: &Column) -> Result<Vec<String>> {
		Err(MigrationError::InvalidOperation(format!(
			"{} cannot change column '{}' in place",
			self.name(),
			column.name
		)))
	}

	fn change_default_sql(&self, table: &TableName, column: &str, value: Option<&Value>) -> String {
		let action = match value {
			Some(value) => format!("SET DEFAULT {}", self.render_value(value)),
			None => "DROP DEFAULT".to_string(),
		};
		format!(
			"ALTER TABLE {} ALTER COLUMN {} {}",
			self.quote_table(table),
			self.quote(column),
			action
		)
	}

	/// `FOREIGN KEY (...) REFERENCES ...` clause shared by `ALTER TABLE` and
	/// table-level constraint lists.
	fn foreign_key_clause(&self, fk: &ForeignKeyConstraint, referenced: &TableName) -> String {
		format!(
			"CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
			self.quote(&fk.name),
			self.quote_list(&fk.columns),
			self.quote_table(referenced),
			self.quote_list(&fk.referenced_columns),
			fk.on_delete.as_sql(),
			fk.on_update.as_sql()
		)
	}

	fn add_foreign_key_sql(&self, table: &TableName, fk: &ForeignKeyConstraint) -> Result<String> {
		fk.validate()?;
		let referenced = TableName {
			schema: table.schema.clone(),
			name: fk.referenced_table.clone(),
		};
		Ok(format!(
			"ALTER TABLE {} ADD {}",
			self.quote_table(table),
			self.foreign_key_clause(fk, &referenced)
		))
	}

	fn drop_foreign_key_sql(&self, table: &TableName, name: &str) -> String {
		self.drop_constraint_sql(table, name)
	}

	fn add_primary_key_sql(&self, table: &TableName, name: &str, columns: &[String]) -> String {
		format!(
			"ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
			self.quote_table(table),
			self.quote(name),
			self.quote_list(columns)
		)
	}

	fn drop_primary_key_sql(&self, table: &TableName, name: &str) -> String {
		self.drop_constraint_sql(table, name)
	}

	fn add_unique_sql(&self, table: &TableName, name: &str, columns: &[String]) -> String {
		format!(
			"ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
			self.quote_table(table),
			self.quote(name),
			self.quote_list(columns)
		)
	}

	fn add_check_sql(&self, table: &TableName, name: &str, expression: &str) -> String {
		format!(
			"ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
			self.quote_table(table),
			self.quote(name),
			expression
		)
	}

	fn drop_constraint_sql(&self, table: &TableName, name: &str) -> String {
		format!(
			"ALTER TABLE {} DROP CONSTRAINT {}",
			self.quote_table(table),
			self.quote(name)
		)
	}

	/// Key list for a filtered index on engines without partial indexes.
	///
	/// Every key column becomes `(CASE WHEN <predicate> THEN col ELSE NULL END)`,
	/// so rows outside the predicate index as NULL.
	fn filtered_key_expressions(&self, index: &Index) -> Vec<String> {
		let predicate = self.filter_predicate(&index.filter);
		index
			.key_columns
			.iter()
			.map(|column| {
				format!(
					"(CASE WHEN {} THEN {} ELSE NULL END)",
					predicate,
					self.quote(column)
				)
			})
			.collect()
	}

	fn create_index_sql(&self, table: &TableName, index: &Index) -> Result<Vec<String>> {
		default_create_index_sql(self, table, index)
	}

	fn drop_index_sql(&self, table: &TableName, name: &str) -> String {
		let index = TableName {
			schema: table.schema.clone(),
			name: name.to_string(),
		};
		format!("DROP INDEX {}", self.quote_table(&index))
	}

	/// Opens a connection and returns the provider bound to this dialect.
	async fn connect(
		&self,
		url: &str,
		options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>>;
}

/// Fragment rendering shared by every dialect; backends delegate here for the
/// fragments they do not override.
pub fn default_fragment<D: Dialect + ?Sized>(
	dialect: &D,
	kind: ColumnFragment,
	column: &Column,
) -> Result<Option<String>> {
	let sql = match kind {
		ColumnFragment::Name => Some(dialect.quote(&column.name)),
		ColumnFragment::Type => Some(dialect.map_type(column)?),
		ColumnFragment::Identity if column.is_identity() => {
			let identity = dialect.identity_sql().ok_or_else(|| {
				MigrationError::InvalidOperation(format!(
					"{} has no identity columns (column '{}')",
					dialect.name(),
					column.name
				))
			})?;
			Some(identity.to_string())
		}
		ColumnFragment::PrimaryKey if column.is_primary_key() => Some("PRIMARY KEY".to_string()),
		ColumnFragment::Unique if column.is_unique() && !column.is_primary_key() => {
			Some("UNIQUE".to_string())
		}
		ColumnFragment::Default => column
			.default
			.as_ref()
			.map(|value| format!("DEFAULT {}", dialect.render_value(value))),
		ColumnFragment::Nullability if !column.is_primary_key() => {
			if column.properties.is_set(ColumnProperty::NOT_NULL) {
				Some("NOT NULL".to_string())
			} else if column.properties.is_set(ColumnProperty::NULL) {
				Some("NULL".to_string())
			} else {
				None
			}
		}
		// Foreign keys are table constraints added through add_foreign_key.
		_ => None,
	};
	Ok(sql)
}

/// `CREATE INDEX` composition shared by every dialect.
pub fn default_create_index_sql<D: Dialect + ?Sized>(
	dialect: &D,
	table: &TableName,
	index: &Index,
) -> Result<Vec<String>> {
	index.validate()?;
	if !index.include_columns.is_empty() && !dialect.supports_included_columns() {
		return Err(MigrationError::InvalidOperation(format!(
			"{} does not support included index columns (index '{}')",
			dialect.name(),
			index.name
		)));
	}

	let native_filter = index.is_filtered() && dialect.supports_partial_indexes();
	let keys = if index.is_filtered() && !native_filter {
		dialect.filtered_key_expressions(index).join(", ")
	} else {
		dialect.quote_list(&index.key_columns)
	};

	let mut sql = format!(
		"CREATE {}INDEX {} ON {} ({})",
		if index.unique { "UNIQUE " } else { "" },
		dialect.quote(&index.name),
		dialect.quote_table(table),
		keys
	);
	if !index.include_columns.is_empty() {
		sql.push_str(&format!(" INCLUDE ({})", dialect.quote_list(&index.include_columns)));
	}
	if native_filter {
		sql.push_str(&format!(" WHERE {}", dialect.filter_predicate(&index.filter)));
	}
	Ok(vec![sql])
}

/// Moves a multi-column primary key out of the column definitions.
///
/// Returns the columns with `PRIMARY_KEY` cleared (and `NOT_NULL` set) plus the
/// key column names, or the columns unchanged and an empty list.
pub(crate) fn split_composite_primary_key(columns: &[Column]) -> (Vec<Column>, Vec<String>) {
	let key: Vec<String> = columns
		.iter()
		.filter(|column| column.is_primary_key())
		.map(|column| column.name.clone())
		.collect();
	if key.len() < 2 {
		return (columns.to_vec(), Vec::new());
	}

	let columns = columns
		.iter()
		.cloned()
		.map(|mut column| {
			if column.is_primary_key() {
				column.properties =
					column.properties.clear(ColumnProperty::PRIMARY_KEY) | ColumnProperty::NOT_NULL;
			}
			column
		})
		.collect();
	(columns, key)
}

fn ensure_distinct_columns(table: &TableName, columns: &[Column]) -> Result<()> {
	for (i, column) in columns.iter().enumerate() {
		if columns[..i]
			.iter()
			.any(|other| other.name.eq_ignore_ascii_case(&column.name))
		{
			return Err(MigrationError::InvalidOperation(format!(
				"column '{}' is defined twice on table '{}'",
				column.name, table
			)));
		}
	}
	Ok(())
}

fn needs_quoting(identifier: &str) -> bool {
	let mut chars = identifier.chars();
	match chars.next() {
		Some(first) if first.is_ascii_lowercase() || first == '_' => {}
		_ => return true,
	}
	!chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub(crate) fn hex_upper(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Parses a default expression as stored by a catalog (`'text'`, `42`,
/// `'abc'::character varying`, `CURRENT_TIMESTAMP`).
pub(crate) fn parse_default_literal(expression: &str) -> Option<Value> {
	let mut text = expression.trim();
	while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
		text = inner.trim();
	}
	if text.is_empty() || text.eq_ignore_ascii_case("NULL") {
		return None;
	}

	// PostgreSQL appends casts to literal defaults.
	let literal = match text.find("::") {
		Some(at) if text.starts_with('\'') => &text[..at],
		_ => text,
	};

	if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
		let inner = &literal[1..literal.len() - 1];
		return Some(Value::String(inner.replace("''", "'")));
	}
	if literal.eq_ignore_ascii_case("TRUE") {
		return Some(Value::Bool(true));
	}
	if literal.eq_ignore_ascii_case("FALSE") {
		return Some(Value::Bool(false));
	}
	if let Ok(int) = literal.parse::<i64>() {
		return Some(Value::Int(int));
	}
	if let Ok(float) = literal.parse::<f64>() {
		return Some(Value::Float(float));
	}
	Some(Value::Raw(text.to_string()))
}

/// Adjusts an introspected default to the column's logical type.
pub(crate) fn coerce_default(column: &Column, value: Value) -> Value {
	use crate::backends::schema::DataType;

	match (column.data_type, value) {
		(DataType::Boolean, Value::Int(i)) => Value::Bool(i != 0),
		(DataType::Boolean, Value::String(s)) if s == "0" || s == "1" => Value::Bool(s == "1"),
		(DataType::Decimal, Value::Int(i)) => Value::Decimal(i.into()),
		(DataType::Decimal, Value::Float(f)) => rust_decimal::Decimal::try_from(f)
			.map(Value::Decimal)
			.unwrap_or(Value::Float(f)),
		(DataType::Single | DataType::Double, Value::Int(i)) => Value::Float(i as f64),
		(_, value) => value,
	}
}
