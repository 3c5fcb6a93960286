//! PostgreSQL transformation provider
//!
//! DDL is transactional, so every default `ALTER TABLE` mutator applies as-is.
//! Introspection reads `pg_catalog` directly: `pg_attribute` for columns,
//! `pg_constraint` for keys and checks, `pg_index` for indexes.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Connection, PgConnection, Row, ValueRef};

use super::{DdlExecutor, SchemaIntrospector, TransformationProvider, catalog_column, property_index_name};
use crate::backends::dialect::{Dialect, NativeType, PostgresDialect};
use crate::backends::schema::{
	Column, ColumnProperty, ForeignKeyAction, ForeignKeyConstraint, Index, Value,
};
use crate::backends::types::ProviderOptions;
use crate::error::{MigrationError, Result};

const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL provider over a single connection.
pub struct PostgresProvider {
	conn: PgConnection,
	dialect: PostgresDialect,
	options: ProviderOptions,
	/// Schema searched by introspection
	schema: String,
	in_transaction: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ColumnRow {
	name: String,
	native_type: String,
	not_null: bool,
	is_identity: bool,
	default_value: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ConstraintRow {
	name: String,
	/// `p`, `u`, `f`, `c`, `x`
	kind: String,
	columns: Vec<String>,
	referenced_table: Option<String>,
	referenced_columns: Vec<String>,
	on_delete: String,
	on_update: String,
}

#[derive(Debug, sqlx::FromRow)]
struct IndexRow {
	name: String,
	is_unique: bool,
	is_primary: bool,
	is_clustered: bool,
	key_count: i32,
	columns: Vec<String>,
}

/// Maps `pg_constraint.confdeltype` / `confupdtype` codes.
fn referential_action(code: &str) -> ForeignKeyAction {
	match code {
		"r" => ForeignKeyAction::Restrict,
		"c" => ForeignKeyAction::Cascade,
		"n" => ForeignKeyAction::SetNull,
		"d" => ForeignKeyAction::SetDefault,
		_ => ForeignKeyAction::NoAction,
	}
}

impl PostgresProvider {
	pub async fn connect(
		dialect: PostgresDialect,
		url: &str,
		options: ProviderOptions,
	) -> Result<Self> {
		let connect_options: PgConnectOptions = url.parse()?;
		let mut conn = PgConnection::connect_with(&connect_options).await?;
		let schema = match &options.schema {
			Some(schema) => schema.clone(),
			None => sqlx::query_scalar::<_, Option<String>>("SELECT current_schema()::text")
				.fetch_one(&mut conn)
				.await?
				.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
		};
		tracing::debug!(schema = %schema, "connected to postgres");
		Ok(Self {
			conn,
			dialect,
			options,
			schema,
			in_transaction: false,
		})
	}

	async fn column_rows(&mut self, table: &str) -> Result<Vec<ColumnRow>> {
		Ok(sqlx::query_as(
			r#"
			SELECT a.attname::text AS name,
			       format_type(a.atttypid, a.atttypmod) AS native_type,
			       a.attnotnull AS not_null,
			       a.attidentity <> '' AS is_identity,
			       pg_get_expr(d.adbin, d.adrelid) AS default_value
			FROM pg_attribute a
			JOIN pg_class c ON c.oid = a.attrelid
			JOIN pg_namespace n ON n.oid = c.relnamespace
			LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
			WHERE n.nspname = $1 AND c.relname = $2
			  AND a.attnum > 0 AND NOT a.attisdropped
			ORDER BY a.attnum
			"#,
		)
		.bind(&self.schema)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn constraint_rows(&mut self, table: &str) -> Result<Vec<ConstraintRow>> {
		Ok(sqlx::query_as(
			r#"
			SELECT con.conname::text AS name,
			       con.contype::text AS kind,
			       ARRAY(
			           SELECT att.attname::text
			           FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
			           JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
			           ORDER BY k.ord
			       ) AS columns,
			       ref.relname::text AS referenced_table,
			       ARRAY(
			           SELECT att.attname::text
			           FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
			           JOIN pg_attribute att ON att.attrelid = con.confrelid AND att.attnum = k.attnum
			           ORDER BY k.ord
			       ) AS referenced_columns,
			       con.confdeltype::text AS on_delete,
			       con.confupdtype::text AS on_update
			FROM pg_constraint con
			JOIN pg_class c ON c.oid = con.conrelid
			JOIN pg_namespace n ON n.oid = c.relnamespace
			LEFT JOIN pg_class ref ON ref.oid = con.confrelid
			WHERE n.nspname = $1 AND c.relname = $2
			ORDER BY con.conname
			"#,
		)
		.bind(&self.schema)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn index_rows(&mut self, table: &str) -> Result<Vec<IndexRow>> {
		Ok(sqlx::query_as(
			r#"
			SELECT i.relname::text AS name,
			       ix.indisunique AS is_unique,
			       ix.indisprimary AS is_primary,
			       ix.indisclustered AS is_clustered,
			       ix.indnkeyatts::int4 AS key_count,
			       ARRAY(
			           SELECT a.attname::text
			           FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
			           JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
			           ORDER BY k.ord
			       ) AS columns
			FROM pg_index ix
			JOIN pg_class i ON i.oid = ix.indexrelid
			JOIN pg_class t ON t.oid = ix.indrelid
			JOIN pg_namespace n ON n.oid = t.relnamespace
			WHERE n.nspname = $1 AND t.relname = $2
			ORDER BY i.relname
			"#,
		)
		.bind(&self.schema)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?)
	}
}

fn decode_scalar(row: &PgRow) -> Result<Option<Value>> {
	if row.try_get_raw(0)?.is_null() {
		return Ok(None);
	}
	if let Ok(v) = row.try_get::<i64, _>(0) {
		return Ok(Some(Value::Int(v)));
	}
	if let Ok(v) = row.try_get::<i32, _>(0) {
		return Ok(Some(Value::Int(v.into())));
	}
	if let Ok(v) = row.try_get::<i16, _>(0) {
		return Ok(Some(Value::Int(v.into())));
	}
	if let Ok(v) = row.try_get::<f64, _>(0) {
		return Ok(Some(Value::Float(v)));
	}
	if let Ok(v) = row.try_get::<f32, _>(0) {
		return Ok(Some(Value::Float(v.into())));
	}
	if let Ok(v) = row.try_get::<rust_decimal::Decimal, _>(0) {
		return Ok(Some(Value::Decimal(v)));
	}
	if let Ok(v) = row.try_get::<bool, _>(0) {
		return Ok(Some(Value::Bool(v)));
	}
	if let Ok(v) = row.try_get::<String, _>(0) {
		return Ok(Some(Value::String(v)));
	}
	if let Ok(v) = row.try_get::<uuid::Uuid, _>(0) {
		return Ok(Some(Value::Uuid(v)));
	}
	if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(0) {
		return Ok(Some(Value::DateTime(v)));
	}
	let bytes: Vec<u8> = row.try_get(0)?;
	Ok(Some(Value::Bytes(bytes)))
}

#[async_trait]
impl SchemaIntrospector for PostgresProvider {
	async fn get_tables(&mut self) -> Result<Vec<String>> {
		Ok(sqlx::query_scalar(
			r#"
			SELECT c.relname::text
			FROM pg_class c
			JOIN pg_namespace n ON n.oid = c.relnamespace
			WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
			ORDER BY c.relname
			"#,
		)
		.bind(&self.schema)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn table_exists(&mut self, table: &str) -> Result<bool> {
		Ok(sqlx::query_scalar(
			r#"
			SELECT EXISTS (
			    SELECT 1 FROM pg_class c
			    JOIN pg_namespace n ON n.oid = c.relnamespace
			    WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
			)
			"#,
		)
		.bind(&self.schema)
		.bind(table)
		.fetch_one(&mut self.conn)
		.await?)
	}

	async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
		let rows = self.column_rows(table).await?;
		if rows.is_empty() {
			return Ok(Vec::new());
		}
		let constraints = self.constraint_rows(table).await?;
		let indexes = self.index_rows(table).await?;

		let key: HashSet<&str> = constraints
			.iter()
			.filter(|c| c.kind == "p")
			.flat_map(|c| c.columns.iter().map(String::as_str))
			.collect();
		let unique: HashSet<&str> = constraints
			.iter()
			.filter(|c| c.kind == "u" && c.columns.len() == 1)
			.map(|c| c.columns[0].as_str())
			.collect();
		let referencing: HashSet<&str> = constraints
			.iter()
			.filter(|c| c.kind == "f")
			.flat_map(|c| c.columns.iter().map(String::as_str))
			.collect();
		let index_names: HashSet<&str> = indexes.iter().map(|i| i.name.as_str()).collect();

		rows.iter()
			.map(|row| {
				let native = NativeType::parse(&row.native_type);
				let logical = self.dialect.logical_type(&native).map_err(|e| match e {
					MigrationError::UnsupportedType(msg) => {
						MigrationError::UnsupportedType(format!("{}.{}: {}", table, row.name, msg))
					}
					other => other,
				})?;

				// serial columns report a nextval() default instead of attidentity.
				let serial = row
					.default_value
					.as_deref()
					.is_some_and(|d| d.starts_with("nextval("));
				let mut properties = ColumnProperty::NONE;
				if key.contains(row.name.as_str()) {
					properties |= ColumnProperty::PRIMARY_KEY;
				} else if unique.contains(row.name.as_str()) {
					properties |= ColumnProperty::UNIQUE;
				}
				if row.is_identity || serial {
					properties |= ColumnProperty::IDENTITY;
				}
				properties |= if row.not_null {
					ColumnProperty::NOT_NULL
				} else {
					ColumnProperty::NULL
				};
				if index_names.contains(property_index_name(table, &row.name).as_str()) {
					properties |= ColumnProperty::INDEXED;
				}
				if referencing.contains(row.name.as_str()) {
					properties |= ColumnProperty::FOREIGN_KEY;
				}

				Ok(catalog_column(
					row.name.clone(),
					logical,
					properties,
					row.default_value.as_deref(),
				))
			})
			.collect()
	}

	async fn get_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
		let rows = self.index_rows(table).await?;
		Ok(rows
			.into_iter()
			.map(|row| {
				let split = usize::try_from(row.key_count)
					.unwrap_or(0)
					.min(row.columns.len());
				let (keys, included) = row.columns.split_at(split);
				let mut index = Index::new(row.name, keys.to_vec());
				index.unique = row.is_unique;
				index.primary_key = row.is_primary;
				index.clustered = row.is_clustered;
				index.include_columns = included.to_vec();
				index
			})
			.collect())
	}

	async fn get_foreign_key_constraints(
		&mut self,
		table: &str,
	) -> Result<Vec<ForeignKeyConstraint>> {
		let rows = self.constraint_rows(table).await?;
		Ok(rows
			.into_iter()
			.filter(|row| row.kind == "f")
			.map(|row| ForeignKeyConstraint {
				name: row.name,
				table: table.to_string(),
				columns: row.columns,
				referenced_table: row.referenced_table.unwrap_or_default(),
				referenced_columns: row.referenced_columns,
				on_delete: referential_action(&row.on_delete),
				on_update: referential_action(&row.on_update),
			})
			.collect())
	}

	async fn constraint_exists(&mut self, table: &str, name: &str) -> Result<bool> {
		Ok(self
			.constraint_rows(table)
			.await?
			.iter()
			.any(|row| row.name == name))
	}

	async fn primary_key_name(&mut self, table: &str) -> Result<Option<String>> {
		Ok(self
			.constraint_rows(table)
			.await?
			.into_iter()
			.find(|row| row.kind == "p")
			.map(|row| row.name))
	}
}

#[async_trait]
impl DdlExecutor for PostgresProvider {
	fn dialect(&self) -> &dyn Dialect {
		&self.dialect
	}

	fn options(&self) -> &ProviderOptions {
		&self.options
	}

	async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
		self.options.logger.applying_db_change(sql);
		let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
		Ok(result.rows_affected())
	}

	async fn execute_scalar(&mut self, sql: &str) -> Result<Option<Value>> {
		match sqlx::query(sql).fetch_optional(&mut self.conn).await? {
			Some(row) => decode_scalar(&row),
			None => Ok(None),
		}
	}

	async fn query_i64(&mut self, sql: &str) -> Result<Vec<i64>> {
		Ok(sqlx::query_scalar(sql).fetch_all(&mut self.conn).await?)
	}

	async fn begin_transaction(&mut self) -> Result<()> {
		if self.in_transaction {
			return Err(MigrationError::Transaction(
				"a transaction is already active on this provider".to_string(),
			));
		}
		sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql("BEGIN")).await?;
		self.in_transaction = true;
		Ok(())
	}

	async fn commit(&mut self) -> Result<()> {
		if !self.in_transaction {
			return Err(MigrationError::Transaction(
				"commit without an active transaction".to_string(),
			));
		}
		self.in_transaction = false;
		sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql("COMMIT")).await?;
		Ok(())
	}

	async fn rollback(&mut self) -> Result<()> {
		if !self.in_transaction {
			return Err(MigrationError::Transaction(
				"rollback without an active transaction".to_string(),
			));
		}
		self.in_transaction = false;
		sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql("ROLLBACK")).await?;
		Ok(())
	}

	fn in_transaction(&self) -> bool {
		self.in_transaction
	}
}

impl TransformationProvider for PostgresProvider {}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("a", ForeignKeyAction::NoAction)]
	#[case("r", ForeignKeyAction::Restrict)]
	#[case("c", ForeignKeyAction::Cascade)]
	#[case("n", ForeignKeyAction::SetNull)]
	#[case("d", ForeignKeyAction::SetDefault)]
	#[case(" ", ForeignKeyAction::NoAction)]
	fn test_referential_action_codes(#[case] code: &str, #[case] expected: ForeignKeyAction) {
		assert_eq!(referential_action(code), expected);
	}
}
