//! MySQL transformation provider
//!
//! MySQL commits implicitly around every DDL statement. Transactions still
//! group the bookkeeping rows, but a failed migration can leave earlier DDL of
//! the same migration applied.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Connection, MySqlConnection, Row, ValueRef};

use super::{DdlExecutor, SchemaIntrospector, TransformationProvider, catalog_column, property_index_name};
use crate::backends::dialect::{Dialect, MysqlDialect, NativeType, coerce_default, parse_default_literal};
use crate::backends::schema::{
	Column, ColumnProperty, ForeignKeyAction, ForeignKeyConstraint, Index, Value,
};
use crate::backends::types::ProviderOptions;
use crate::error::{MigrationError, Result};

/// Name MySQL gives every primary key.
const PRIMARY_KEY_NAME: &str = "PRIMARY";

/// MySQL provider over a single connection.
pub struct MysqlProvider {
	conn: MySqlConnection,
	dialect: MysqlDialect,
	options: ProviderOptions,
	/// Database searched by introspection
	database: String,
	in_transaction: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ColumnRow {
	name: String,
	native_type: String,
	is_nullable: String,
	default_value: Option<String>,
	extra: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticsRow {
	name: String,
	column_name: Option<String>,
	non_unique: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ForeignKeyRow {
	name: String,
	column_name: String,
	referenced_table: String,
	referenced_column: String,
	on_update: String,
	on_delete: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ConstraintRow {
	name: String,
	kind: String,
}

/// One index assembled from its STATISTICS rows.
struct IndexEntry {
	name: String,
	unique: bool,
	columns: Vec<String>,
}

/// `information_schema.COLUMNS.COLUMN_DEFAULT` is unquoted for string columns
/// and holds the expression text when `EXTRA` says `DEFAULT_GENERATED`.
fn column_default(column: &Column, text: Option<&str>, extra: &str) -> Option<Value> {
	let text = text?;
	let value = if extra.to_ascii_uppercase().contains("DEFAULT_GENERATED") {
		Value::Raw(text.to_string())
	} else if column.data_type.is_textual() && !text.starts_with('\'') {
		Value::String(text.to_string())
	} else {
		parse_default_literal(text)?
	};
	Some(coerce_default(column, value))
}

impl MysqlProvider {
	pub async fn connect(dialect: MysqlDialect, url: &str, options: ProviderOptions) -> Result<Self> {
		let connect_options: MySqlConnectOptions = url.parse()?;
		let mut conn = MySqlConnection::connect_with(&connect_options).await?;
		let database = match &options.schema {
			Some(schema) => schema.clone(),
			None => sqlx::query_scalar::<_, Option<String>>("SELECT DATABASE()")
				.fetch_one(&mut conn)
				.await?
				.ok_or_else(|| {
					MigrationError::InvalidOperation(
						"mysql connection has no default database; name one in the url or the schema option"
							.to_string(),
					)
				})?,
		};
		tracing::debug!(database = %database, "connected to mysql");
		Ok(Self {
			conn,
			dialect,
			options,
			database,
			in_transaction: false,
		})
	}

	async fn column_rows(&mut self, table: &str) -> Result<Vec<ColumnRow>> {
		Ok(sqlx::query_as(
			r#"
			SELECT CAST(COLUMN_NAME AS CHAR) AS name,
			       CAST(COLUMN_TYPE AS CHAR) AS native_type,
			       CAST(IS_NULLABLE AS CHAR) AS is_nullable,
			       CAST(COLUMN_DEFAULT AS CHAR) AS default_value,
			       CAST(EXTRA AS CHAR) AS extra
			FROM information_schema.COLUMNS
			WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
			ORDER BY ORDINAL_POSITION
			"#,
		)
		.bind(&self.database)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn index_entries(&mut self, table: &str) -> Result<Vec<IndexEntry>> {
		let rows: Vec<StatisticsRow> = sqlx::query_as(
			r#"
			SELECT CAST(INDEX_NAME AS CHAR) AS name,
			       CAST(COLUMN_NAME AS CHAR) AS column_name,
			       CAST(NON_UNIQUE AS SIGNED) AS non_unique
			FROM information_schema.STATISTICS
			WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
			ORDER BY INDEX_NAME, SEQ_IN_INDEX
			"#,
		)
		.bind(&self.database)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?;

		let mut grouped: BTreeMap<String, IndexEntry> = BTreeMap::new();
		for row in rows {
			let entry = grouped.entry(row.name.clone()).or_insert_with(|| IndexEntry {
				name: row.name,
				unique: row.non_unique == 0,
				columns: Vec::new(),
			});
			// Functional key parts have no column name.
			entry.columns.extend(row.column_name);
		}
		Ok(grouped.into_values().collect())
	}

	async fn constraint_rows(&mut self, table: &str) -> Result<Vec<ConstraintRow>> {
		Ok(sqlx::query_as(
			r#"
			SELECT CAST(CONSTRAINT_NAME AS CHAR) AS name,
			       CAST(CONSTRAINT_TYPE AS CHAR) AS kind
			FROM information_schema.TABLE_CONSTRAINTS
			WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
			"#,
		)
		.bind(&self.database)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?)
	}
}

fn decode_scalar(row: &MySqlRow) -> Result<Option<Value>> {
	if row.try_get_raw(0)?.is_null() {
		return Ok(None);
	}
	if let Ok(v) = row.try_get::<i64, _>(0) {
		return Ok(Some(Value::Int(v)));
	}
	if let Ok(v) = row.try_get::<u64, _>(0) {
		return Ok(Some(match i64::try_from(v) {
			Ok(v) => Value::Int(v),
			Err(_) => Value::Decimal(v.into()),
		}));
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
	if let Ok(v) = row.try_get::<String, _>(0) {
		return Ok(Some(Value::String(v)));
	}
	if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(0) {
		return Ok(Some(Value::DateTime(v)));
	}
	let bytes: Vec<u8> = row.try_get(0)?;
	Ok(Some(Value::Bytes(bytes)))
}

#[async_trait]
impl SchemaIntrospector for MysqlProvider {
	async fn get_tables(&mut self) -> Result<Vec<String>> {
		Ok(sqlx::query_scalar(
			r#"
			SELECT CAST(TABLE_NAME AS CHAR)
			FROM information_schema.TABLES
			WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
			ORDER BY TABLE_NAME
			"#,
		)
		.bind(&self.database)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
		let rows = self.column_rows(table).await?;
		if rows.is_empty() {
			return Ok(Vec::new());
		}
		let indexes = self.index_entries(table).await?;
		let referencing: HashSet<String> = self
			.get_foreign_key_constraints(table)
			.await?
			.into_iter()
			.flat_map(|fk| fk.columns)
			.collect();

		let key: HashSet<&str> = indexes
			.iter()
			.filter(|i| i.name == PRIMARY_KEY_NAME)
			.flat_map(|i| i.columns.iter().map(String::as_str))
			.collect();
		let unique: HashSet<&str> = indexes
			.iter()
			.filter(|i| i.unique && i.name != PRIMARY_KEY_NAME && i.columns.len() == 1)
			.map(|i| i.columns[0].as_str())
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

				let mut properties = ColumnProperty::NONE;
				if key.contains(row.name.as_str()) {
					properties |= ColumnProperty::PRIMARY_KEY;
				} else if unique.contains(row.name.as_str()) {
					properties |= ColumnProperty::UNIQUE;
				}
				if row.extra.to_ascii_lowercase().contains("auto_increment") {
					properties |= ColumnProperty::IDENTITY;
				}
				properties |= if row.is_nullable.eq_ignore_ascii_case("NO") {
					ColumnProperty::NOT_NULL
				} else {
					ColumnProperty::NULL
				};
				if index_names.contains(property_index_name(table, &row.name).as_str()) {
					properties |= ColumnProperty::INDEXED;
				}
				if referencing.contains(&row.name) {
					properties |= ColumnProperty::FOREIGN_KEY;
				}
				if native.unsigned {
					properties |= ColumnProperty::UNSIGNED;
				}

				let mut column = catalog_column(row.name.clone(), logical, properties, None);
				if !column.is_identity() {
					column.default = column_default(&column, row.default_value.as_deref(), &row.extra);
				}
				Ok(column)
			})
			.collect()
	}

	async fn get_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
		Ok(self
			.index_entries(table)
			.await?
			.into_iter()
			.map(|entry| {
				let primary_key = entry.name == PRIMARY_KEY_NAME;
				let mut index = Index::new(entry.name, entry.columns);
				index.unique = entry.unique;
				index.primary_key = primary_key;
				index.clustered = primary_key;
				index
			})
			.collect())
	}

	async fn get_foreign_key_constraints(
		&mut self,
		table: &str,
	) -> Result<Vec<ForeignKeyConstraint>> {
		let rows: Vec<ForeignKeyRow> = sqlx::query_as(
			r#"
			SELECT CAST(k.CONSTRAINT_NAME AS CHAR) AS name,
			       CAST(k.COLUMN_NAME AS CHAR) AS column_name,
			       CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
			       CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column,
			       CAST(r.UPDATE_RULE AS CHAR) AS on_update,
			       CAST(r.DELETE_RULE AS CHAR) AS on_delete
			FROM information_schema.KEY_COLUMN_USAGE k
			JOIN information_schema.REFERENTIAL_CONSTRAINTS r
			  ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
			 AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
			 AND r.TABLE_NAME = k.TABLE_NAME
			WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ?
			  AND k.REFERENCED_TABLE_NAME IS NOT NULL
			ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION
			"#,
		)
		.bind(&self.database)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?;

		let mut grouped: BTreeMap<String, ForeignKeyConstraint> = BTreeMap::new();
		for row in rows {
			let fk = grouped
				.entry(row.name.clone())
				.or_insert_with(|| ForeignKeyConstraint {
					name: row.name,
					table: table.to_string(),
					columns: Vec::new(),
					referenced_table: row.referenced_table,
					referenced_columns: Vec::new(),
					on_delete: ForeignKeyAction::from_rule(&row.on_delete).unwrap_or_default(),
					on_update: ForeignKeyAction::from_rule(&row.on_update).unwrap_or_default(),
				});
			fk.columns.push(row.column_name);
			fk.referenced_columns.push(row.referenced_column);
		}
		Ok(grouped.into_values().collect())
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
			.find(|row| row.kind.eq_ignore_ascii_case("PRIMARY KEY"))
			.map(|row| row.name))
	}
}

#[async_trait]
impl DdlExecutor for MysqlProvider {
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
		sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql("START TRANSACTION"))
			.await?;
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

impl TransformationProvider for MysqlProvider {}
