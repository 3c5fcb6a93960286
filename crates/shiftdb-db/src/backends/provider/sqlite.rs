//! SQLite transformation provider
//!
//! SQLite only alters tables in place for `ADD COLUMN`, `RENAME COLUMN` and
//! `RENAME TO`. Everything else goes through [`rebuild`], which recreates the
//! table under a shadow name and swaps it in.
//!
//! Foreign key enforcement cannot change inside a transaction, so
//! [`begin_transaction`](DdlExecutor::begin_transaction) turns it off first and
//! the commit runs `PRAGMA foreign_key_check` before restoring it.

mod rebuild;

pub use self::rebuild::{SHADOW_PREFIX, shadow_table_name};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection, Row, SqliteConnection, ValueRef};

use self::rebuild::{Alteration, rebuild};
use super::{
	DdlExecutor, SchemaIntrospector, TransformationProvider, catalog_column,
	create_property_indexes, ensure_column, ensure_column_absent, ensure_constraint_absent,
	property_index_name,
};
use crate::backends::dialect::{Dialect, NativeType, SqliteDialect};
use crate::backends::schema::{
	CheckConstraint, Column, ColumnProperty, ForeignKeyAction, ForeignKeyConstraint, Index,
	UniqueConstraint, Value,
};
use crate::backends::types::ProviderOptions;
use crate::error::{MigrationError, Result};

/// SQLite provider over a single connection.
pub struct SqliteProvider {
	conn: SqliteConnection,
	dialect: SqliteDialect,
	options: ProviderOptions,
	transaction: Option<TransactionState>,
}

#[derive(Debug, Clone, Copy)]
struct TransactionState {
	restore_foreign_keys: bool,
}

impl SqliteProvider {
	/// Opens a connection. The database file is created when missing.
	pub async fn connect(
		dialect: SqliteDialect,
		url: &str,
		mut options: ProviderOptions,
	) -> Result<Self> {
		if let Some(schema) = options.schema.take() {
			tracing::warn!(schema = %schema, "sqlite has no schemas, ignoring the configured schema");
		}
		let connect_options = SqliteConnectOptions::from_str(url)?
			.create_if_missing(true)
			.foreign_keys(true);
		let conn = SqliteConnection::connect_with(&connect_options).await?;
		tracing::debug!(url, "connected to sqlite");
		Ok(Self {
			conn,
			dialect,
			options,
			transaction: None,
		})
	}

	async fn foreign_keys_enabled(&mut self) -> Result<bool> {
		let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
			.fetch_one(&mut self.conn)
			.await?;
		Ok(enabled != 0)
	}

	async fn set_foreign_keys(&mut self, enabled: bool) -> Result<()> {
		let sql = if enabled {
			"PRAGMA foreign_keys = ON"
		} else {
			"PRAGMA foreign_keys = OFF"
		};
		sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
		Ok(())
	}

	/// Fails with the first row reported by `PRAGMA foreign_key_check`.
	async fn check_foreign_keys(&mut self) -> Result<()> {
		#[derive(sqlx::FromRow)]
		struct ViolationRow {
			table: String,
			parent: String,
		}

		let violations: Vec<ViolationRow> = sqlx::query_as("PRAGMA foreign_key_check")
			.fetch_all(&mut self.conn)
			.await?;
		match violations.first() {
			Some(row) => Err(MigrationError::ForeignKeyViolation(format!(
				"{} row(s) violate foreign keys, first in '{}' referencing '{}'",
				violations.len(),
				row.table,
				row.parent
			))),
			None => Ok(()),
		}
	}

	async fn finish_transaction(&mut self, state: TransactionState, statement: &str) -> Result<()> {
		let finished = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(statement)).await;
		if state.restore_foreign_keys {
			self.set_foreign_keys(true).await?;
		}
		finished?;
		Ok(())
	}

	async fn row_count(&mut self, table: &str) -> Result<i64> {
		let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.quote(table));
		Ok(sqlx::query_scalar(&sql).fetch_one(&mut self.conn).await?)
	}

	/// Reads everything sqlite_master and the pragmas report about a table.
	pub(crate) async fn load_catalog(&mut self, table: &str) -> Result<Option<TableCatalog>> {
		#[derive(sqlx::FromRow)]
		struct IndexListRow {
			name: String,
			unique: i64,
			origin: String,
			partial: i64,
		}

		#[derive(sqlx::FromRow)]
		struct ForeignKeyRow {
			id: i64,
			seq: i64,
			referenced_table: String,
			from_column: String,
			to_column: Option<String>,
			on_update: String,
			on_delete: String,
		}

		let create_sql: Option<Option<String>> =
			sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
				.bind(table)
				.fetch_optional(&mut self.conn)
				.await?;
		let Some(create_sql) = create_sql else {
			return Ok(None);
		};
		let create_sql = create_sql.unwrap_or_default();

		let columns: Vec<TableInfoRow> = sqlx::query_as(
			r#"SELECT name, type AS declared_type, "notnull" AS not_null, dflt_value, pk
			FROM pragma_table_info(?) ORDER BY cid"#,
		)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?;

		let index_list: Vec<IndexListRow> =
			sqlx::query_as("SELECT name, \"unique\", origin, partial FROM pragma_index_list(?)")
				.bind(table)
				.fetch_all(&mut self.conn)
				.await?;
		let mut indexes = Vec::with_capacity(index_list.len());
		for row in index_list {
			let columns: Vec<Option<String>> =
				sqlx::query_scalar("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
					.bind(&row.name)
					.fetch_all(&mut self.conn)
					.await?;
			let sql: Option<Option<String>> = sqlx::query_scalar(
				"SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?",
			)
			.bind(&row.name)
			.fetch_optional(&mut self.conn)
			.await?;
			indexes.push(IndexEntry {
				name: row.name,
				unique: row.unique != 0,
				origin: row.origin,
				partial: row.partial != 0,
				// Expression key parts have no column name.
				columns: columns.into_iter().flatten().collect(),
				sql: sql.flatten(),
			});
		}

		let fk_rows: Vec<ForeignKeyRow> = sqlx::query_as(
			r#"SELECT id, seq, "table" AS referenced_table, "from" AS from_column,
			"to" AS to_column, on_update, on_delete
			FROM pragma_foreign_key_list(?)"#,
		)
		.bind(table)
		.fetch_all(&mut self.conn)
		.await?;

		let named_fks = parse_fk_constraint_names(&create_sql)?;
		let mut grouped: BTreeMap<i64, Vec<ForeignKeyRow>> = BTreeMap::new();
		for row in fk_rows {
			grouped.entry(row.id).or_default().push(row);
		}
		let mut foreign_keys = Vec::with_capacity(grouped.len());
		for (id, mut rows) in grouped {
			rows.sort_by_key(|r| r.seq);
			let referenced_table = rows[0].referenced_table.clone();
			let columns: Vec<String> = rows.iter().map(|r| r.from_column.clone()).collect();
			// A missing target column means the parent's primary key.
			let referenced_columns: Vec<String> = rows
				.iter()
				.filter_map(|r| r.to_column.clone())
				.collect();
			let signature: (Vec<String>, String) = (
				columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
				referenced_table.to_ascii_lowercase(),
			);
			let name = named_fks
				.get(&signature)
				.cloned()
				.unwrap_or_else(|| format!("fk_{}_{}", table, id));
			foreign_keys.push(ForeignKeyConstraint {
				name,
				table: table.to_string(),
				columns,
				referenced_table,
				referenced_columns,
				on_delete: ForeignKeyAction::from_rule(&rows[0].on_delete).unwrap_or_default(),
				on_update: ForeignKeyAction::from_rule(&rows[0].on_update).unwrap_or_default(),
			});
		}

		Ok(Some(TableCatalog {
			table: table.to_string(),
			create_sql,
			columns,
			indexes,
			foreign_keys,
		}))
	}

	async fn require_catalog(&mut self, table: &str) -> Result<TableCatalog> {
		self.load_catalog(table).await?.ok_or_else(|| {
			MigrationError::InvalidOperation(format!("table '{}' does not exist", table))
		})
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TableInfoRow {
	name: String,
	declared_type: String,
	not_null: i64,
	dflt_value: Option<String>,
	pk: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
	name: String,
	unique: bool,
	/// `c` for CREATE INDEX, `u` for UNIQUE, `pk` for PRIMARY KEY
	origin: String,
	partial: bool,
	columns: Vec<String>,
	/// CREATE INDEX text; absent for automatic indexes
	sql: Option<String>,
}

/// Catalog snapshot of one SQLite table.
#[derive(Debug, Clone)]
pub(crate) struct TableCatalog {
	table: String,
	create_sql: String,
	columns: Vec<TableInfoRow>,
	indexes: Vec<IndexEntry>,
	foreign_keys: Vec<ForeignKeyConstraint>,
}

impl TableCatalog {
	fn is_autoincrement(&self) -> Result<bool> {
		let pattern = regex::Regex::new(r"(?i)\bAUTOINCREMENT\b")
			.map_err(|e| MigrationError::Other(e.into()))?;
		Ok(pattern.is_match(&self.create_sql))
	}

	fn primary_key_columns(&self) -> Vec<String> {
		let mut key: Vec<&TableInfoRow> = self.columns.iter().filter(|c| c.pk > 0).collect();
		key.sort_by_key(|c| c.pk);
		key.into_iter().map(|c| c.name.clone()).collect()
	}

	/// Name given in `CONSTRAINT name PRIMARY KEY`, if any.
	fn primary_key_constraint_name(&self) -> Result<Option<String>> {
		let pattern = regex::Regex::new(r#"(?i)CONSTRAINT\s+["'`\[]?(\w+)["'`\]]?\s+PRIMARY\s+KEY"#)
			.map_err(|e| MigrationError::Other(e.into()))?;
		Ok(pattern
			.captures(&self.create_sql)
			.and_then(|cap| cap.get(1))
			.map(|m| m.as_str().to_string()))
	}

	fn primary_key_name(&self) -> Result<Option<String>> {
		if self.primary_key_columns().is_empty() {
			return Ok(None);
		}
		Ok(Some(
			self.primary_key_constraint_name()?
				.unwrap_or_else(|| format!("pk_{}", self.table)),
		))
	}

	/// Unique constraints that carry a name: declared ones keep theirs and
	/// unnamed multi-column ones get a generated one. Unnamed single-column
	/// uniques are reported as column properties instead.
	fn unique_constraints(&self) -> Result<Vec<UniqueConstraint>> {
		let named = parse_unique_constraint_names(&self.create_sql)?;
		Ok(self
			.indexes
			.iter()
			.filter(|index| index.origin == "u")
			.filter_map(|index| {
				let lowered: Vec<String> =
					index.columns.iter().map(|c| c.to_ascii_lowercase()).collect();
				match named.get(&lowered) {
					Some(name) => Some(UniqueConstraint {
						name: name.clone(),
						columns: index.columns.clone(),
					}),
					None if index.columns.len() > 1 => Some(UniqueConstraint {
						name: format!("uq_{}_{}", self.table, index.columns.join("_")),
						columns: index.columns.clone(),
					}),
					None => None,
				}
			})
			.collect())
	}

	fn single_column_uniques(&self) -> HashSet<String> {
		self.indexes
			.iter()
			.filter(|index| index.origin == "u" && index.columns.len() == 1)
			.map(|index| index.columns[0].clone())
			.collect()
	}

	fn check_constraints(&self) -> Result<Vec<CheckConstraint>> {
		parse_check_constraints(&self.create_sql)
	}

	fn columns(&self, dialect: &SqliteDialect) -> Result<Vec<Column>> {
		let key = self.primary_key_columns();
		let identity = key.len() == 1 && self.is_autoincrement()?;
		let uniques = self.single_column_uniques();
		let index_names: HashSet<&str> = self.indexes.iter().map(|i| i.name.as_str()).collect();
		let fk_columns: HashSet<&str> = self
			.foreign_keys
			.iter()
			.flat_map(|fk| fk.columns.iter().map(String::as_str))
			.collect();

		self.columns
			.iter()
			.map(|row| {
				let native = NativeType::parse(&row.declared_type);
				let logical = dialect.logical_type(&native).map_err(|e| match e {
					MigrationError::UnsupportedType(msg) => MigrationError::UnsupportedType(format!(
						"{}.{}: {}",
						self.table, row.name, msg
					)),
					other => other,
				})?;

				let mut properties = ColumnProperty::NONE;
				if row.pk > 0 {
					properties |= ColumnProperty::PRIMARY_KEY;
					if identity {
						properties |= ColumnProperty::IDENTITY;
					}
				} else if uniques.contains(&row.name) {
					properties |= ColumnProperty::UNIQUE;
				}
				properties |= if row.not_null != 0 {
					ColumnProperty::NOT_NULL
				} else {
					ColumnProperty::NULL
				};
				if index_names.contains(property_index_name(&self.table, &row.name).as_str()) {
					properties |= ColumnProperty::INDEXED;
				}
				if fk_columns.contains(row.name.as_str()) {
					properties |= ColumnProperty::FOREIGN_KEY;
				}
				if native.unsigned {
					properties |= ColumnProperty::UNSIGNED;
				}

				Ok(catalog_column(
					row.name.clone(),
					logical,
					properties,
					row.dflt_value.as_deref(),
				))
			})
			.collect()
	}

	/// Indexes created with CREATE INDEX.
	fn created_indexes(&self) -> impl Iterator<Item = &IndexEntry> {
		self.indexes.iter().filter(|index| index.origin == "c")
	}

	fn constraint_names(&self) -> Result<HashSet<String>> {
		let mut names: HashSet<String> =
			self.foreign_keys.iter().map(|fk| fk.name.clone()).collect();
		names.extend(self.unique_constraints()?.into_iter().map(|u| u.name));
		names.extend(self.check_constraints()?.into_iter().filter_map(|c| c.name));
		names.extend(self.primary_key_name()?);
		// Automatic indexes back constraints.
		names.extend(
			self.indexes
				.iter()
				.filter(|index| index.origin != "c")
				.map(|index| index.name.clone()),
		);
		Ok(names)
	}
}

fn decode_scalar(row: &SqliteRow) -> Result<Option<Value>> {
	if row.try_get_raw(0)?.is_null() {
		return Ok(None);
	}
	if let Ok(v) = row.try_get::<i64, _>(0) {
		return Ok(Some(Value::Int(v)));
	}
	if let Ok(v) = row.try_get::<f64, _>(0) {
		return Ok(Some(Value::Float(v)));
	}
	if let Ok(v) = row.try_get::<String, _>(0) {
		return Ok(Some(Value::String(v)));
	}
	let bytes: Vec<u8> = row.try_get(0)?;
	Ok(Some(Value::Bytes(bytes)))
}

/// Parses CHECK constraints out of a CREATE TABLE statement.
///
/// Handles `CONSTRAINT name CHECK (expr)` and anonymous `CHECK (expr)`, with
/// nested parentheses inside the expression.
pub(crate) fn parse_check_constraints(create_sql: &str) -> Result<Vec<CheckConstraint>> {
	let named = regex::Regex::new(r#"(?i)CONSTRAINT\s+["'`\[]?(\w+)["'`\]]?\s+CHECK\s*\("#)
		.map_err(|e| MigrationError::Other(e.into()))?;
	let anonymous =
		regex::Regex::new(r"(?i)\bCHECK\s*\(").map_err(|e| MigrationError::Other(e.into()))?;

	let mut constraints = Vec::new();
	let mut named_starts = HashSet::new();
	for cap in named.captures_iter(create_sql) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		named_starts.insert(whole.end());
		if let Some(expression) = parenthesized(create_sql, whole.end() - 1) {
			constraints.push(CheckConstraint {
				name: Some(name.as_str().to_string()),
				expression,
			});
		}
	}
	for m in anonymous.find_iter(create_sql) {
		if named_starts.contains(&m.end()) {
			continue;
		}
		if let Some(expression) = parenthesized(create_sql, m.end() - 1) {
			constraints.push(CheckConstraint {
				name: None,
				expression,
			});
		}
	}
	Ok(constraints)
}

/// Text between the parenthesis at byte `open` and its match.
fn parenthesized(sql: &str, open: usize) -> Option<String> {
	if sql.as_bytes().get(open) != Some(&b'(') {
		return None;
	}
	let mut depth = 0usize;
	let mut quoted = false;
	for (offset, c) in sql[open..].char_indices() {
		match c {
			'\'' => quoted = !quoted,
			'(' if !quoted => depth += 1,
			')' if !quoted => {
				depth -= 1;
				if depth == 0 {
					let expression = sql[open + 1..open + offset].trim();
					return (!expression.is_empty()).then(|| expression.to_string());
				}
			}
			_ => {}
		}
	}
	None
}

fn split_identifier_list(list: &str) -> Vec<String> {
	list.split(',')
		.map(|s| {
			s.trim()
				.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '[' | ']'))
				.to_ascii_lowercase()
		})
		.collect()
}

/// Maps `(columns, referenced table)` to the declared FK constraint name.
/// Keys are lower-cased.
fn parse_fk_constraint_names(create_sql: &str) -> Result<HashMap<(Vec<String>, String), String>> {
	let pattern = regex::Regex::new(
		r#"(?i)CONSTRAINT\s+["'`\[]?(\w+)["'`\]]?\s+FOREIGN\s+KEY\s*\(([^)]+)\)\s*REFERENCES\s+["'`\[]?(\w+)["'`\]]?"#,
	)
	.map_err(|e| MigrationError::Other(e.into()))?;

	let mut names = HashMap::new();
	for cap in pattern.captures_iter(create_sql) {
		if let (Some(name), Some(columns), Some(referenced)) = (cap.get(1), cap.get(2), cap.get(3)) {
			names.insert(
				(
					split_identifier_list(columns.as_str()),
					referenced.as_str().to_ascii_lowercase(),
				),
				name.as_str().to_string(),
			);
		}
	}
	Ok(names)
}

/// Maps the lower-cased column list of each `CONSTRAINT name UNIQUE (...)` to its name.
fn parse_unique_constraint_names(create_sql: &str) -> Result<HashMap<Vec<String>, String>> {
	let pattern =
		regex::Regex::new(r#"(?i)CONSTRAINT\s+["'`\[]?(\w+)["'`\]]?\s+UNIQUE\s*\(([^)]+)\)"#)
			.map_err(|e| MigrationError::Other(e.into()))?;

	let mut names = HashMap::new();
	for cap in pattern.captures_iter(create_sql) {
		if let (Some(name), Some(columns)) = (cap.get(1), cap.get(2)) {
			names.insert(
				split_identifier_list(columns.as_str()),
				name.as_str().to_string(),
			);
		}
	}
	Ok(names)
}

#[async_trait]
impl SchemaIntrospector for SqliteProvider {
	async fn get_tables(&mut self) -> Result<Vec<String>> {
		Ok(sqlx::query_scalar(
			"SELECT name FROM sqlite_master WHERE type = 'table' \
			AND name NOT LIKE 'sqlite_%' ORDER BY name",
		)
		.fetch_all(&mut self.conn)
		.await?)
	}

	async fn table_exists(&mut self, table: &str) -> Result<bool> {
		let count: i64 =
			sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
				.bind(table)
				.fetch_one(&mut self.conn)
				.await?;
		Ok(count > 0)
	}

	async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
		match self.load_catalog(table).await? {
			Some(catalog) => catalog.columns(&self.dialect),
			None => Ok(Vec::new()),
		}
	}

	async fn get_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
		let Some(catalog) = self.load_catalog(table).await? else {
			return Ok(Vec::new());
		};
		Ok(catalog
			.created_indexes()
			.map(|entry| {
				if entry.partial {
					tracing::trace!(index = %entry.name, "partial index predicate is not read back");
				}
				let mut index = Index::new(entry.name.clone(), entry.columns.clone());
				index.unique = entry.unique;
				index
			})
			.collect())
	}

	async fn get_foreign_key_constraints(
		&mut self,
		table: &str,
	) -> Result<Vec<ForeignKeyConstraint>> {
		Ok(self
			.load_catalog(table)
			.await?
			.map(|catalog| catalog.foreign_keys)
			.unwrap_or_default())
	}

	async fn constraint_exists(&mut self, table: &str, name: &str) -> Result<bool> {
		match self.load_catalog(table).await? {
			Some(catalog) => Ok(catalog.constraint_names()?.contains(name)),
			None => Ok(false),
		}
	}

	async fn primary_key_name(&mut self, table: &str) -> Result<Option<String>> {
		match self.load_catalog(table).await? {
			Some(catalog) => catalog.primary_key_name(),
			None => Ok(None),
		}
	}
}

#[async_trait]
impl DdlExecutor for SqliteProvider {
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
		let row = sqlx::query(sql).fetch_optional(&mut self.conn).await?;
		match row {
			Some(row) => decode_scalar(&row),
			None => Ok(None),
		}
	}

	async fn query_i64(&mut self, sql: &str) -> Result<Vec<i64>> {
		Ok(sqlx::query_scalar(sql).fetch_all(&mut self.conn).await?)
	}

	async fn begin_transaction(&mut self) -> Result<()> {
		if self.transaction.is_some() {
			return Err(MigrationError::Transaction(
				"a transaction is already active on this provider".to_string(),
			));
		}
		let restore_foreign_keys = self.foreign_keys_enabled().await?;
		if restore_foreign_keys {
			self.set_foreign_keys(false).await?;
		}
		if let Err(e) = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql("BEGIN")).await {
			if restore_foreign_keys {
				self.set_foreign_keys(true).await?;
			}
			return Err(e.into());
		}
		tracing::debug!("sqlite transaction started");
		self.transaction = Some(TransactionState {
			restore_foreign_keys,
		});
		Ok(())
	}

	async fn commit(&mut self) -> Result<()> {
		let state = self.transaction.take().ok_or_else(|| {
			MigrationError::Transaction("commit without an active transaction".to_string())
		})?;
		if let Err(violation) = self.check_foreign_keys().await {
			tracing::warn!(error = %violation, "foreign key check failed, rolling back");
			self.finish_transaction(state, "ROLLBACK").await?;
			return Err(violation);
		}
		self.finish_transaction(state, "COMMIT").await?;
		tracing::debug!("sqlite transaction committed");
		Ok(())
	}

	async fn rollback(&mut self) -> Result<()> {
		let state = self.transaction.take().ok_or_else(|| {
			MigrationError::Transaction("rollback without an active transaction".to_string())
		})?;
		self.finish_transaction(state, "ROLLBACK").await?;
		tracing::debug!("sqlite transaction rolled back");
		Ok(())
	}

	fn in_transaction(&self) -> bool {
		self.transaction.is_some()
	}
}

#[async_trait]
impl TransformationProvider for SqliteProvider {
	async fn add_column(&mut self, table: &str, column: Column) -> Result<()> {
		ensure_column_absent(self, table, &column.name).await?;
		// ADD COLUMN accepts neither key constraints nor non-constant defaults.
		let in_place = !column.is_primary_key()
			&& !column.is_unique()
			&& !matches!(column.default, Some(Value::Raw(_)))
			&& !column.requires_backfill();
		if in_place {
			let sql = self
				.dialect
				.add_column_sql(&self.table_name(table), &column)?;
			self.execute_non_query(&sql).await?;
		} else {
			if column.requires_backfill() && self.row_count(table).await? > 0 {
				return Err(MigrationError::InvalidOperation(format!(
					"cannot add NOT NULL column '{}' without a default to non-empty table '{}'",
					column.name, table
				)));
			}
			rebuild(self, table, Alteration::AddColumn(column.clone())).await?;
		}
		create_property_indexes(self, table, std::slice::from_ref(&column)).await
	}

	async fn remove_column(&mut self, table: &str, column: &str) -> Result<()> {
		ensure_column(self, table, column).await?;
		rebuild(self, table, Alteration::DropColumn(column.to_string())).await
	}

	async fn change_column(&mut self, table: &str, column: Column) -> Result<()> {
		ensure_column(self, table, &column.name).await?;
		rebuild(self, table, Alteration::AlterColumn(column)).await
	}

	async fn change_default_value(
		&mut self,
		table: &str,
		column: &str,
		value: Option<Value>,
	) -> Result<()> {
		ensure_column(self, table, column).await?;
		rebuild(
			self,
			table,
			Alteration::ChangeDefault {
				column: column.to_string(),
				value,
			},
		)
		.await
	}

	async fn add_foreign_key(&mut self, fk: ForeignKeyConstraint) -> Result<()> {
		fk.validate()?;
		ensure_constraint_absent(self, &fk.table, &fk.name).await?;
		let table = fk.table.clone();
		rebuild(self, &table, Alteration::AddForeignKey(fk)).await
	}

	async fn remove_foreign_key(&mut self, table: &str, name: &str) -> Result<()> {
		let catalog = self.load_catalog(table).await?;
		let present = catalog
			.as_ref()
			.is_some_and(|c| c.foreign_keys.iter().any(|fk| fk.name == name));
		if !present {
			tracing::warn!(table, constraint = name, "foreign key not found, nothing to remove");
			return Ok(());
		}
		rebuild(self, table, Alteration::DropForeignKey(name.to_string())).await
	}

	async fn add_primary_key(&mut self, name: &str, table: &str, columns: Vec<String>) -> Result<()> {
		let catalog = self.require_catalog(table).await?;
		if let Some(existing) = catalog.primary_key_name()? {
			return Err(MigrationError::InvalidOperation(format!(
				"table '{}' already has primary key '{}'",
				table, existing
			)));
		}
		rebuild(
			self,
			table,
			Alteration::AddPrimaryKey {
				name: name.to_string(),
				columns,
			},
		)
		.await
	}

	async fn remove_primary_key(&mut self, table: &str) -> Result<()> {
		let catalog = self.require_catalog(table).await?;
		if catalog.primary_key_columns().is_empty() {
			tracing::warn!(table, "table has no primary key, nothing to remove");
			return Ok(());
		}
		rebuild(self, table, Alteration::DropPrimaryKey).await
	}

	async fn add_unique_constraint(
		&mut self,
		name: &str,
		table: &str,
		columns: Vec<String>,
	) -> Result<()> {
		ensure_constraint_absent(self, table, name).await?;
		rebuild(
			self,
			table,
			Alteration::AddUnique(UniqueConstraint {
				name: name.to_string(),
				columns,
			}),
		)
		.await
	}

	async fn add_check_constraint(&mut self, name: &str, table: &str, expression: &str) -> Result<()> {
		ensure_constraint_absent(self, table, name).await?;
		rebuild(
			self,
			table,
			Alteration::AddCheck(CheckConstraint {
				name: Some(name.to_string()),
				expression: expression.to_string(),
			}),
		)
		.await
	}

	async fn remove_constraint(&mut self, table: &str, name: &str) -> Result<()> {
		if !self.table_exists(table).await? || !self.constraint_exists(table, name).await? {
			tracing::warn!(table, constraint = name, "constraint not found, nothing to remove");
			return Ok(());
		}
		rebuild(self, table, Alteration::DropConstraint(name.to_string())).await
	}

	async fn remove_all_indexes(&mut self, table: &str) -> Result<()> {
		let catalog = self.require_catalog(table).await?;
		for index in catalog.created_indexes() {
			let sql = self
				.dialect
				.drop_index_sql(&self.table_name(table), &index.name);
			self.execute_non_query(&sql).await?;
		}
		Ok(())
	}
}
