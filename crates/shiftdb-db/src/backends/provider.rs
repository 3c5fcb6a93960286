//! Transformation providers
//!
//! A provider owns one live connection and exposes three capability sets:
//!
//! - [`SchemaIntrospector`]: reads the current schema back into the portable model
//! - [`DdlExecutor`]: runs statements and controls the single active transaction
//! - [`TransformationProvider`]: structural mutators, DML helpers and the
//!   migration bookkeeping kept in the tracking table
//!
//! The mutators default to in-place `ALTER TABLE` statements composed by the
//! provider's [`Dialect`]. SQLite overrides the ones it cannot express in place
//! with a table rebuild.
//!
//! Providers are strictly sequential: every method takes `&mut self`.

use async_trait::async_trait;
use sea_query::{Alias, ExprTrait, MysqlQueryBuilder, PostgresQueryBuilder, Query, SqliteQueryBuilder};

pub mod tracking;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub use mysql::MysqlProvider;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;

use crate::backends::dialect::{Dialect, LogicalType, coerce_default, parse_default_literal};
use crate::backends::schema::{
	Column, ColumnProperty, FilterItem, FilterOperator, ForeignKeyConstraint, Index, TableName,
	Value,
};
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};
use crate::migrations::logger::MigrationLogger;

/// Reads the live schema into the portable model.
#[async_trait]
pub trait SchemaIntrospector: Send {
	async fn get_tables(&mut self) -> Result<Vec<String>>;

	async fn table_exists(&mut self, table: &str) -> Result<bool> {
		Ok(self.get_tables().await?.iter().any(|t| t == table))
	}

	/// Columns in declaration order with normalized properties.
	///
	/// A native type without a portable mapping fails with
	/// [`MigrationError::UnsupportedType`].
	async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>>;

	async fn get_column_by_name(&mut self, table: &str, column: &str) -> Result<Option<Column>> {
		Ok(self
			.get_columns(table)
			.await?
			.into_iter()
			.find(|c| c.name == column))
	}

	async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
		Ok(self.get_column_by_name(table, column).await?.is_some())
	}

	/// Secondary indexes of a table. Filter predicates are not read back.
	async fn get_indexes(&mut self, table: &str) -> Result<Vec<Index>>;

	async fn index_exists(&mut self, table: &str, name: &str) -> Result<bool> {
		Ok(self
			.get_indexes(table)
			.await?
			.iter()
			.any(|index| index.name == name))
	}

	async fn get_foreign_key_constraints(&mut self, table: &str)
	-> Result<Vec<ForeignKeyConstraint>>;

	async fn constraint_exists(&mut self, table: &str, name: &str) -> Result<bool>;

	async fn primary_key_name(&mut self, table: &str) -> Result<Option<String>>;
}

/// Statement execution and transaction control over one connection.
#[async_trait]
pub trait DdlExecutor: Send {
	fn dialect(&self) -> &dyn Dialect;

	fn options(&self) -> &ProviderOptions;

	fn logger(&self) -> &dyn MigrationLogger {
		self.options().logger.as_ref()
	}

	/// Qualifies a table name with the provider's default schema.
	fn table_name(&self, table: &str) -> TableName {
		TableName::new(table).in_schema(self.options().schema.as_deref())
	}

	/// Executes a statement and returns the affected row count.
	async fn execute_non_query(&mut self, sql: &str) -> Result<u64>;

	/// First column of the first row, `None` for no row or SQL NULL.
	async fn execute_scalar(&mut self, sql: &str) -> Result<Option<Value>>;

	/// First column of every row decoded as a 64-bit integer.
	async fn query_i64(&mut self, sql: &str) -> Result<Vec<i64>>;

	async fn execute_all(&mut self, statements: Vec<String>) -> Result<()> {
		for sql in statements {
			self.execute_non_query(&sql).await?;
		}
		Ok(())
	}

	/// Opens the provider's transaction. Nesting fails with
	/// [`MigrationError::Transaction`].
	async fn begin_transaction(&mut self) -> Result<()>;

	async fn commit(&mut self) -> Result<()>;

	async fn rollback(&mut self) -> Result<()>;

	fn in_transaction(&self) -> bool;
}

#[async_trait]
pub trait TransformationProvider: SchemaIntrospector + DdlExecutor {
	async fn add_table(&mut self, table: &str, columns: Vec<Column>) -> Result<()> {
		if self.table_exists(table).await? {
			return Err(MigrationError::InvalidOperation(format!(
				"table '{}' already exists",
				table
			)));
		}
		let sql = self
			.dialect()
			.create_table_sql(&self.table_name(table), &columns)?;
		self.execute_non_query(&sql).await?;
		create_property_indexes(self, table, &columns).await
	}

	async fn add_column(&mut self, table: &str, column: Column) -> Result<()> {
		ensure_column_absent(self, table, &column.name).await?;
		let sql = self
			.dialect()
			.add_column_sql(&self.table_name(table), &column)?;
		self.execute_non_query(&sql).await?;
		create_property_indexes(self, table, std::slice::from_ref(&column)).await
	}

	async fn remove_column(&mut self, table: &str, column: &str) -> Result<()> {
		ensure_column(self, table, column).await?;
		let sql = self
			.dialect()
			.drop_column_sql(&self.table_name(table), column);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn rename_column(&mut self, table: &str, old_name: &str, new_name: &str) -> Result<()> {
		ensure_column(self, table, old_name).await?;
		if self.column_exists(table, new_name).await? {
			return Err(MigrationError::InvalidOperation(format!(
				"cannot rename '{}.{}': column '{}' already exists",
				table, old_name, new_name
			)));
		}
		let sql = self
			.dialect()
			.rename_column_sql(&self.table_name(table), old_name, new_name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	/// Redefines an existing column (type, size, nullability, default).
	///
	/// Gaining `UNIQUE` adds a single-column unique constraint. Changing the
	/// primary key or identity flags, or dropping `UNIQUE`, is rejected here;
	/// the constraint operations cover those.
	async fn change_column(&mut self, table: &str, column: Column) -> Result<()> {
		ensure_table(self, table).await?;
		let Some(existing) = self.get_column_by_name(table, &column.name).await? else {
			return Err(MigrationError::InvalidOperation(format!(
				"column '{}.{}' does not exist",
				table, column.name
			)));
		};
		check_key_change(table, &existing, &column)?;

		let table_name = self.table_name(table);
		let mut statements = self.dialect().change_column_sql(&table_name, &column)?;
		if column.is_unique() && !existing.is_unique() && !column.is_primary_key() {
			statements.push(self.dialect().add_unique_sql(
				&table_name,
				&unique_constraint_name(table, &column.name),
				std::slice::from_ref(&column.name),
			));
		}
		self.execute_all(statements).await
	}

	async fn change_default_value(
		&mut self,
		table: &str,
		column: &str,
		value: Option<Value>,
	) -> Result<()> {
		ensure_column(self, table, column).await?;
		let sql = self
			.dialect()
			.change_default_sql(&self.table_name(table), column, value.as_ref());
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn add_foreign_key(&mut self, fk: ForeignKeyConstraint) -> Result<()> {
		ensure_table(self, &fk.table).await?;
		let sql = self
			.dialect()
			.add_foreign_key_sql(&self.table_name(&fk.table), &fk)?;
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn remove_foreign_key(&mut self, table: &str, name: &str) -> Result<()> {
		if !self.table_exists(table).await? || !self.constraint_exists(table, name).await? {
			tracing::warn!(table, constraint = name, "foreign key not found, nothing to remove");
			return Ok(());
		}
		let sql = self
			.dialect()
			.drop_foreign_key_sql(&self.table_name(table), name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn add_primary_key(&mut self, name: &str, table: &str, columns: Vec<String>) -> Result<()> {
		ensure_table(self, table).await?;
		if let Some(existing) = self.primary_key_name(table).await? {
			return Err(MigrationError::InvalidOperation(format!(
				"table '{}' already has primary key '{}'",
				table, existing
			)));
		}
		let sql = self
			.dialect()
			.add_primary_key_sql(&self.table_name(table), name, &columns);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn remove_primary_key(&mut self, table: &str) -> Result<()> {
		ensure_table(self, table).await?;
		let Some(name) = self.primary_key_name(table).await? else {
			tracing::warn!(table, "table has no primary key, nothing to remove");
			return Ok(());
		};
		let sql = self
			.dialect()
			.drop_primary_key_sql(&self.table_name(table), &name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn add_unique_constraint(
		&mut self,
		name: &str,
		table: &str,
		columns: Vec<String>,
	) -> Result<()> {
		ensure_constraint_absent(self, table, name).await?;
		let sql = self
			.dialect()
			.add_unique_sql(&self.table_name(table), name, &columns);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn add_check_constraint(&mut self, name: &str, table: &str, expression: &str) -> Result<()> {
		ensure_constraint_absent(self, table, name).await?;
		let sql = self
			.dialect()
			.add_check_sql(&self.table_name(table), name, expression);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn remove_constraint(&mut self, table: &str, name: &str) -> Result<()> {
		if !self.table_exists(table).await? || !self.constraint_exists(table, name).await? {
			tracing::warn!(table, constraint = name, "constraint not found, nothing to remove");
			return Ok(());
		}
		let sql = self
			.dialect()
			.drop_constraint_sql(&self.table_name(table), name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn add_index(&mut self, table: &str, index: Index) -> Result<()> {
		index.validate()?;
		if index.primary_key {
			return self
				.add_primary_key(&index.name, table, index.key_columns)
				.await;
		}
		ensure_table(self, table).await?;
		if self.index_exists(table, &index.name).await? {
			return Err(MigrationError::InvalidOperation(format!(
				"index '{}' already exists on '{}'",
				index.name, table
			)));
		}
		let statements = self
			.dialect()
			.create_index_sql(&self.table_name(table), &index)?;
		self.execute_all(statements).await
	}

	async fn remove_index(&mut self, table: &str, name: &str) -> Result<()> {
		if !self.table_exists(table).await? || !self.index_exists(table, name).await? {
			tracing::warn!(table, index = name, "index not found, nothing to remove");
			return Ok(());
		}
		let sql = self.dialect().drop_index_sql(&self.table_name(table), name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	/// Drops every secondary index that does not back a constraint.
	async fn remove_all_indexes(&mut self, table: &str) -> Result<()> {
		ensure_table(self, table).await?;
		for index in self.get_indexes(table).await? {
			if index.primary_key || self.constraint_exists(table, &index.name).await? {
				continue;
			}
			let sql = self
				.dialect()
				.drop_index_sql(&self.table_name(table), &index.name);
			self.execute_non_query(&sql).await?;
		}
		Ok(())
	}

	async fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
		ensure_table(self, old_name).await?;
		if self.table_exists(new_name).await? {
			return Err(MigrationError::InvalidOperation(format!(
				"cannot rename '{}': table '{}' already exists",
				old_name, new_name
			)));
		}
		let sql = self
			.dialect()
			.rename_table_sql(&self.table_name(old_name), new_name);
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	/// Drops a table; a missing table is a logged no-op.
	async fn remove_table(&mut self, table: &str) -> Result<()> {
		if !self.table_exists(table).await? {
			tracing::warn!(table, "table not found, nothing to remove");
			return Ok(());
		}
		let sql = self.dialect().drop_table_sql(&self.table_name(table));
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn insert(&mut self, table: &str, columns: &[&str], values: Vec<Value>) -> Result<u64> {
		if columns.len() != values.len() {
			return Err(MigrationError::InvalidOperation(format!(
				"insert into '{}' names {} column(s) but supplies {} value(s)",
				table,
				columns.len(),
				values.len()
			)));
		}
		let mut statement = Query::insert();
		statement
			.into_table(self.table_name(table).to_sea_ref())
			.columns(columns.iter().map(|c| Alias::new(c.to_string())))
			.values(values.iter().map(Value::to_sea_expr))
			.map_err(|e| MigrationError::InvalidOperation(e.to_string()))?;
		let sql = build_query(self.dialect(), &statement)?;
		self.execute_non_query(&sql).await
	}

	async fn update(
		&mut self,
		table: &str,
		assignments: Vec<(String, Value)>,
		filter: Vec<FilterItem>,
	) -> Result<u64> {
		if assignments.is_empty() {
			return Err(MigrationError::InvalidOperation(format!(
				"update of '{}' assigns no columns",
				table
			)));
		}
		let mut statement = Query::update();
		statement.table(self.table_name(table).to_sea_ref());
		for (column, value) in &assignments {
			statement.value(Alias::new(column.clone()), value.to_sea_expr());
		}
		for item in &filter {
			statement.and_where(filter_condition(item));
		}
		let sql = build_query(self.dialect(), &statement)?;
		self.execute_non_query(&sql).await
	}

	async fn delete(&mut self, table: &str, filter: Vec<FilterItem>) -> Result<u64> {
		let mut statement = Query::delete();
		statement.from_table(self.table_name(table).to_sea_ref());
		for item in &filter {
			statement.and_where(filter_condition(item));
		}
		let sql = build_query(self.dialect(), &statement)?;
		self.execute_non_query(&sql).await
	}

	/// Versions recorded for `scope`, ascending.
	async fn applied_migrations(&mut self, scope: &str) -> Result<Vec<i64>> {
		tracking::ensure_tracking_table(self).await?;
		let sql = tracking::select_versions_sql(self, scope)?;
		self.query_i64(&sql).await
	}

	async fn migration_applied(&mut self, version: i64, scope: &str) -> Result<()> {
		tracking::ensure_tracking_table(self).await?;
		let sql = tracking::insert_version_sql(self, version, scope)?;
		self.execute_non_query(&sql).await?;
		Ok(())
	}

	async fn migration_unapplied(&mut self, version: i64, scope: &str) -> Result<()> {
		tracking::ensure_tracking_table(self).await?;
		let sql = tracking::delete_version_sql(self, version, scope)?;
		self.execute_non_query(&sql).await?;
		Ok(())
	}
}

/// Name of the index created for a column flagged `INDEXED`.
pub fn property_index_name(table: &str, column: &str) -> String {
	format!("ix_{}_{}", table, column)
}

/// Name of the constraint added when a column gains `UNIQUE` in place.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
	format!("uq_{}_{}", table, column)
}

/// Rejects in-place changes to a column's key, identity or uniqueness removal.
pub(crate) fn check_key_change(table: &str, existing: &Column, column: &Column) -> Result<()> {
	if existing.is_primary_key() != column.is_primary_key() {
		return Err(MigrationError::InvalidOperation(format!(
			"cannot change primary key membership of '{}.{}' in place; use add_primary_key or remove_primary_key",
			table, column.name
		)));
	}
	if existing.is_identity() != column.is_identity() {
		return Err(MigrationError::InvalidOperation(format!(
			"cannot change identity of '{}.{}' in place",
			table, column.name
		)));
	}
	if existing.is_unique() && !column.is_unique() && !column.is_primary_key() {
		return Err(MigrationError::InvalidOperation(format!(
			"column '{}.{}' is unique; remove its constraint before redefining it",
			table, column.name
		)));
	}
	Ok(())
}

/// Builds a column from catalog facts. Identity columns never carry a default.
pub(crate) fn catalog_column(
	name: String,
	logical: LogicalType,
	properties: ColumnProperty,
	default: Option<&str>,
) -> Column {
	let mut column = Column::new(name, logical.data_type).with_properties(properties.normalize());
	column.size = logical.size;
	column.precision = logical.precision;
	column.scale = logical.scale;
	if !column.is_identity() {
		column.default = default
			.and_then(parse_default_literal)
			.map(|value| coerce_default(&column, value));
	}
	column
}

pub(crate) async fn create_property_indexes<P>(
	provider: &mut P,
	table: &str,
	columns: &[Column],
) -> Result<()>
where
	P: TransformationProvider + ?Sized,
{
	for column in columns {
		if column.properties.is_not_set(ColumnProperty::INDEXED)
			|| column.is_primary_key()
			|| column.is_unique()
		{
			continue;
		}
		let index = Index::new(property_index_name(table, &column.name), [column.name.clone()]);
		let statements = provider
			.dialect()
			.create_index_sql(&provider.table_name(table), &index)?;
		provider.execute_all(statements).await?;
	}
	Ok(())
}

pub(crate) async fn ensure_table<P>(provider: &mut P, table: &str) -> Result<()>
where
	P: SchemaIntrospector + ?Sized,
{
	if provider.table_exists(table).await? {
		Ok(())
	} else {
		Err(MigrationError::InvalidOperation(format!(
			"table '{}' does not exist",
			table
		)))
	}
}

pub(crate) async fn ensure_column<P>(provider: &mut P, table: &str, column: &str) -> Result<()>
where
	P: SchemaIntrospector + ?Sized,
{
	ensure_table(provider, table).await?;
	if provider.column_exists(table, column).await? {
		Ok(())
	} else {
		Err(MigrationError::InvalidOperation(format!(
			"column '{}.{}' does not exist",
			table, column
		)))
	}
}

pub(crate) async fn ensure_column_absent<P>(provider: &mut P, table: &str, column: &str) -> Result<()>
where
	P: SchemaIntrospector + ?Sized,
{
	ensure_table(provider, table).await?;
	if provider.column_exists(table, column).await? {
		Err(MigrationError::InvalidOperation(format!(
			"column '{}.{}' already exists",
			table, column
		)))
	} else {
		Ok(())
	}
}

pub(crate) async fn ensure_constraint_absent<P>(provider: &mut P, table: &str, name: &str) -> Result<()>
where
	P: SchemaIntrospector + ?Sized,
{
	ensure_table(provider, table).await?;
	if provider.constraint_exists(table, name).await? {
		Err(MigrationError::InvalidOperation(format!(
			"constraint '{}' already exists on '{}'",
			name, table
		)))
	} else {
		Ok(())
	}
}

fn filter_condition(item: &FilterItem) -> sea_query::Expr {
	let column = sea_query::Expr::col(Alias::new(item.column.clone()));
	let value = item.value.to_sea_expr();
	match (item.operator, item.value.is_null()) {
		(FilterOperator::Equal, true) => column.is_null(),
		(FilterOperator::NotEqual, true) => column.is_not_null(),
		(FilterOperator::Equal, false) => column.eq(value),
		(FilterOperator::NotEqual, false) => column.ne(value),
		(FilterOperator::Less, _) => column.lt(value),
		(FilterOperator::LessOrEqual, _) => column.lte(value),
		(FilterOperator::Greater, _) => column.gt(value),
		(FilterOperator::GreaterOrEqual, _) => column.gte(value),
	}
}

/// Renders a sea-query statement for the dialect's backend.
pub(crate) fn build_query<T>(dialect: &dyn Dialect, statement: &T) -> Result<String>
where
	T: sea_query::QueryStatementWriter,
{
	match dialect.database_type() {
		Some(DatabaseType::Postgres) => Ok(statement.to_string(PostgresQueryBuilder)),
		Some(DatabaseType::Mysql) => Ok(statement.to_string(MysqlQueryBuilder)),
		Some(DatabaseType::Sqlite) => Ok(statement.to_string(SqliteQueryBuilder)),
		None => Err(unavailable(dialect)),
	}
}

/// Renders a sea-query schema statement for the dialect's backend.
pub(crate) fn build_schema<T>(dialect: &dyn Dialect, statement: &T) -> Result<String>
where
	T: sea_query::SchemaStatementBuilder,
{
	match dialect.database_type() {
		Some(DatabaseType::Postgres) => Ok(statement.to_string(PostgresQueryBuilder)),
		Some(DatabaseType::Mysql) => Ok(statement.to_string(MysqlQueryBuilder)),
		Some(DatabaseType::Sqlite) => Ok(statement.to_string(SqliteQueryBuilder)),
		None => Err(unavailable(dialect)),
	}
}

fn unavailable(dialect: &dyn Dialect) -> MigrationError {
	MigrationError::InvalidOperation(format!(
		"dialect '{}' cannot render statements",
		dialect.name()
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::schema::DataType;
	use rstest::rstest;

	fn code(properties: ColumnProperty) -> Column {
		Column::new("code", DataType::Int64).with_properties(properties)
	}

	#[rstest]
	#[case::same_key(ColumnProperty::PRIMARY_KEY, ColumnProperty::PRIMARY_KEY)]
	#[case::gains_unique(ColumnProperty::NOT_NULL, ColumnProperty::NOT_NULL | ColumnProperty::UNIQUE)]
	#[case::keeps_unique(ColumnProperty::UNIQUE, ColumnProperty::UNIQUE | ColumnProperty::NOT_NULL)]
	#[case::nullability_only(ColumnProperty::NULL, ColumnProperty::NOT_NULL)]
	fn test_key_change_allowed(#[case] before: ColumnProperty, #[case] after: ColumnProperty) {
		assert!(check_key_change("t", &code(before), &code(after)).is_ok());
	}

	#[rstest]
	#[case::gains_key(ColumnProperty::NOT_NULL, ColumnProperty::PRIMARY_KEY)]
	#[case::loses_key(ColumnProperty::PRIMARY_KEY, ColumnProperty::NOT_NULL)]
	#[case::gains_identity(ColumnProperty::PRIMARY_KEY, ColumnProperty::PRIMARY_KEY_WITH_IDENTITY)]
	#[case::loses_identity(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY, ColumnProperty::PRIMARY_KEY)]
	#[case::loses_unique(ColumnProperty::UNIQUE, ColumnProperty::NOT_NULL)]
	fn test_key_change_rejected(#[case] before: ColumnProperty, #[case] after: ColumnProperty) {
		let result = check_key_change("t", &code(before), &code(after));
		assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
	}

	#[rstest]
	fn test_unique_constraint_name() {
		assert_eq!(unique_constraint_name("orders", "code"), "uq_orders_code");
	}
}
