//! Table rebuild for alterations SQLite cannot perform in place
//!
//! The table is recreated under `_rebuild_tmp_<table>` with the new shape, the
//! rows are copied across positionally, the original is dropped and the shadow
//! is renamed over it. Indexes whose columns survive are recreated from their
//! original `CREATE INDEX` text.
//!
//! Any failure after the shadow table exists is reported as
//! [`MigrationError::RebuildIncomplete`] and the shadow is left in place: it
//! may hold the only copy of the rows. A later rebuild of the same table
//! refuses to start until it is dealt with.

use super::{SqliteProvider, TableCatalog};
use crate::backends::dialect::{Dialect, SqliteDialect};
use crate::backends::provider::{DdlExecutor, SchemaIntrospector};
use crate::backends::schema::{
	CheckConstraint, Column, ColumnProperty, ForeignKeyConstraint, TableName, UniqueConstraint,
	Value,
};
use crate::error::{MigrationError, RebuildStep, Result};

/// Prefix of the reserved shadow table name.
pub const SHADOW_PREFIX: &str = "_rebuild_tmp_";

pub fn shadow_table_name(table: &str) -> String {
	format!("{}{}", SHADOW_PREFIX, table)
}

/// A structural change applied to a table's shape before it is recreated.
#[derive(Debug, Clone)]
pub(crate) enum Alteration {
	AddColumn(Column),
	DropColumn(String),
	AlterColumn(Column),
	ChangeDefault { column: String, value: Option<Value> },
	AddForeignKey(ForeignKeyConstraint),
	DropForeignKey(String),
	AddPrimaryKey { name: String, columns: Vec<String> },
	DropPrimaryKey,
	AddUnique(UniqueConstraint),
	AddCheck(CheckConstraint),
	DropConstraint(String),
}

/// Columns and table-level constraints of a table.
#[derive(Debug, Clone)]
pub(crate) struct TableShape {
	columns: Vec<Column>,
	primary_key_name: Option<String>,
	uniques: Vec<UniqueConstraint>,
	checks: Vec<CheckConstraint>,
	foreign_keys: Vec<ForeignKeyConstraint>,
}

impl TableShape {
	fn from_catalog(catalog: &TableCatalog, dialect: &SqliteDialect) -> Result<Self> {
		let uniques = catalog.unique_constraints()?;
		let mut columns = catalog.columns(dialect)?;
		// Named single-column uniques are kept as constraints, not column flags.
		for unique in uniques.iter().filter(|u| u.columns.len() == 1) {
			if let Some(column) = columns.iter_mut().find(|c| c.name == unique.columns[0]) {
				column.properties = column.properties.clear(ColumnProperty::UNIQUE);
			}
		}
		Ok(Self {
			columns,
			primary_key_name: catalog.primary_key_constraint_name()?,
			uniques,
			checks: catalog.check_constraints()?,
			foreign_keys: catalog.foreign_keys.clone(),
		})
	}

	fn has_column(&self, name: &str) -> bool {
		self.columns.iter().any(|c| c.name == name)
	}

	fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
		self.columns
			.iter_mut()
			.find(|c| c.name == name)
			.ok_or_else(|| MigrationError::InvalidOperation(format!("column '{}' does not exist", name)))
	}

	fn ensure_columns(&self, columns: &[String]) -> Result<()> {
		match columns.iter().find(|c| !self.has_column(c)) {
			Some(missing) => Err(MigrationError::InvalidOperation(format!(
				"column '{}' does not exist",
				missing
			))),
			None => Ok(()),
		}
	}

	fn has_constraint(&self, name: &str) -> bool {
		self.primary_key_name.as_deref() == Some(name)
			|| self.foreign_keys.iter().any(|fk| fk.name == name)
			|| self.uniques.iter().any(|u| u.name == name)
			|| self.checks.iter().any(|c| c.name.as_deref() == Some(name))
	}

	fn ensure_constraint_absent(&self, name: &str) -> Result<()> {
		if self.has_constraint(name) {
			return Err(MigrationError::InvalidOperation(format!(
				"constraint '{}' already exists",
				name
			)));
		}
		Ok(())
	}

	fn primary_key_columns(&self) -> Vec<&Column> {
		self.columns.iter().filter(|c| c.is_primary_key()).collect()
	}

	fn drop_primary_key(&mut self) -> Result<()> {
		if self.primary_key_columns().is_empty() {
			return Err(MigrationError::InvalidOperation(
				"table has no primary key".to_string(),
			));
		}
		for column in self.columns.iter_mut().filter(|c| c.is_primary_key()) {
			column.properties = column
				.properties
				.clear(ColumnProperty::PRIMARY_KEY | ColumnProperty::IDENTITY)
				| ColumnProperty::NOT_NULL;
		}
		self.primary_key_name = None;
		Ok(())
	}

	pub(crate) fn apply(&mut self, alteration: Alteration) -> Result<()> {
		match alteration {
			Alteration::AddColumn(column) => {
				column.validate()?;
				if self.has_column(&column.name) {
					return Err(MigrationError::InvalidOperation(format!(
						"column '{}' already exists",
						column.name
					)));
				}
				if column.is_primary_key() && !self.primary_key_columns().is_empty() {
					return Err(MigrationError::InvalidOperation(format!(
						"cannot add primary key column '{}' to a table that already has one",
						column.name
					)));
				}
				self.columns.push(column);
			}
			Alteration::DropColumn(name) => {
				let position = self
					.columns
					.iter()
					.position(|c| c.name == name)
					.ok_or_else(|| {
						MigrationError::InvalidOperation(format!("column '{}' does not exist", name))
					})?;
				if self.columns.len() == 1 {
					return Err(MigrationError::InvalidOperation(format!(
						"cannot remove '{}', the only column of the table",
						name
					)));
				}
				let removed = self.columns.remove(position);
				if removed.is_primary_key() && self.primary_key_columns().is_empty() {
					self.primary_key_name = None;
				}
				self.foreign_keys.retain(|fk| !fk.columns.contains(&name));
				self.uniques.retain(|u| !u.columns.contains(&name));
				self.checks.retain(|c| !mentions(&c.expression, &name));
			}
			Alteration::AlterColumn(column) => {
				column.validate()?;
				let existing = self.column_mut(&column.name)?;
				*existing = column;
			}
			Alteration::ChangeDefault { column, value } => {
				self.column_mut(&column)?.default = value;
			}
			Alteration::AddForeignKey(fk) => {
				fk.validate()?;
				self.ensure_constraint_absent(&fk.name)?;
				self.ensure_columns(&fk.columns)?;
				for name in &fk.columns {
					let column = self.column_mut(name)?;
					column.properties |= ColumnProperty::FOREIGN_KEY;
				}
				self.foreign_keys.push(fk);
			}
			Alteration::DropForeignKey(name) => {
				let before = self.foreign_keys.len();
				self.foreign_keys.retain(|fk| fk.name != name);
				if self.foreign_keys.len() == before {
					return Err(MigrationError::InvalidOperation(format!(
						"foreign key '{}' does not exist",
						name
					)));
				}
			}
			Alteration::AddPrimaryKey { name, columns } => {
				if !self.primary_key_columns().is_empty() {
					return Err(MigrationError::InvalidOperation(
						"table already has a primary key".to_string(),
					));
				}
				if columns.is_empty() {
					return Err(MigrationError::InvalidOperation(
						"primary key needs at least one column".to_string(),
					));
				}
				self.ensure_constraint_absent(&name)?;
				self.ensure_columns(&columns)?;
				for column_name in &columns {
					let column = self.column_mut(column_name)?;
					column.properties = column.properties.clear(
						ColumnProperty::NULL | ColumnProperty::NOT_NULL | ColumnProperty::UNIQUE,
					) | ColumnProperty::PRIMARY_KEY;
				}
				self.primary_key_name = Some(name);
			}
			Alteration::DropPrimaryKey => self.drop_primary_key()?,
			Alteration::AddUnique(unique) => {
				self.ensure_constraint_absent(&unique.name)?;
				self.ensure_columns(&unique.columns)?;
				self.uniques.push(unique);
			}
			Alteration::AddCheck(check) => {
				if let Some(name) = &check.name {
					self.ensure_constraint_absent(name)?;
				}
				self.checks.push(check);
			}
			Alteration::DropConstraint(name) => {
				if self.primary_key_name.as_deref() == Some(name.as_str()) {
					return self.drop_primary_key();
				}
				let before =
					self.foreign_keys.len() + self.uniques.len() + self.checks.len();
				self.foreign_keys.retain(|fk| fk.name != name);
				self.uniques.retain(|u| u.name != name);
				self.checks.retain(|c| c.name.as_deref() != Some(name.as_str()));
				if self.foreign_keys.len() + self.uniques.len() + self.checks.len() == before {
					return Err(MigrationError::InvalidOperation(format!(
						"constraint '{}' does not exist",
						name
					)));
				}
			}
		}
		Ok(())
	}

	/// CREATE TABLE statement for this shape under `table`.
	pub(crate) fn create_sql(&self, dialect: &SqliteDialect, table: &str) -> Result<String> {
		let key = self.primary_key_columns();
		// AUTOINCREMENT only works on an inline single-column key.
		let inline_key =
			key.len() == 1 && (self.primary_key_name.is_none() || key[0].is_identity());
		let key_names: Vec<String> = key.iter().map(|c| c.name.clone()).collect();

		let mut definitions = Vec::with_capacity(self.columns.len() + 4);
		for column in &self.columns {
			if column.is_primary_key() && !inline_key {
				let mut column = column.clone();
				column.properties = column
					.properties
					.clear(ColumnProperty::PRIMARY_KEY | ColumnProperty::IDENTITY)
					| ColumnProperty::NOT_NULL;
				definitions.push(dialect.column_sql(&column)?);
			} else {
				definitions.push(dialect.column_sql(column)?);
			}
		}

		if !inline_key && !key_names.is_empty() {
			let clause = format!("PRIMARY KEY ({})", dialect.quote_list(&key_names));
			definitions.push(match &self.primary_key_name {
				Some(name) => format!("CONSTRAINT {} {}", dialect.quote(name), clause),
				None => clause,
			});
		}
		for unique in &self.uniques {
			definitions.push(format!(
				"CONSTRAINT {} UNIQUE ({})",
				dialect.quote(&unique.name),
				dialect.quote_list(&unique.columns)
			));
		}
		for check in &self.checks {
			definitions.push(match &check.name {
				Some(name) => format!("CONSTRAINT {} CHECK ({})", dialect.quote(name), check.expression),
				None => format!("CHECK ({})", check.expression),
			});
		}
		for fk in &self.foreign_keys {
			definitions.push(dialect.foreign_key_clause(fk, &TableName::new(&fk.referenced_table)));
		}

		Ok(format!(
			"CREATE TABLE {} ({})",
			dialect.quote(table),
			definitions.join(", ")
		))
	}
}

/// Whether an SQL fragment refers to `identifier` as a whole token.
fn mentions(sql: &str, identifier: &str) -> bool {
	sql.split(|c: char| !(c.is_alphanumeric() || c == '_'))
		.any(|token| token.eq_ignore_ascii_case(identifier))
}

/// Recreation plan for one user-created index.
#[derive(Debug, Clone)]
struct IndexRecreation {
	name: String,
	sql: String,
}

fn surviving_indexes(
	catalog: &TableCatalog,
	original: &TableShape,
	reshaped: &TableShape,
) -> Vec<IndexRecreation> {
	let dropped: Vec<&str> = original
		.columns
		.iter()
		.filter(|c| !reshaped.has_column(&c.name))
		.map(|c| c.name.as_str())
		.collect();

	catalog
		.created_indexes()
		.filter_map(|index| {
			let sql = index.sql.clone()?;
			let survives = index.columns.iter().all(|c| reshaped.has_column(c))
				&& !dropped.iter().any(|column| mentions(&sql, column));
			if !survives {
				tracing::info!(index = %index.name, "index references a removed column and is not recreated");
				return None;
			}
			Some(IndexRecreation {
				name: index.name.clone(),
				sql,
			})
		})
		.collect()
}

/// Recreates `table` with `alteration` applied.
pub(crate) async fn rebuild(
	provider: &mut SqliteProvider,
	table: &str,
	alteration: Alteration,
) -> Result<()> {
	let catalog = provider.require_catalog(table).await?;
	let shadow = shadow_table_name(table);
	if provider.table_exists(&shadow).await? {
		return Err(MigrationError::InvalidOperation(format!(
			"shadow table '{}' already exists; an earlier rebuild of '{}' did not finish",
			shadow, table
		)));
	}

	let original = TableShape::from_catalog(&catalog, &provider.dialect)?;
	let mut reshaped = original.clone();
	reshaped.apply(alteration)?;
	let create_sql = reshaped.create_sql(&provider.dialect, &shadow)?;
	let copied: Vec<String> = reshaped
		.columns
		.iter()
		.filter(|c| original.has_column(&c.name))
		.map(|c| c.name.clone())
		.collect();
	let indexes = surviving_indexes(&catalog, &original, &reshaped);

	tracing::debug!(table, shadow = %shadow, "rebuilding table");
	let standalone = !provider.in_transaction();
	let restore_foreign_keys = standalone && provider.foreign_keys_enabled().await?;
	if restore_foreign_keys {
		provider.set_foreign_keys(false).await?;
	}

	let swapped = swap(provider, table, &shadow, &create_sql, &copied, &indexes).await;
	let checked = match swapped {
		Ok(()) if standalone => provider.check_foreign_keys().await,
		other => other,
	};
	if restore_foreign_keys {
		let restored = provider.set_foreign_keys(true).await;
		return checked.and(restored);
	}
	checked
}

async fn swap(
	provider: &mut SqliteProvider,
	table: &str,
	shadow: &str,
	create_sql: &str,
	copied: &[String],
	indexes: &[IndexRecreation],
) -> Result<()> {
	provider.execute_non_query(create_sql).await?;

	let incomplete = |step: RebuildStep, source: MigrationError| MigrationError::RebuildIncomplete {
		table: table.to_string(),
		shadow_table: shadow.to_string(),
		step,
		source: Box::new(source),
	};

	if !copied.is_empty() {
		let dialect = &provider.dialect;
		let columns = dialect.quote_list(copied);
		let copy_sql = format!(
			"INSERT INTO {} ({}) SELECT {} FROM {}",
			dialect.quote(shadow),
			columns,
			columns,
			dialect.quote(table)
		);
		provider
			.execute_non_query(&copy_sql)
			.await
			.map_err(|e| incomplete(RebuildStep::CopyRows, e))?;
	}

	let drop_sql = provider.dialect.drop_table_sql(&TableName::new(table));
	provider
		.execute_non_query(&drop_sql)
		.await
		.map_err(|e| incomplete(RebuildStep::DropOriginal, e))?;

	let rename_sql = provider
		.dialect
		.rename_table_sql(&TableName::new(shadow), table);
	provider
		.execute_non_query(&rename_sql)
		.await
		.map_err(|e| incomplete(RebuildStep::RenameShadow, e))?;

	for index in indexes {
		tracing::trace!(index = %index.name, "recreating index");
		provider
			.execute_non_query(&index.sql)
			.await
			.map_err(|e| incomplete(RebuildStep::RecreateIndexes, e))?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::schema::{DataType, ForeignKeyAction};
	use rstest::{fixture, rstest};

	#[fixture]
	fn shape() -> TableShape {
		TableShape {
			columns: vec![
				Column::new("id", DataType::Int64)
					.with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY),
				Column::new("customer_id", DataType::Int32)
					.with_properties(ColumnProperty::NOT_NULL | ColumnProperty::FOREIGN_KEY),
				Column::new("total", DataType::Decimal)
					.with_precision(10, 2)
					.with_properties(ColumnProperty::NULL),
			],
			primary_key_name: None,
			uniques: Vec::new(),
			checks: vec![CheckConstraint {
				name: Some("ck_orders_total".to_string()),
				expression: "total >= 0".to_string(),
			}],
			foreign_keys: vec![
				ForeignKeyConstraint::new(
					"fk_orders_customer",
					"orders",
					["customer_id"],
					"customers",
					["id"],
				)
				.on_delete(ForeignKeyAction::Cascade),
			],
		}
	}

	#[rstest]
	fn test_create_sql_keeps_table_constraints(shape: TableShape) {
		let sql = shape
			.create_sql(&SqliteDialect::new(), "_rebuild_tmp_orders")
			.unwrap();
		assert!(sql.starts_with("CREATE TABLE _rebuild_tmp_orders (id INTEGER PRIMARY KEY AUTOINCREMENT"));
		assert!(sql.contains("CONSTRAINT ck_orders_total CHECK (total >= 0)"));
		assert!(sql.contains("CONSTRAINT fk_orders_customer FOREIGN KEY (customer_id) REFERENCES customers (id) ON DELETE CASCADE"));
	}

	#[rstest]
	fn test_drop_column_prunes_dependent_constraints(mut shape: TableShape) {
		shape
			.apply(Alteration::DropColumn("total".to_string()))
			.unwrap();
		assert!(shape.checks.is_empty());
		shape
			.apply(Alteration::DropColumn("customer_id".to_string()))
			.unwrap();
		assert!(shape.foreign_keys.is_empty());
		assert!(matches!(
			shape.apply(Alteration::DropColumn("id".to_string())),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	fn test_composite_primary_key_is_table_level(mut shape: TableShape) {
		shape.apply(Alteration::DropPrimaryKey).unwrap();
		shape
			.apply(Alteration::AddPrimaryKey {
				name: "pk_orders".to_string(),
				columns: vec!["id".to_string(), "customer_id".to_string()],
			})
			.unwrap();
		let sql = shape.create_sql(&SqliteDialect::new(), "orders").unwrap();
		assert!(sql.contains("id INTEGER NOT NULL"));
		assert!(sql.contains("CONSTRAINT pk_orders PRIMARY KEY (id, customer_id)"));
	}

	#[rstest]
	fn test_drop_constraint_by_name(mut shape: TableShape) {
		shape
			.apply(Alteration::DropConstraint("ck_orders_total".to_string()))
			.unwrap();
		assert!(shape.checks.is_empty());
		assert!(matches!(
			shape.apply(Alteration::DropConstraint("ck_orders_total".to_string())),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	#[case("CREATE INDEX ix ON t (a) WHERE b > 0", "b", true)]
	#[case("CREATE INDEX ix ON t (a) WHERE bb > 0", "b", false)]
	fn test_mentions(#[case] sql: &str, #[case] identifier: &str, #[case] expected: bool) {
		assert_eq!(mentions(sql, identifier), expected);
	}
}
