//! Tracking table bookkeeping
//!
//! Applied versions live in a two-column table keyed by `(Version, Scope)`:
//!
//! ```text
//! Version BIGINT NOT NULL
//! Scope   VARCHAR(250) NOT NULL DEFAULT ''
//! PRIMARY KEY (Version, Scope)
//! ```
//!
//! The table is created on first use. A table left behind by an older layout
//! without the `Scope` column is upgraded in place: the column is added, the
//! key is widened to `(Version, Scope)` and existing rows land in the default
//! (empty) scope.

use sea_query::{Alias, ColumnDef, Expr, ExprTrait, Order, Query, Table};

use super::{TransformationProvider, build_query, build_schema};
use crate::backends::schema::{Column, TableName};
use crate::error::{MigrationError, Result};

pub const VERSION_COLUMN: &str = "Version";
pub const SCOPE_COLUMN: &str = "Scope";
const SCOPE_LENGTH: u32 = 250;

fn tracking_table<P>(provider: &P) -> TableName
where
	P: TransformationProvider + ?Sized,
{
	provider.table_name(&provider.options().tracking_table)
}

fn scope_column() -> ColumnDef {
	ColumnDef::new(Alias::new(SCOPE_COLUMN))
		.string_len(SCOPE_LENGTH)
		.not_null()
		.default("")
		.to_owned()
}

/// Creates the tracking table, or adds `Scope` to a legacy one.
pub(crate) async fn ensure_tracking_table<P>(provider: &mut P) -> Result<()>
where
	P: TransformationProvider + ?Sized,
{
	let name = provider.options().tracking_table.clone();
	if !provider.table_exists(&name).await? {
		let statement = Table::create()
			.table(tracking_table(provider).to_sea_ref())
			.col(
				ColumnDef::new(Alias::new(VERSION_COLUMN))
					.big_integer()
					.not_null(),
			)
			.col(scope_column())
			.primary_key(
				sea_query::Index::create()
					.col(Alias::new(VERSION_COLUMN))
					.col(Alias::new(SCOPE_COLUMN)),
			)
			.to_owned();
		let sql = build_schema(provider.dialect(), &statement)?;
		tracing::debug!(table = %name, "creating tracking table");
		provider.execute_non_query(&sql).await?;
		return Ok(());
	}

	let columns = provider.get_columns(&name).await?;
	let scope = columns.iter().find(|c| c.name == SCOPE_COLUMN);
	if scope.is_none() {
		let statement = Table::alter()
			.table(tracking_table(provider).to_sea_ref())
			.add_column(scope_column())
			.to_owned();
		let sql = build_schema(provider.dialect(), &statement)?;
		tracing::info!(table = %name, "adding scope column to legacy tracking table");
		provider.execute_non_query(&sql).await?;
	}

	// A legacy key on Version alone would make scopes collide.
	if !scope.is_some_and(Column::is_primary_key) {
		tracing::info!(table = %name, "re-keying tracking table on (Version, Scope)");
		provider.remove_primary_key(&name).await?;
		provider
			.add_primary_key(
				&format!("PK_{}", name),
				&name,
				vec![VERSION_COLUMN.to_string(), SCOPE_COLUMN.to_string()],
			)
			.await?;
	}
	Ok(())
}

pub(crate) fn select_versions_sql<P>(provider: &P, scope: &str) -> Result<String>
where
	P: TransformationProvider + ?Sized,
{
	let statement = Query::select()
		.column(Alias::new(VERSION_COLUMN))
		.from(tracking_table(provider).to_sea_ref())
		.and_where(Expr::col(Alias::new(SCOPE_COLUMN)).eq(scope.to_string()))
		.order_by(Alias::new(VERSION_COLUMN), Order::Asc)
		.to_owned();
	build_query(provider.dialect(), &statement)
}

pub(crate) fn insert_version_sql<P>(provider: &P, version: i64, scope: &str) -> Result<String>
where
	P: TransformationProvider + ?Sized,
{
	let statement = Query::insert()
		.into_table(tracking_table(provider).to_sea_ref())
		.columns([Alias::new(VERSION_COLUMN), Alias::new(SCOPE_COLUMN)])
		.values([Expr::val(version), Expr::val(scope.to_string())])
		.map_err(|e| MigrationError::InvalidOperation(e.to_string()))?
		.to_owned();
	build_query(provider.dialect(), &statement)
}

pub(crate) fn delete_version_sql<P>(provider: &P, version: i64, scope: &str) -> Result<String>
where
	P: TransformationProvider + ?Sized,
{
	let statement = Query::delete()
		.from_table(tracking_table(provider).to_sea_ref())
		.and_where(Expr::col(Alias::new(VERSION_COLUMN)).eq(version))
		.and_where(Expr::col(Alias::new(SCOPE_COLUMN)).eq(scope.to_string()))
		.to_owned();
	build_query(provider.dialect(), &statement)
}
