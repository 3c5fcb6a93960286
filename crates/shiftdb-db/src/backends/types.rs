//! Backend identity and provider construction options

use std::fmt;
use std::sync::Arc;

use crate::migrations::logger::{MigrationLogger, TracingLogger};

/// Default name of the migration tracking table.
pub const DEFAULT_TRACKING_TABLE: &str = "SchemaInfo";

/// Database engine a dialect targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
	Postgres,
	Sqlite,
	Mysql,
}

impl DatabaseType {
	/// Check if this database type supports transactional DDL
	///
	/// MySQL commits implicitly around every DDL statement, so a failed
	/// migration step there can only roll back its DML.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdb_db::backends::types::DatabaseType;
	///
	/// assert!(DatabaseType::Postgres.supports_transactional_ddl());
	/// assert!(DatabaseType::Sqlite.supports_transactional_ddl());
	/// assert!(!DatabaseType::Mysql.supports_transactional_ddl());
	/// ```
	pub fn supports_transactional_ddl(&self) -> bool {
		matches!(self, DatabaseType::Postgres | DatabaseType::Sqlite)
	}
}

impl fmt::Display for DatabaseType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DatabaseType::Postgres => "postgres",
			DatabaseType::Sqlite => "sqlite",
			DatabaseType::Mysql => "mysql",
		};
		f.write_str(name)
	}
}

/// Inputs for building a transformation provider.
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::types::ProviderOptions;
///
/// let options = ProviderOptions::default()
///     .with_schema("inventory")
///     .with_scope("billing");
/// assert_eq!(options.schema.as_deref(), Some("inventory"));
/// assert_eq!(options.tracking_table, "SchemaInfo");
/// ```
#[derive(Clone)]
pub struct ProviderOptions {
	/// Default schema/namespace; `None` uses the connection's current schema
	pub schema: Option<String>,
	/// Migration scope recorded next to every applied version
	pub scope: String,
	pub tracking_table: String,
	/// Explicit driver name, checked against the dialect's accepted drivers
	pub driver: Option<String>,
	pub logger: Arc<dyn MigrationLogger>,
}

impl ProviderOptions {
	pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());
		self
	}

	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();
		self
	}

	pub fn with_tracking_table(mut self, table: impl Into<String>) -> Self {
		self.tracking_table = table.into();
		self
	}

	pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
		self.driver = Some(driver.into());
		self
	}

	pub fn with_logger(mut self, logger: Arc<dyn MigrationLogger>) -> Self {
		self.logger = logger;
		self
	}
}

impl Default for ProviderOptions {
	fn default() -> Self {
		Self {
			schema: None,
			scope: String::new(),
			tracking_table: DEFAULT_TRACKING_TABLE.to_string(),
			driver: None,
			logger: Arc::new(TracingLogger),
		}
	}
}

impl fmt::Debug for ProviderOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderOptions")
			.field("schema", &self.schema)
			.field("scope", &self.scope)
			.field("tracking_table", &self.tracking_table)
			.field("driver", &self.driver)
			.finish_non_exhaustive()
	}
}
