//! Migration trait and descriptors

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backends::provider::TransformationProvider;
use crate::error::Result;

/// One versioned schema change.
///
/// `up` and `down` run inside the step's transaction; `after_up` and
/// `after_down` run once that transaction has committed.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use shiftdb_db::backends::provider::TransformationProvider;
/// use shiftdb_db::backends::schema::{Column, ColumnProperty, DataType};
/// use shiftdb_db::error::Result;
/// use shiftdb_db::migrations::Migration;
///
/// struct CreateAccounts;
///
/// #[async_trait]
/// impl Migration for CreateAccounts {
///     async fn up(&self, db: &mut dyn TransformationProvider) -> Result<()> {
///         db.add_table(
///             "accounts",
///             vec![Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY)],
///         )
///         .await
///     }
///
///     async fn down(&self, db: &mut dyn TransformationProvider) -> Result<()> {
///         db.remove_table("accounts").await
///     }
/// }
/// ```
#[async_trait]
pub trait Migration: Send + Sync {
	async fn up(&self, provider: &mut dyn TransformationProvider) -> Result<()>;

	async fn down(&self, provider: &mut dyn TransformationProvider) -> Result<()>;

	async fn after_up(&self, _provider: &mut dyn TransformationProvider) -> Result<()> {
		Ok(())
	}

	async fn after_down(&self, _provider: &mut dyn TransformationProvider) -> Result<()> {
		Ok(())
	}
}

/// Builds a fresh migration instance for one step.
pub type MigrationFactory = Arc<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// Version, name and filtering metadata for a migration, plus a lazy constructor.
#[derive(Clone)]
pub struct MigrationDescriptor {
	pub version: i64,
	pub name: String,
	/// Ignored descriptors never reach the loader's version list
	pub ignore: bool,
	/// Track this migration belongs to; `None` is the default (empty) scope
	pub scope: Option<String>,
	factory: MigrationFactory,
}

impl MigrationDescriptor {
	pub fn new<F, M>(version: i64, name: impl Into<String>, factory: F) -> Self
	where
		F: Fn() -> M + Send + Sync + 'static,
		M: Migration + 'static,
	{
		Self {
			version,
			name: name.into(),
			ignore: false,
			scope: None,
			factory: Arc::new(move || Box::new(factory()) as Box<dyn Migration>),
		}
	}

	/// Descriptor for a migration type constructed with [`Default`].
	pub fn of<M>(version: i64, name: impl Into<String>) -> Self
	where
		M: Migration + Default + 'static,
	{
		Self::new(version, name, M::default)
	}

	pub fn ignored(mut self) -> Self {
		self.ignore = true;
		self
	}

	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());
		self
	}

	/// Scope this descriptor is tracked under.
	pub fn scope(&self) -> &str {
		self.scope.as_deref().unwrap_or("")
	}

	/// Constructs the migration. Called once per executed step.
	pub fn instantiate(&self) -> Box<dyn Migration> {
		(self.factory)()
	}
}

impl fmt::Debug for MigrationDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MigrationDescriptor")
			.field("version", &self.version)
			.field("name", &self.name)
			.field("ignore", &self.ignore)
			.field("scope", &self.scope)
			.finish_non_exhaustive()
	}
}
