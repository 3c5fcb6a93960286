//! # shiftdb
//!
//! Versioned schema migrations with portable DDL across SQLite, PostgreSQL and
//! MySQL.
//!
//! Migrations are written once against the [`TransformationProvider`] surface
//! and run on any supported backend. The engine keeps a tracking table of applied
//! versions per scope and walks backward and forward to reach a target version,
//! so versions merged in from another branch below the current head are still
//! applied.
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - SQLite provider with copy-and-swap table rebuilds
//! - `postgres` (default) - PostgreSQL provider
//! - `mysql` (default) - MySQL/MariaDB provider
//! - `integration-tests` - container-backed PostgreSQL/MySQL tests
//!
//! ## Quick Example
//!
//! ```no_run
//! use shiftdb::prelude::*;
//!
//! #[derive(Default)]
//! struct AddEmail;
//!
//! #[async_trait]
//! impl Migration for AddEmail {
//!     async fn up(&self, db: &mut dyn TransformationProvider) -> Result<()> {
//!         db.add_column("users", Column::new("email", DataType::String).with_size(320))
//!             .await
//!     }
//!
//!     async fn down(&self, db: &mut dyn TransformationProvider) -> Result<()> {
//!         db.remove_column("users", "email").await
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let provider = create_provider("postgres", "postgres://app@localhost/app", ProviderOptions::default()).await?;
//! let mut migrator = Migrator::new(provider, vec![MigrationDescriptor::of::<AddEmail>(2, "add email")]);
//! migrator.migrate(None).await?;
//! # Ok(())
//! # }
//! ```

pub use shiftdb_db::{backends, error, migrations};

pub use shiftdb_db::backends::factory::{create_provider, provider_factory};
pub use shiftdb_db::{
	DatabaseType, Dialect, MigrationError, ProviderFactory, ProviderOptions, Result,
	TransformationProvider,
};
pub use shiftdb_db::{
	Migration, MigrationDescriptor, MigrationLoader, MigrationPlan, MigrationReport,
	MigrationSettings, Migrator,
};

/// Everything a migration author usually needs.
pub mod prelude {
	pub use crate::{
		Migration, MigrationDescriptor, MigrationError, MigrationSettings, Migrator,
		ProviderOptions, Result, TransformationProvider, create_provider,
	};
	pub use shiftdb_db::backends::schema::{
		Column, ColumnProperty, DataType, FilterItem, FilterOperator, ForeignKeyAction,
		ForeignKeyConstraint, Index, Value,
	};

	// External
	pub use async_trait::async_trait;
}
