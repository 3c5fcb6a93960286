//! # shiftdb database layer
//!
//! Versioned schema migrations over a portable DDL surface.
//!
//! This crate provides:
//! - **Schema model**: columns, indexes and constraints independent of any engine
//! - **Dialects**: logical type mapping and SQL composition per engine
//! - **Transformation providers**: structural operations and introspection over a
//!   live connection, including SQLite's copy-and-swap table rebuild
//! - **Migrations**: the loader, the directional traversal and the [`Migrator`]
//!   that applies and unapplies versions while keeping the tracking table in step
//!
//! ## Quick Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use shiftdb_db::backends::provider::TransformationProvider;
//! use shiftdb_db::backends::schema::{Column, ColumnProperty, DataType};
//! use shiftdb_db::error::Result;
//! use shiftdb_db::migrations::{Migration, MigrationDescriptor, MigrationSettings};
//!
//! #[derive(Default)]
//! struct CreateItems;
//!
//! #[async_trait]
//! impl Migration for CreateItems {
//!     async fn up(&self, db: &mut dyn TransformationProvider) -> Result<()> {
//!         db.add_table(
//!             "items",
//!             vec![
//!                 Column::new("id", DataType::Int64)
//!                     .with_properties(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY),
//!                 Column::new("title", DataType::String).with_size(200),
//!             ],
//!         )
//!         .await
//!     }
//!
//!     async fn down(&self, db: &mut dyn TransformationProvider) -> Result<()> {
//!         db.remove_table("items").await
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let settings = MigrationSettings::from_toml_str(
//!     "backend = \"sqlite\"\nurl = \"sqlite://app.db\"",
//! )?;
//! let report = settings
//!     .run(vec![MigrationDescriptor::of::<CreateItems>(1, "create items")])
//!     .await?;
//! assert_eq!(report.applied().collect::<Vec<_>>(), vec![1]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite`, `postgres`, `mysql` - backend support (all enabled by default)
//! - `integration-tests` - container-backed PostgreSQL/MySQL tests

pub mod backends;
pub mod error;
pub mod migrations;

pub use backends::{
	DatabaseType, DdlExecutor, Dialect, ProviderFactory, ProviderOptions, SchemaIntrospector,
	TransformationProvider,
};
pub use error::{MigrationError, Result};
pub use migrations::{
	Migration, MigrationDescriptor, MigrationLoader, MigrationLogger, MigrationPlan,
	MigrationReport, MigrationSettings, Migrator,
};
