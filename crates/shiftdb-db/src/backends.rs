//! # shiftdb backends
//!
//! Portable schema model, per-engine dialects and the transformation
//! providers that apply schema changes over a live connection.
//!
//! ## Supported Databases
//!
//! | Database | Feature Flag | Dialect | Provider |
//! |----------|--------------|---------|----------|
//! | PostgreSQL | `postgres` | [`dialect::PostgresDialect`] | [`provider::PostgresProvider`] |
//! | MySQL/MariaDB | `mysql` | [`dialect::MysqlDialect`] | [`provider::MysqlProvider`] |
//! | SQLite | `sqlite` | [`dialect::SqliteDialect`] | [`provider::SqliteProvider`] |
//!
//! ## Core Traits
//!
//! - **[`Dialect`]**: type mapping, identifier quoting and SQL composition
//! - **[`SchemaIntrospector`]**: reads tables, columns, indexes and constraints back
//! - **[`DdlExecutor`]**: statement execution and transaction control
//! - **[`TransformationProvider`]**: the uniform structural operation set
//!
//! Providers are obtained through the [`factory::ProviderFactory`], which maps a
//! backend identifier (`sqlite`, `postgres`, `mysql`, ...) to its dialect.

pub mod dialect;
pub mod factory;
pub mod provider;
pub mod schema;
pub mod types;

pub use dialect::Dialect;
pub use factory::ProviderFactory;
pub use provider::{DdlExecutor, SchemaIntrospector, TransformationProvider};
pub use types::{DatabaseType, ProviderOptions};
