//! Provider factory
//!
//! Maps backend identifiers to dialects and asks the dialect to open a provider.
//! Lookups never fail: an unknown identifier yields the [`NoopDialect`], whose
//! [`is_available`](Dialect::is_available) is false, so callers can probe.
//!
//! # Examples
//!
//! ```
//! use shiftdb_db::backends::factory::ProviderFactory;
//!
//! let factory = ProviderFactory::with_builtin_dialects();
//! assert!(!factory.dialect("oracle").is_available());
//! assert!(!factory.is_registered("oracle"));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::dialect::{Dialect, NoopDialect};
use super::provider::TransformationProvider;
use super::types::ProviderOptions;
use crate::error::{MigrationError, Result};

/// Constructor registered for a backend identifier.
pub type DialectConstructor = fn() -> Arc<dyn Dialect>;

/// Lookup table from backend identifier to dialect.
#[derive(Clone)]
pub struct ProviderFactory {
	registry: HashMap<String, DialectConstructor>,
	noop: Arc<dyn Dialect>,
}

impl ProviderFactory {
	/// Empty factory; every lookup yields the no-op dialect.
	pub fn new() -> Self {
		Self {
			registry: HashMap::new(),
			noop: Arc::new(NoopDialect::default()),
		}
	}

	/// Factory with every dialect compiled into this build, under its name and aliases.
	pub fn with_builtin_dialects() -> Self {
		let mut factory = Self::new();
		#[cfg(feature = "sqlite")]
		factory.register_dialect(|| Arc::new(super::dialect::SqliteDialect::new()));
		#[cfg(feature = "postgres")]
		factory.register_dialect(|| Arc::new(super::dialect::PostgresDialect::new()));
		#[cfg(feature = "mysql")]
		factory.register_dialect(|| Arc::new(super::dialect::MysqlDialect::new()));
		factory
	}

	/// Registers `constructor` under one identifier. Identifiers are case-insensitive.
	pub fn register(&mut self, identifier: &str, constructor: DialectConstructor) -> &mut Self {
		self.registry
			.insert(identifier.to_ascii_lowercase(), constructor);
		self
	}

	/// Registers a dialect under its own name and all of its aliases.
	pub fn register_dialect(&mut self, constructor: DialectConstructor) -> &mut Self {
		let dialect = constructor();
		self.register(dialect.name(), constructor);
		for alias in dialect.aliases() {
			self.register(alias, constructor);
		}
		self
	}

	pub fn is_registered(&self, identifier: &str) -> bool {
		self.registry
			.contains_key(&identifier.to_ascii_lowercase())
	}

	/// Dialect for `identifier`, or the no-op dialect when none is registered.
	pub fn dialect(&self, identifier: &str) -> Arc<dyn Dialect> {
		match self.registry.get(&identifier.to_ascii_lowercase()) {
			Some(constructor) => constructor(),
			None => {
				tracing::debug!(identifier, "no dialect registered, using noop");
				Arc::clone(&self.noop)
			}
		}
	}

	/// Registered identifiers, sorted.
	pub fn identifiers(&self) -> Vec<String> {
		let mut identifiers: Vec<String> = self.registry.keys().cloned().collect();
		identifiers.sort();
		identifiers
	}

	/// Opens a provider for `identifier` over `url`.
	///
	/// An explicit `options.driver` must be one the dialect accepts.
	pub async fn create(
		&self,
		identifier: &str,
		url: &str,
		options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>> {
		let dialect = self.dialect(identifier);
		if !dialect.is_available() {
			return Err(MigrationError::InvalidOperation(format!(
				"no dialect registered for backend '{}'",
				identifier
			)));
		}
		if let Some(driver) = &options.driver {
			if !dialect.drivers().iter().any(|d| d.eq_ignore_ascii_case(driver)) {
				return Err(MigrationError::InvalidOperation(format!(
					"driver '{}' is not supported by dialect '{}' (expected one of: {})",
					driver,
					dialect.name(),
					dialect.drivers().join(", ")
				)));
			}
		}
		tracing::info!(backend = dialect.name(), "creating transformation provider");
		dialect.connect(url, options).await
	}
}

impl Default for ProviderFactory {
	fn default() -> Self {
		Self::with_builtin_dialects()
	}
}

/// Global provider factory instance
static PROVIDER_FACTORY: once_cell::sync::Lazy<parking_lot::RwLock<ProviderFactory>> =
	once_cell::sync::Lazy::new(|| parking_lot::RwLock::new(ProviderFactory::with_builtin_dialects()));

/// Get global provider factory
pub fn provider_factory() -> &'static parking_lot::RwLock<ProviderFactory> {
	&PROVIDER_FACTORY
}

/// Opens a provider through the global factory.
pub async fn create_provider(
	identifier: &str,
	url: &str,
	options: ProviderOptions,
) -> Result<Box<dyn TransformationProvider>> {
	// Clone out of the lock; connecting awaits.
	let factory = provider_factory().read().clone();
	factory.create(identifier, url, options).await
}
