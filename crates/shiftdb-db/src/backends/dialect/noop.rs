//! Sentinel dialect for unrecognized backend identifiers

use async_trait::async_trait;

use super::{Dialect, LogicalType, NativeType, TypeMap, type_map::unsupported_native};
use crate::backends::provider::TransformationProvider;
use crate::backends::types::{DatabaseType, ProviderOptions};
use crate::error::{MigrationError, Result};

/// Returned by the factory for identifiers it does not know, so callers can
/// probe availability without handling an error.
#[derive(Debug, Clone, Default)]
pub struct NoopDialect {
	types: TypeMap,
}

impl NoopDialect {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Dialect for NoopDialect {
	fn name(&self) -> &'static str {
		"noop"
	}

	fn drivers(&self) -> &'static [&'static str] {
		&[]
	}

	fn database_type(&self) -> Option<DatabaseType> {
		None
	}

	fn type_map(&self) -> &TypeMap {
		&self.types
	}

	fn is_reserved(&self, _word: &str) -> bool {
		false
	}

	fn logical_type(&self, native: &NativeType) -> Result<LogicalType> {
		Err(unsupported_native(native))
	}

	fn identity_sql(&self) -> Option<&'static str> {
		None
	}

	async fn connect(
		&self,
		_url: &str,
		_options: ProviderOptions,
	) -> Result<Box<dyn TransformationProvider>> {
		Err(MigrationError::InvalidOperation(
			"no dialect is registered for this backend".to_string(),
		))
	}
}
