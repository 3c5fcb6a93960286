//! Migration settings
//!
//! Settings are parsed from TOML text supplied by the host application.
//!
//! ```toml
//! backend = "postgres"
//! url = "postgres://app@localhost/app"
//! schema = "inventory"
//! scope = "billing"
//! dry_run = false
//! target = 20240101
//! ```

use serde::Deserialize;

use super::executor::{MigrationReport, Migrator};
use super::migration::MigrationDescriptor;
use crate::backends::factory::create_provider;
use crate::backends::provider::TransformationProvider;
use crate::backends::types::{DEFAULT_TRACKING_TABLE, ProviderOptions};
use crate::error::{MigrationError, Result};

fn default_tracking_table() -> String {
	DEFAULT_TRACKING_TABLE.to_string()
}

/// Where and how to run migrations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationSettings {
	/// Backend identifier as understood by the provider factory
	pub backend: String,
	pub url: String,
	#[serde(default)]
	pub schema: Option<String>,
	#[serde(default)]
	pub scope: String,
	#[serde(default = "default_tracking_table")]
	pub tracking_table: String,
	#[serde(default)]
	pub driver: Option<String>,
	#[serde(default)]
	pub dry_run: bool,
	/// Target version; the latest known version when absent
	#[serde(default)]
	pub target: Option<i64>,
}

impl MigrationSettings {
	/// Parses settings from TOML.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdb_db::migrations::MigrationSettings;
	///
	/// let settings = MigrationSettings::from_toml_str(
	///     r#"
	///     backend = "sqlite"
	///     url = "sqlite::memory:"
	///     "#,
	/// )
	/// .unwrap();
	/// assert_eq!(settings.tracking_table, "SchemaInfo");
	/// assert_eq!(settings.target, None);
	/// ```
	pub fn from_toml_str(text: &str) -> Result<Self> {
		let settings: Self =
			toml::from_str(text).map_err(|e| MigrationError::Settings(e.to_string()))?;
		if settings.backend.trim().is_empty() {
			return Err(MigrationError::Settings("backend must not be empty".to_string()));
		}
		if let Some(target) = settings.target {
			if target < 0 {
				return Err(MigrationError::Settings(format!(
					"target must not be negative, got {}",
					target
				)));
			}
		}
		Ok(settings)
	}

	pub fn provider_options(&self) -> ProviderOptions {
		let mut options = ProviderOptions::default()
			.with_scope(self.scope.clone())
			.with_tracking_table(self.tracking_table.clone());
		if let Some(schema) = &self.schema {
			options = options.with_schema(schema.clone());
		}
		if let Some(driver) = &self.driver {
			options = options.with_driver(driver.clone());
		}
		options
	}

	/// Opens a provider through the global factory.
	pub async fn connect(&self) -> Result<Box<dyn TransformationProvider>> {
		create_provider(&self.backend, &self.url, self.provider_options()).await
	}

	/// Connects and runs the descriptors to the configured target.
	pub async fn run(
		&self,
		descriptors: impl IntoIterator<Item = MigrationDescriptor>,
	) -> Result<MigrationReport> {
		let provider = self.connect().await?;
		let mut migrator = Migrator::new(provider, descriptors).dry_run(self.dry_run);
		migrator.migrate(self.target).await
	}
}
