//! Migration loader
//!
//! Holds the descriptors that belong to one scope, ordered by version.

use super::migration::MigrationDescriptor;
use crate::error::{MigrationError, Result};

/// Ordered view over the descriptors of a single scope.
///
/// # Examples
///
/// ```
/// # use async_trait::async_trait;
/// # use shiftdb_db::backends::provider::TransformationProvider;
/// # use shiftdb_db::error::Result;
/// use shiftdb_db::migrations::{Migration, MigrationDescriptor, MigrationLoader};
///
/// # #[derive(Default)]
/// # struct Noop;
/// # #[async_trait]
/// # impl Migration for Noop {
/// #     async fn up(&self, _: &mut dyn TransformationProvider) -> Result<()> { Ok(()) }
/// #     async fn down(&self, _: &mut dyn TransformationProvider) -> Result<()> { Ok(()) }
/// # }
/// let loader = MigrationLoader::new(
///     "",
///     vec![
///         MigrationDescriptor::of::<Noop>(3, "three"),
///         MigrationDescriptor::of::<Noop>(1, "one"),
///         MigrationDescriptor::of::<Noop>(2, "two").ignored(),
///     ],
/// );
/// assert_eq!(loader.get_available_migrations(), vec![1, 3]);
/// assert_eq!(loader.last_version(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MigrationLoader {
	scope: String,
	descriptors: Vec<MigrationDescriptor>,
}

impl MigrationLoader {
	/// Keeps the descriptors of `scope` that are not ignored, sorted by version.
	pub fn new(
		scope: impl Into<String>,
		descriptors: impl IntoIterator<Item = MigrationDescriptor>,
	) -> Self {
		let scope = scope.into();
		let mut descriptors: Vec<MigrationDescriptor> = descriptors
			.into_iter()
			.filter(|descriptor| !descriptor.ignore && descriptor.scope() == scope)
			.collect();
		descriptors.sort_by_key(|descriptor| descriptor.version);
		tracing::debug!(scope = %scope, count = descriptors.len(), "loaded migrations");
		Self { scope, descriptors }
	}

	pub fn scope(&self) -> &str {
		&self.scope
	}

	/// Fails on the lowest version that appears more than once.
	pub fn check_for_duplicated_version(&self) -> Result<()> {
		match self
			.descriptors
			.windows(2)
			.find(|pair| pair[0].version == pair[1].version)
		{
			Some(pair) => Err(MigrationError::DuplicatedVersion(pair[0].version)),
			None => Ok(()),
		}
	}

	/// Highest known version, or 0 when there are no migrations.
	pub fn last_version(&self) -> i64 {
		self.descriptors
			.last()
			.map(|descriptor| descriptor.version)
			.unwrap_or(0)
	}

	/// Known versions in ascending order.
	pub fn get_available_migrations(&self) -> Vec<i64> {
		self.descriptors
			.iter()
			.map(|descriptor| descriptor.version)
			.collect()
	}

	pub fn get_migration(&self, version: i64) -> Option<&MigrationDescriptor> {
		self.descriptors
			.binary_search_by_key(&version, |descriptor| descriptor.version)
			.ok()
			.map(|position| &self.descriptors[position])
	}

	pub fn descriptors(&self) -> &[MigrationDescriptor] {
		&self.descriptors
	}
}
