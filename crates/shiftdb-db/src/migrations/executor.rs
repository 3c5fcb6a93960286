//! Migration executor
//!
//! [`Migrator`] drives the [`traversal`](super::traversal) against a live
//! provider. Every step runs in its own transaction together with the tracking
//! row it adds or removes, so schema and bookkeeping commit or roll back as one.

use std::collections::BTreeSet;
use std::fmt;

use super::loader::MigrationLoader;
use super::migration::{Migration, MigrationDescriptor};
use super::traversal::{self, Direction, Traversal, Visit};
use crate::backends::provider::TransformationProvider;
use crate::error::{MigrationError, Result};

/// Steps a run executed, in order. In dry-run mode, the steps it would execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
	pub steps: Vec<(i64, Direction)>,
	pub dry_run: bool,
}

impl MigrationReport {
	pub fn applied(&self) -> impl Iterator<Item = i64> + '_ {
		self.versions(Direction::Up)
	}

	pub fn unapplied(&self) -> impl Iterator<Item = i64> + '_ {
		self.versions(Direction::Down)
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	fn versions(&self, direction: Direction) -> impl Iterator<Item = i64> + '_ {
		self.steps
			.iter()
			.filter(move |(_, d)| *d == direction)
			.map(|(version, _)| *version)
	}
}

/// Runs the migrations of one scope against one provider.
///
/// # Examples
///
/// ```no_run
/// use shiftdb_db::backends::factory::create_provider;
/// use shiftdb_db::backends::types::ProviderOptions;
/// use shiftdb_db::migrations::{MigrationDescriptor, Migrator};
///
/// # async fn run(descriptors: Vec<MigrationDescriptor>) -> shiftdb_db::error::Result<()> {
/// let provider = create_provider("sqlite", "sqlite://app.db", ProviderOptions::default()).await?;
/// let mut migrator = Migrator::new(provider, descriptors);
/// let report = migrator.migrate_to_last_version().await?;
/// println!("applied {:?}", report.applied().collect::<Vec<_>>());
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
	provider: Box<dyn TransformationProvider>,
	loader: MigrationLoader,
	dry_run: bool,
}

impl Migrator {
	/// Loads the descriptors belonging to the provider's scope.
	pub fn new(
		provider: Box<dyn TransformationProvider>,
		descriptors: impl IntoIterator<Item = MigrationDescriptor>,
	) -> Self {
		let loader = MigrationLoader::new(provider.options().scope.clone(), descriptors);
		Self {
			provider,
			loader,
			dry_run: false,
		}
	}

	/// In dry-run mode, steps are logged and reported but nothing is executed.
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	pub fn set_dry_run(&mut self, dry_run: bool) {
		self.dry_run = dry_run;
	}

	pub fn is_dry_run(&self) -> bool {
		self.dry_run
	}

	pub fn loader(&self) -> &MigrationLoader {
		&self.loader
	}

	pub fn provider(&mut self) -> &mut dyn TransformationProvider {
		self.provider.as_mut()
	}

	pub fn into_provider(self) -> Box<dyn TransformationProvider> {
		self.provider
	}

	pub fn available_migrations(&self) -> Vec<i64> {
		self.loader.get_available_migrations()
	}

	/// Versions recorded as applied for this migrator's scope, ascending.
	pub async fn applied_migrations(&mut self) -> Result<Vec<i64>> {
		let scope = self.loader.scope().to_string();
		self.provider.applied_migrations(&scope).await
	}

	pub async fn migrate_to_last_version(&mut self) -> Result<MigrationReport> {
		self.migrate(None).await
	}

	/// Migrates to `target`, or to the highest known version when `None`.
	///
	/// Stops at the first failing step. Steps committed before the failure stay
	/// committed.
	pub async fn migrate(&mut self, target: Option<i64>) -> Result<MigrationReport> {
		self.loader.check_for_duplicated_version()?;
		let target = target.unwrap_or_else(|| self.loader.last_version());
		if target < 0 {
			return Err(MigrationError::InvalidOperation(format!(
				"target version must not be negative, got {}",
				target
			)));
		}

		let scope = self.loader.scope().to_string();
		let initially_applied = self.provider.applied_migrations(&scope).await?;
		let logger = self.provider.options().logger.clone();
		logger.started(&initially_applied, target);

		let available: BTreeSet<i64> = self.loader.get_available_migrations().into_iter().collect();
		let original: BTreeSet<i64> = initially_applied.iter().copied().collect();
		let mut applied = original.clone();
		let mut report = MigrationReport {
			steps: Vec::new(),
			dry_run: self.dry_run,
		};

		let mut state = Traversal::start(&original);
		while state != Traversal::Done {
			let (next, visit) = traversal::step(state, &available, &original, target);
			state = next;
			let Some(visit) = visit else {
				continue;
			};
			let Some(descriptor) = self.loader.get_migration(visit.version).cloned() else {
				logger.skipping(visit.version);
				continue;
			};
			let direction = self
				.run_step(&descriptor, visit, applied.contains(&visit.version), &scope)
				.await?;
			match direction {
				Direction::Up => applied.insert(visit.version),
				Direction::Down => applied.remove(&visit.version),
			};
			report.steps.push((visit.version, direction));
		}

		let applied: Vec<i64> = applied.into_iter().collect();
		let current = applied.last().copied().unwrap_or(0);
		logger.finished(&applied, current);
		Ok(report)
	}

	/// Executes one step and returns the direction it actually took.
	///
	/// The direction follows the live tracking state: a version that is
	/// currently applied is unapplied, anything else is applied.
	async fn run_step(
		&mut self,
		descriptor: &MigrationDescriptor,
		visit: Visit,
		is_applied: bool,
		scope: &str,
	) -> Result<Direction> {
		let logger = self.provider.options().logger.clone();
		let direction = if is_applied { Direction::Down } else { Direction::Up };
		if direction != visit.direction {
			tracing::debug!(
				version = descriptor.version,
				planned = %visit.direction,
				actual = %direction,
				"tracking state differs from plan"
			);
		}
		match direction {
			Direction::Up => logger.migrate_up(descriptor.version, &descriptor.name),
			Direction::Down => logger.migrate_down(descriptor.version, &descriptor.name),
		}
		if self.dry_run {
			return Ok(direction);
		}

		let migration = descriptor.instantiate();
		let outcome = self
			.execute_in_transaction(migration.as_ref(), descriptor.version, direction, scope)
			.await;
		if let Err(err) = outcome {
			logger.exception(descriptor.version, &descriptor.name, &err);
			logger.rolling_back(descriptor.version);
			if self.provider.in_transaction() {
				if let Err(rollback_err) = self.provider.rollback().await {
					tracing::error!(
						version = descriptor.version,
						error = %rollback_err,
						"rollback failed"
					);
				}
			}
			return Err(err);
		}

		let provider = self.provider.as_mut();
		match direction {
			Direction::Up => migration.after_up(provider).await?,
			Direction::Down => migration.after_down(provider).await?,
		}
		Ok(direction)
	}

	async fn execute_in_transaction(
		&mut self,
		migration: &dyn Migration,
		version: i64,
		direction: Direction,
		scope: &str,
	) -> Result<()> {
		let provider = self.provider.as_mut();
		provider.begin_transaction().await?;
		match direction {
			Direction::Up => {
				migration.up(provider).await?;
				provider.migration_applied(version, scope).await?;
			}
			Direction::Down => {
				migration.down(provider).await?;
				provider.migration_unapplied(version, scope).await?;
			}
		}
		provider.commit().await
	}
}

impl fmt::Debug for Migrator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Migrator")
			.field("loader", &self.loader)
			.field("dry_run", &self.dry_run)
			.finish_non_exhaustive()
	}
}
