//! Migration engine integration tests against SQLite
//!
//! **Test Coverage:**
//! - Backward unwinding to a lower target
//! - Versions merged in below the applied head
//! - Step rollback on failure and duplicate detection before any step
//! - Dry run, skipped versions, after hooks and logger events
//! - Independent scopes sharing one tracking table

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rstest::*;
use shiftdb_db::backends::factory::create_provider;
use shiftdb_db::backends::provider::TransformationProvider;
use shiftdb_db::backends::schema::{Column, ColumnProperty, DataType};
use shiftdb_db::backends::types::ProviderOptions;
use shiftdb_db::error::{MigrationError, Result};
use shiftdb_db::migrations::{
	Direction, Migration, MigrationDescriptor, MigrationLogger, Migrator,
};

type Log = Arc<Mutex<Vec<String>>>;

struct TableMigration {
	version: i64,
	log: Log,
	fail_up: bool,
}

impl TableMigration {
	fn table(&self) -> String {
		format!("t{}", self.version)
	}
}

#[async_trait]
impl Migration for TableMigration {
	async fn up(&self, db: &mut dyn TransformationProvider) -> Result<()> {
		self.log.lock().push(format!("up {}", self.version));
		db.add_table(
			&self.table(),
			vec![Column::new("id", DataType::Int64).with_properties(ColumnProperty::PRIMARY_KEY)],
		)
		.await?;
		if self.fail_up {
			return Err(MigrationError::Other(anyhow::anyhow!(
				"migration {} failed",
				self.version
			)));
		}
		Ok(())
	}

	async fn down(&self, db: &mut dyn TransformationProvider) -> Result<()> {
		self.log.lock().push(format!("down {}", self.version));
		db.remove_table(&self.table()).await
	}

	async fn after_up(&self, db: &mut dyn TransformationProvider) -> Result<()> {
		self.log.lock().push(format!(
			"after_up {} in_transaction={}",
			self.version,
			db.in_transaction()
		));
		Ok(())
	}
}

fn descriptor(version: i64, log: &Log) -> MigrationDescriptor {
	let log = Arc::clone(log);
	MigrationDescriptor::new(version, format!("create t{}", version), move || TableMigration {
		version,
		log: Arc::clone(&log),
		fail_up: false,
	})
}

fn failing_descriptor(version: i64, log: &Log) -> MigrationDescriptor {
	let log = Arc::clone(log);
	MigrationDescriptor::new(version, format!("broken t{}", version), move || TableMigration {
		version,
		log: Arc::clone(&log),
		fail_up: true,
	})
}

fn descriptors(versions: &[i64], log: &Log) -> Vec<MigrationDescriptor> {
	versions.iter().map(|&v| descriptor(v, log)).collect()
}

#[derive(Default)]
struct RecordingLogger {
	events: Mutex<Vec<String>>,
}

impl MigrationLogger for RecordingLogger {
	fn started(&self, applied: &[i64], target: i64) {
		self.events
			.lock()
			.push(format!("started {:?} -> {}", applied, target));
	}

	fn finished(&self, applied: &[i64], current: i64) {
		self.events
			.lock()
			.push(format!("finished {:?} at {}", applied, current));
	}

	fn migrate_up(&self, version: i64, _name: &str) {
		self.events.lock().push(format!("migrate_up {}", version));
	}

	fn migrate_down(&self, version: i64, _name: &str) {
		self.events.lock().push(format!("migrate_down {}", version));
	}

	fn skipping(&self, version: i64) {
		self.events.lock().push(format!("skipping {}", version));
	}

	fn rolling_back(&self, version: i64) {
		self.events.lock().push(format!("rolling_back {}", version));
	}

	fn exception(&self, version: i64, _name: &str, _error: &dyn std::fmt::Display) {
		self.events.lock().push(format!("exception {}", version));
	}
}

#[fixture]
fn log() -> Log {
	Arc::new(Mutex::new(Vec::new()))
}

async fn memory_provider(options: ProviderOptions) -> Box<dyn TransformationProvider> {
	create_provider("sqlite", "sqlite::memory:", options)
		.await
		.expect("Failed to open in-memory SQLite")
}

async fn tables(migrator: &mut Migrator) -> Vec<String> {
	migrator
		.provider()
		.get_tables()
		.await
		.unwrap()
		.into_iter()
		.filter(|t| t.starts_with('t'))
		.collect()
}

#[rstest]
#[tokio::test]
async fn test_fresh_database_applies_everything(log: Log) {
	let provider = memory_provider(ProviderOptions::default()).await;
	let mut migrator = Migrator::new(provider, descriptors(&[3, 1, 2], &log));

	let report = migrator.migrate_to_last_version().await.unwrap();

	assert_eq!(report.applied().collect::<Vec<_>>(), vec![1, 2, 3]);
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1, 2, 3]);
	assert_eq!(tables(&mut migrator).await, ["t1", "t2", "t3"]);
	assert!(
		log.lock()
			.contains(&"after_up 1 in_transaction=false".to_string())
	);
}

#[rstest]
#[tokio::test]
async fn test_lower_target_unwinds_only_higher_versions(log: Log) {
	let provider = memory_provider(ProviderOptions::default()).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1, 2, 3], &log));
	migrator.migrate(None).await.unwrap();
	log.lock().clear();

	let report = migrator.migrate(Some(2)).await.unwrap();

	assert_eq!(report.steps, vec![(3, Direction::Down)]);
	assert_eq!(*log.lock(), ["down 3"]);
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1, 2]);
	assert_eq!(tables(&mut migrator).await, ["t1", "t2"]);
}

#[rstest]
#[tokio::test]
async fn test_merged_version_below_head_is_applied(log: Log) {
	// Versions 1 and 3 were applied from one branch; 2 arrives with a merge.
	let provider = memory_provider(ProviderOptions::default()).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1, 3], &log));
	migrator.migrate(None).await.unwrap();

	let mut migrator = Migrator::new(migrator.into_provider(), descriptors(&[1, 2, 3], &log));
	log.lock().clear();
	let report = migrator.migrate(Some(2)).await.unwrap();

	assert_eq!(report.steps, vec![(3, Direction::Down), (2, Direction::Up)]);
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1, 2]);

	log.lock().clear();
	let report = migrator.migrate_to_last_version().await.unwrap();
	assert_eq!(report.steps, vec![(3, Direction::Up)]);
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1, 2, 3]);
}

#[rstest]
#[tokio::test]
async fn test_failed_step_rolls_back_and_stops(log: Log) {
	let logger = Arc::new(RecordingLogger::default());
	let provider = memory_provider(ProviderOptions::default().with_logger(logger.clone())).await;
	let mut all = descriptors(&[1, 3], &log);
	all.push(failing_descriptor(2, &log));
	let mut migrator = Migrator::new(provider, all);

	let result = migrator.migrate(None).await;

	assert!(matches!(result, Err(MigrationError::Other(_))));
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1]);
	assert_eq!(tables(&mut migrator).await, ["t1"]);
	assert!(!migrator.provider().in_transaction());
	assert!(!log.lock().contains(&"up 3".to_string()));

	let events = logger.events.lock();
	assert!(events.contains(&"exception 2".to_string()));
	assert!(events.contains(&"rolling_back 2".to_string()));
	assert!(!events.iter().any(|e| e.starts_with("finished")));
}

#[rstest]
#[tokio::test]
async fn test_duplicate_versions_fail_before_any_step(log: Log) {
	let provider = memory_provider(ProviderOptions::default()).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1, 2, 2], &log));

	let result = migrator.migrate(None).await;

	assert!(matches!(result, Err(MigrationError::DuplicatedVersion(2))));
	assert!(log.lock().is_empty());
	assert!(migrator.provider().get_tables().await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_dry_run_reports_without_executing(log: Log) {
	let logger = Arc::new(RecordingLogger::default());
	let provider = memory_provider(ProviderOptions::default().with_logger(logger.clone())).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1, 2], &log)).dry_run(true);

	let report = migrator.migrate(None).await.unwrap();

	assert!(report.dry_run);
	assert_eq!(report.steps, vec![(1, Direction::Up), (2, Direction::Up)]);
	assert!(log.lock().is_empty());
	assert!(migrator.applied_migrations().await.unwrap().is_empty());
	assert!(
		logger
			.events
			.lock()
			.contains(&"migrate_up 2".to_string())
	);
}

#[rstest]
#[tokio::test]
async fn test_applied_version_without_descriptor_is_skipped(log: Log) {
	let logger = Arc::new(RecordingLogger::default());
	let provider = memory_provider(ProviderOptions::default().with_logger(logger.clone())).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1, 2], &log));
	migrator.migrate(None).await.unwrap();
	migrator.provider().migration_applied(5, "").await.unwrap();

	let report = migrator.migrate(Some(2)).await.unwrap();

	assert!(report.is_empty());
	assert!(logger.events.lock().contains(&"skipping 5".to_string()));
	assert_eq!(migrator.applied_migrations().await.unwrap(), vec![1, 2, 5]);
}

#[rstest]
#[tokio::test]
async fn test_negative_target_rejected(log: Log) {
	let provider = memory_provider(ProviderOptions::default()).await;
	let mut migrator = Migrator::new(provider, descriptors(&[1], &log));
	let result = migrator.migrate(Some(-1)).await;
	assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
}

#[rstest]
#[tokio::test]
async fn test_scopes_track_independently(log: Log) {
	let dir = tempfile::tempdir().unwrap();
	let url = format!("sqlite://{}", dir.path().join("scopes.db").display());
	let all = vec![
		descriptor(1, &log),
		descriptor(2, &log).with_scope("billing"),
		descriptor(3, &log).ignored(),
	];

	let core = create_provider("sqlite", &url, ProviderOptions::default())
		.await
		.unwrap();
	let mut core = Migrator::new(core, all.clone());
	assert_eq!(core.available_migrations(), vec![1]);
	core.migrate(None).await.unwrap();

	let billing = create_provider(
		"sqlite",
		&url,
		ProviderOptions::default().with_scope("billing"),
	)
	.await
	.unwrap();
	let mut billing = Migrator::new(billing, all);
	assert_eq!(billing.available_migrations(), vec![2]);
	billing.migrate(None).await.unwrap();

	assert_eq!(core.applied_migrations().await.unwrap(), vec![1]);
	assert_eq!(billing.applied_migrations().await.unwrap(), vec![2]);
	assert_eq!(tables(&mut core).await, ["t1", "t2"]);
}
