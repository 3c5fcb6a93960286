//! Migration event sink
//!
//! Providers and the [`Migrator`](super::Migrator) report what they do through a
//! [`MigrationLogger`]. Loggers only observe; nothing they do feeds back into
//! control flow.

use std::fmt::Display;

/// Observer for migration runs.
///
/// Every method has an empty default so sinks only implement what they need.
pub trait MigrationLogger: Send + Sync {
	/// A run is about to start. `applied` and `target` are the versions seen up front.
	fn started(&self, _applied: &[i64], _target: i64) {}

	/// The run completed without error.
	fn finished(&self, _applied: &[i64], _current: i64) {}

	fn migrate_up(&self, _version: i64, _name: &str) {}

	fn migrate_down(&self, _version: i64, _name: &str) {}

	/// A visited version has no descriptor in the loader.
	fn skipping(&self, _version: i64) {}

	fn rolling_back(&self, _version: i64) {}

	fn exception(&self, _version: i64, _name: &str, _error: &dyn Display) {}

	/// A DDL or DML statement is about to be sent to the database.
	fn applying_db_change(&self, _sql: &str) {}
}

/// Default sink; emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl MigrationLogger for TracingLogger {
	fn started(&self, applied: &[i64], target: i64) {
		tracing::info!(?applied, target, "migration run started");
	}

	fn finished(&self, applied: &[i64], current: i64) {
		tracing::info!(?applied, current, "migration run finished");
	}

	fn migrate_up(&self, version: i64, name: &str) {
		tracing::info!(version, name, "applying migration");
	}

	fn migrate_down(&self, version: i64, name: &str) {
		tracing::info!(version, name, "removing migration");
	}

	fn skipping(&self, version: i64) {
		tracing::warn!(version, "no migration found for version, skipping");
	}

	fn rolling_back(&self, version: i64) {
		tracing::warn!(version, "rolling back migration step");
	}

	fn exception(&self, version: i64, name: &str, error: &dyn Display) {
		tracing::error!(version, name, error = %error, "migration step failed");
	}

	fn applying_db_change(&self, sql: &str) {
		tracing::debug!(sql, "executing statement");
	}
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentLogger;

impl MigrationLogger for SilentLogger {}
