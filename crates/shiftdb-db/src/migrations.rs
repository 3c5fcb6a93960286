//! Versioned migrations
//!
//! A [`Migration`] is one versioned change written against a
//! [`TransformationProvider`](crate::backends::provider::TransformationProvider).
//! The [`MigrationLoader`] orders the descriptors of a scope, the
//! [`traversal`] decides which versions to visit and in which direction, and
//! the [`Migrator`] executes each visit in its own transaction while recording
//! the version in the tracking table.

pub mod executor;
pub mod loader;
pub mod logger;
pub mod migration;
pub mod settings;
pub mod traversal;

pub use executor::{MigrationReport, Migrator};
pub use loader::MigrationLoader;
pub use logger::{MigrationLogger, SilentLogger, TracingLogger};
pub use migration::{Migration, MigrationDescriptor, MigrationFactory};
pub use settings::MigrationSettings;
pub use traversal::{Direction, MigrationPlan};
