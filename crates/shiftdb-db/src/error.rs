//! Error taxonomy shared by dialects, providers and the migration engine

use std::fmt;

use thiserror::Error;

/// Step of a table rebuild at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStep {
	CopyRows,
	DropOriginal,
	RenameShadow,
	RecreateIndexes,
}

impl fmt::Display for RebuildStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let step = match self {
			RebuildStep::CopyRows => "copying rows into the shadow table",
			RebuildStep::DropOriginal => "dropping the original table",
			RebuildStep::RenameShadow => "renaming the shadow table",
			RebuildStep::RecreateIndexes => "recreating indexes",
		};
		f.write_str(step)
	}
}

#[derive(Debug, Error)]
pub enum MigrationError {
	/// A logical type/size or a native catalog type has no portable mapping
	#[error("Unsupported type: {0}")]
	UnsupportedType(String),

	/// The requested operation is structurally invalid or not portable
	#[error("Invalid operation: {0}")]
	InvalidOperation(String),

	#[error("Duplicated migration version: {0}")]
	DuplicatedVersion(i64),

	#[error(transparent)]
	Database(#[from] sqlx::Error),

	/// A rebuild stopped after its shadow table was created.
	///
	/// The shadow table is left in place; it may hold the only copy of the rows.
	#[error("Rebuild of '{table}' failed while {step}; shadow table '{shadow_table}' was left in place: {source}")]
	RebuildIncomplete {
		table: String,
		shadow_table: String,
		step: RebuildStep,
		#[source]
		source: Box<MigrationError>,
	},

	#[error("Foreign key violation: {0}")]
	ForeignKeyViolation(String),

	#[error("Transaction error: {0}")]
	Transaction(String),

	#[error("Settings error: {0}")]
	Settings(String),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl MigrationError {
	pub fn invalid(message: impl Into<String>) -> Self {
		MigrationError::InvalidOperation(message.into())
	}

	pub fn unsupported(message: impl Into<String>) -> Self {
		MigrationError::UnsupportedType(message.into())
	}

	/// Name of an orphaned shadow table, when this error left one behind.
	pub fn orphaned_shadow_table(&self) -> Option<&str> {
		match self {
			MigrationError::RebuildIncomplete { shadow_table, .. } => Some(shadow_table),
			_ => None,
		}
	}
}

impl From<toml::de::Error> for MigrationError {
	fn from(e: toml::de::Error) -> Self {
		MigrationError::Settings(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, MigrationError>;
