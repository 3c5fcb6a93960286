//! Foreign key, unique and check constraints

use std::fmt;

use crate::error::{MigrationError, Result};

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
	#[default]
	NoAction,
	Restrict,
	Cascade,
	SetNull,
	SetDefault,
}

impl ForeignKeyAction {
	pub fn as_sql(self) -> &'static str {
		match self {
			ForeignKeyAction::NoAction => "NO ACTION",
			ForeignKeyAction::Restrict => "RESTRICT",
			ForeignKeyAction::Cascade => "CASCADE",
			ForeignKeyAction::SetNull => "SET NULL",
			ForeignKeyAction::SetDefault => "SET DEFAULT",
		}
	}

	/// Parses the rule names reported by `information_schema` and SQLite pragmas.
	pub fn from_rule(rule: &str) -> Option<Self> {
		match rule.trim().to_ascii_uppercase().as_str() {
			"NO ACTION" | "NONE" | "" => Some(ForeignKeyAction::NoAction),
			"RESTRICT" => Some(ForeignKeyAction::Restrict),
			"CASCADE" => Some(ForeignKeyAction::Cascade),
			"SET NULL" => Some(ForeignKeyAction::SetNull),
			"SET DEFAULT" => Some(ForeignKeyAction::SetDefault),
			_ => None,
		}
	}
}

impl fmt::Display for ForeignKeyAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_sql())
	}
}

/// Foreign key constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyConstraint {
	pub name: String,
	pub table: String,
	pub columns: Vec<String>,
	pub referenced_table: String,
	pub referenced_columns: Vec<String>,
	pub on_delete: ForeignKeyAction,
	pub on_update: ForeignKeyAction,
}

impl ForeignKeyConstraint {
	pub fn new<C, R>(
		name: impl Into<String>,
		table: impl Into<String>,
		columns: C,
		referenced_table: impl Into<String>,
		referenced_columns: R,
	) -> Self
	where
		C: IntoIterator,
		C::Item: Into<String>,
		R: IntoIterator,
		R::Item: Into<String>,
	{
		Self {
			name: name.into(),
			table: table.into(),
			columns: columns.into_iter().map(Into::into).collect(),
			referenced_table: referenced_table.into(),
			referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
			on_delete: ForeignKeyAction::NoAction,
			on_update: ForeignKeyAction::NoAction,
		}
	}

	pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
		self.on_delete = action;
		self
	}

	pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
		self.on_update = action;
		self
	}

	pub fn references_column(&self, column: &str) -> bool {
		self.columns.iter().any(|c| c == column)
	}

	/// Child and parent column lists must pair up positionally.
	pub fn validate(&self) -> Result<()> {
		if self.columns.is_empty() {
			return Err(MigrationError::InvalidOperation(format!(
				"foreign key '{}' has no columns",
				self.name
			)));
		}
		if self.columns.len() != self.referenced_columns.len() {
			return Err(MigrationError::InvalidOperation(format!(
				"foreign key '{}' maps {} column(s) onto {} referenced column(s)",
				self.name,
				self.columns.len(),
				self.referenced_columns.len()
			)));
		}
		Ok(())
	}
}

/// Multi-column unique constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
	pub name: String,
	pub columns: Vec<String>,
}

/// CHECK constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConstraint {
	/// None for anonymous CHECK constraints
	pub name: Option<String>,
	/// Expression without the CHECK keyword and outer parentheses
	pub expression: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_cardinality_mismatch_rejected() {
		let fk = ForeignKeyConstraint::new("fk_a_b", "a", ["b_id", "b_rev"], "b", ["id"]);
		let err = fk.validate().unwrap_err();
		assert!(err.to_string().contains("2 column(s) onto 1"));
	}

	#[rstest]
	#[case("CASCADE", Some(ForeignKeyAction::Cascade))]
	#[case("set null", Some(ForeignKeyAction::SetNull))]
	#[case("NO ACTION", Some(ForeignKeyAction::NoAction))]
	#[case("EXPLODE", None)]
	fn test_action_from_rule(#[case] rule: &str, #[case] expected: Option<ForeignKeyAction>) {
		assert_eq!(ForeignKeyAction::from_rule(rule), expected);
	}
}
