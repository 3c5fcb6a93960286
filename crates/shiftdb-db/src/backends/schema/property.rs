//! Column property flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::{MigrationError, Result};

/// Set of column properties.
///
/// Properties compose with `|` and are queried with [`ColumnProperty::is_set`],
/// [`ColumnProperty::is_not_set`] and [`ColumnProperty::clear`].
/// [`ColumnProperty::PRIMARY_KEY_WITH_IDENTITY`] is a named combination rather
/// than an independent flag.
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::schema::ColumnProperty;
///
/// let props = ColumnProperty::PRIMARY_KEY | ColumnProperty::IDENTITY;
/// assert!(props.is_set(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY));
/// assert!(props.is_not_set(ColumnProperty::NULL));
/// assert!(!props.is_set(ColumnProperty::NONE));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColumnProperty(u16);

impl ColumnProperty {
	pub const NONE: Self = Self(0);
	pub const NOT_NULL: Self = Self(1);
	pub const NULL: Self = Self(1 << 1);
	pub const PRIMARY_KEY: Self = Self(1 << 2);
	pub const IDENTITY: Self = Self(1 << 3);
	pub const UNIQUE: Self = Self(1 << 4);
	pub const INDEXED: Self = Self(1 << 5);
	pub const FOREIGN_KEY: Self = Self(1 << 6);
	pub const UNSIGNED: Self = Self(1 << 7);
	pub const PRIMARY_KEY_WITH_IDENTITY: Self = Self(Self::PRIMARY_KEY.0 | Self::IDENTITY.0);

	const NAMED: [(Self, &'static str); 8] = [
		(Self::NOT_NULL, "NotNull"),
		(Self::NULL, "Null"),
		(Self::PRIMARY_KEY, "PrimaryKey"),
		(Self::IDENTITY, "Identity"),
		(Self::UNIQUE, "Unique"),
		(Self::INDEXED, "Indexed"),
		(Self::FOREIGN_KEY, "ForeignKey"),
		(Self::UNSIGNED, "Unsigned"),
	];

	pub const fn bits(self) -> u16 {
		self.0
	}

	/// Returns true when every flag of `flag` is present.
	///
	/// `NONE` is only "set" on an empty property set; it is never implied by
	/// the presence of other flags.
	pub const fn is_set(self, flag: Self) -> bool {
		if flag.0 == 0 {
			return self.0 == 0;
		}
		self.0 & flag.0 == flag.0
	}

	pub const fn is_not_set(self, flag: Self) -> bool {
		!self.is_set(flag)
	}

	/// Returns a copy with the bits of `flag` removed.
	pub const fn clear(self, flag: Self) -> Self {
		Self(self.0 & !flag.0)
	}

	pub const fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Rejects combinations no backend can express.
	pub fn validate(self) -> Result<Self> {
		if self.is_set(Self::PRIMARY_KEY) && self.is_set(Self::NULL) {
			return Err(MigrationError::InvalidOperation(
				"a primary key column cannot be nullable".to_string(),
			));
		}
		if self.is_set(Self::NULL) && self.is_set(Self::NOT_NULL) {
			return Err(MigrationError::InvalidOperation(
				"a column cannot be both NULL and NOT NULL".to_string(),
			));
		}
		Ok(self)
	}

	/// Canonical form reported by introspection.
	///
	/// A primary key carries no explicit nullability; every other column carries
	/// exactly one of `NULL` / `NOT_NULL`.
	pub fn normalize(self) -> Self {
		if self.is_set(Self::PRIMARY_KEY) {
			return self.clear(Self::NULL | Self::NOT_NULL);
		}
		if self.is_not_set(Self::NULL) && self.is_not_set(Self::NOT_NULL) {
			return self | Self::NULL;
		}
		self
	}
}

impl BitOr for ColumnProperty {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

impl BitOrAssign for ColumnProperty {
	fn bitor_assign(&mut self, rhs: Self) {
		self.0 |= rhs.0;
	}
}

impl fmt::Debug for ColumnProperty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0 == 0 {
			return f.write_str("ColumnProperty(None)");
		}
		let names: Vec<&str> = Self::NAMED
			.iter()
			.filter(|(flag, _)| self.is_set(*flag))
			.map(|(_, name)| *name)
			.collect();
		write!(f, "ColumnProperty({})", names.join(" | "))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_none_only_set_on_empty() {
		assert!(ColumnProperty::NONE.is_set(ColumnProperty::NONE));
		assert!(!ColumnProperty::NOT_NULL.is_set(ColumnProperty::NONE));
		assert!(ColumnProperty::UNIQUE.is_not_set(ColumnProperty::NONE));
	}

	#[rstest]
	fn test_named_combination_requires_both_flags() {
		let pk = ColumnProperty::PRIMARY_KEY;
		assert!(!pk.is_set(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY));
		let both = pk | ColumnProperty::IDENTITY;
		assert!(both.is_set(ColumnProperty::PRIMARY_KEY_WITH_IDENTITY));
		assert_eq!(both, ColumnProperty::PRIMARY_KEY_WITH_IDENTITY);
	}

	#[rstest]
	fn test_clear_removes_only_given_bits() {
		let props = ColumnProperty::PRIMARY_KEY_WITH_IDENTITY | ColumnProperty::UNIQUE;
		let cleared = props.clear(ColumnProperty::IDENTITY);
		assert!(cleared.is_set(ColumnProperty::PRIMARY_KEY));
		assert!(cleared.is_set(ColumnProperty::UNIQUE));
		assert!(cleared.is_not_set(ColumnProperty::IDENTITY));
	}

	#[rstest]
	#[case(ColumnProperty::PRIMARY_KEY | ColumnProperty::NULL)]
	#[case(ColumnProperty::NULL | ColumnProperty::NOT_NULL)]
	fn test_validate_rejects_conflicts(#[case] props: ColumnProperty) {
		assert!(matches!(
			props.validate(),
			Err(MigrationError::InvalidOperation(_))
		));
	}

	#[rstest]
	#[case(ColumnProperty::NONE, ColumnProperty::NULL)]
	#[case(ColumnProperty::UNIQUE, ColumnProperty::UNIQUE | ColumnProperty::NULL)]
	#[case(ColumnProperty::NOT_NULL, ColumnProperty::NOT_NULL)]
	#[case(
		ColumnProperty::PRIMARY_KEY | ColumnProperty::NOT_NULL,
		ColumnProperty::PRIMARY_KEY
	)]
	fn test_normalize(#[case] input: ColumnProperty, #[case] expected: ColumnProperty) {
		assert_eq!(input.normalize(), expected);
	}

	#[rstest]
	fn test_debug_lists_flag_names() {
		let props = ColumnProperty::NOT_NULL | ColumnProperty::UNIQUE;
		assert_eq!(format!("{:?}", props), "ColumnProperty(NotNull | Unique)");
	}
}
