//! Logical-to-native type registry
//!
//! Each dialect registers one or more templates per [`DataType`]. A template
//! registered with a capacity serves every requested size up to that capacity;
//! a template registered without one is the unbounded fallback.
//!
//! Templates may contain `$length`, `$precision` and `$scale` placeholders. When
//! a placeholder has no value the parenthesized group holding it is dropped, so
//! `DECIMAL($precision, $scale)` renders as `DECIMAL` for an unconstrained column.

use std::collections::{BTreeMap, HashMap};

use crate::backends::schema::DataType;
use crate::error::{MigrationError, Result};

#[derive(Debug, Clone, Default)]
struct TypeEntry {
	sized: BTreeMap<u32, String>,
	unbounded: Option<String>,
}

/// Registry of native type templates for one dialect.
///
/// # Examples
///
/// ```
/// use shiftdb_db::backends::dialect::TypeMap;
/// use shiftdb_db::backends::schema::DataType;
///
/// let mut map = TypeMap::new();
/// map.register_sized(DataType::String, 255, "VARCHAR($length)")
///     .register_sized(DataType::String, 65_535, "TEXT")
///     .register(DataType::String, "LONGTEXT");
///
/// assert_eq!(map.map(DataType::String, Some(40), None, None).unwrap(), "VARCHAR(40)");
/// assert_eq!(map.map(DataType::String, Some(1000), None, None).unwrap(), "TEXT");
/// assert_eq!(map.map(DataType::String, Some(70_000), None, None).unwrap(), "LONGTEXT");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
	entries: HashMap<DataType, TypeEntry>,
}

impl TypeMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the unbounded template for `data_type`, replacing any earlier one.
	pub fn register(&mut self, data_type: DataType, template: impl Into<String>) -> &mut Self {
		self.entries.entry(data_type).or_default().unbounded = Some(template.into());
		self
	}

	/// Registers a template serving sizes up to `capacity`, replacing any earlier
	/// registration with the same capacity.
	pub fn register_sized(
		&mut self,
		data_type: DataType,
		capacity: u32,
		template: impl Into<String>,
	) -> &mut Self {
		self.entries
			.entry(data_type)
			.or_default()
			.sized
			.insert(capacity, template.into());
		self
	}

	pub fn supports(&self, data_type: DataType) -> bool {
		self.entries.contains_key(&data_type)
	}

	/// Selects the template for a requested size.
	///
	/// The smallest capacity `>= size` wins; sizes above every finite capacity
	/// fall back to the unbounded template. Without a size the unbounded
	/// template is preferred, then the smallest sized one.
	pub fn template(&self, data_type: DataType, size: Option<u32>) -> Result<&str> {
		let entry = self.entries.get(&data_type).ok_or_else(|| {
			MigrationError::UnsupportedType(format!("no native type registered for {}", data_type))
		})?;

		let selected = match size {
			Some(size) => entry
				.sized
				.range(size..)
				.next()
				.map(|(_, template)| template)
				.or(entry.unbounded.as_ref()),
			None => entry
				.unbounded
				.as_ref()
				.or_else(|| entry.sized.values().next()),
		};

		selected.map(String::as_str).ok_or_else(|| {
			MigrationError::UnsupportedType(format!(
				"{} of size {} exceeds every registered native type",
				data_type,
				size.unwrap_or_default()
			))
		})
	}

	/// Renders the native type string for a column shape.
	pub fn map(
		&self,
		data_type: DataType,
		size: Option<u32>,
		precision: Option<u8>,
		scale: Option<u8>,
	) -> Result<String> {
		let template = self.template(data_type, size)?;
		// A precision without a scale means scale 0.
		let scale = scale.or(precision.map(|_| 0));
		Ok(render_template(
			template,
			&[
				("$length", size.map(|s| s.to_string())),
				("$precision", precision.map(|p| p.to_string())),
				("$scale", scale.map(|s| s.to_string())),
			],
		))
	}
}

fn render_template(template: &str, placeholders: &[(&str, Option<String>)]) -> String {
	let mut rendered = template.to_string();
	for (placeholder, value) in placeholders {
		if !rendered.contains(placeholder) {
			continue;
		}
		match value {
			Some(value) => rendered = rendered.replace(placeholder, value),
			None => rendered = drop_group_containing(&rendered, placeholder),
		}
	}
	rendered
}

fn drop_group_containing(template: &str, placeholder: &str) -> String {
	let Some(at) = template.find(placeholder) else {
		return template.to_string();
	};
	let open = template[..at].rfind('(');
	let close = template[at..].find(')').map(|offset| at + offset);
	match (open, close) {
		(Some(open), Some(close)) => {
			let mut out = template[..open].trim_end().to_string();
			out.push_str(&template[close + 1..]);
			out
		}
		_ => template.replace(placeholder, ""),
	}
}

/// A native column type as reported by a database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
	/// Upper-cased base name with single spaces, e.g. `CHARACTER VARYING`
	pub name: String,
	/// Numeric arguments inside the parentheses, in order
	pub args: Vec<u32>,
	pub unsigned: bool,
}

impl NativeType {
	/// Parses catalog type text such as `varchar(200)`, `decimal(10,2) unsigned`
	/// or `timestamp without time zone`.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdb_db::backends::dialect::NativeType;
	///
	/// let native = NativeType::parse("decimal(10,2) unsigned");
	/// assert_eq!(native.name, "DECIMAL");
	/// assert_eq!(native.args, vec![10, 2]);
	/// assert!(native.unsigned);
	/// ```
	pub fn parse(text: &str) -> Self {
		let upper = text.trim().to_ascii_uppercase();
		let (head, args, tail) = match (upper.find('('), upper.find(')')) {
			(Some(open), Some(close)) if close > open => (
				&upper[..open],
				upper[open + 1..close]
					.split(',')
					.filter_map(|arg| arg.trim().parse::<u32>().ok())
					.collect(),
				&upper[close + 1..],
			),
			_ => (upper.as_str(), Vec::new(), ""),
		};

		let mut unsigned = false;
		let mut words = Vec::new();
		for word in head.split_whitespace().chain(tail.split_whitespace()) {
			match word {
				"UNSIGNED" => unsigned = true,
				"ZEROFILL" => {}
				other => words.push(other),
			}
		}

		Self {
			name: words.join(" "),
			args,
			unsigned,
		}
	}

	pub fn arg(&self, index: usize) -> Option<u32> {
		self.args.get(index).copied()
	}
}

/// Logical shape recovered from a native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalType {
	pub data_type: DataType,
	pub size: Option<u32>,
	pub precision: Option<u8>,
	pub scale: Option<u8>,
}

impl LogicalType {
	pub fn new(data_type: DataType) -> Self {
		Self {
			data_type,
			size: None,
			precision: None,
			scale: None,
		}
	}

	pub fn sized(data_type: DataType, size: Option<u32>) -> Self {
		Self {
			size,
			..Self::new(data_type)
		}
	}

	/// Decimal shape from `(precision, scale)` catalog arguments.
	pub fn decimal(native: &NativeType) -> Result<Self> {
		let narrow = |value: Option<u32>| -> Result<Option<u8>> {
			value
				.map(|v| {
					u8::try_from(v).map_err(|_| {
						MigrationError::UnsupportedType(format!(
							"{} argument {} is out of range",
							native.name, v
						))
					})
				})
				.transpose()
		};
		Ok(Self {
			precision: narrow(native.arg(0))?,
			scale: narrow(native.arg(1))?,
			..Self::new(DataType::Decimal)
		})
	}
}

pub(crate) fn unsupported_native(native: &NativeType) -> MigrationError {
	MigrationError::UnsupportedType(format!(
		"native type '{}' has no portable mapping",
		native.name
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rstest::rstest;

	fn decimal_map() -> TypeMap {
		let mut map = TypeMap::new();
		map.register(DataType::Decimal, "DECIMAL($precision, $scale)");
		map
	}

	#[rstest]
	#[case(Some(10), Some(2), "DECIMAL(10, 2)")]
	#[case(Some(8), None, "DECIMAL(8, 0)")]
	#[case(None, None, "DECIMAL")]
	fn test_placeholder_groups(
		#[case] precision: Option<u8>,
		#[case] scale: Option<u8>,
		#[case] expected: &str,
	) {
		let map = decimal_map();
		assert_eq!(
			map.map(DataType::Decimal, None, precision, scale).unwrap(),
			expected
		);
	}

	#[rstest]
	fn test_last_registration_wins() {
		let mut map = TypeMap::new();
		map.register_sized(DataType::String, 100, "VARCHAR($length)")
			.register_sized(DataType::String, 100, "NVARCHAR($length)");
		assert_eq!(
			map.map(DataType::String, Some(10), None, None).unwrap(),
			"NVARCHAR(10)"
		);
	}

	#[rstest]
	fn test_unregistered_type_is_unsupported() {
		let map = TypeMap::new();
		assert!(matches!(
			map.template(DataType::Guid, None),
			Err(MigrationError::UnsupportedType(_))
		));
	}

	#[rstest]
	fn test_oversized_without_unbounded_fails() {
		let mut map = TypeMap::new();
		map.register_sized(DataType::StringFixedLength, 255, "CHAR($length)");
		assert!(map.template(DataType::StringFixedLength, Some(256)).is_err());
		assert_eq!(
			map.template(DataType::StringFixedLength, None).unwrap(),
			"CHAR($length)"
		);
	}

	#[rstest]
	#[case("character varying(200)", "CHARACTER VARYING", vec![200], false)]
	#[case("int unsigned", "INT", vec![], true)]
	#[case("timestamp without time zone", "TIMESTAMP WITHOUT TIME ZONE", vec![], false)]
	#[case("  numeric( 12 , 4 ) ", "NUMERIC", vec![12, 4], false)]
	fn test_native_type_parse(
		#[case] text: &str,
		#[case] name: &str,
		#[case] args: Vec<u32>,
		#[case] unsigned: bool,
	) {
		let native = NativeType::parse(text);
		assert_eq!(native.name, name);
		assert_eq!(native.args, args);
		assert_eq!(native.unsigned, unsigned);
	}

	proptest! {
		#[test]
		fn prop_smallest_sufficient_capacity_selected(
			capacities in proptest::collection::btree_set(1u32..10_000, 1..6),
			with_unbounded in any::<bool>(),
			size in 1u32..12_000,
		) {
			let mut map = TypeMap::new();
			for capacity in &capacities {
				map.register_sized(DataType::Binary, *capacity, format!("SIZED{}", capacity));
			}
			if with_unbounded {
				map.register(DataType::Binary, "UNBOUNDED");
			}

			let expected = capacities
				.iter()
				.find(|capacity| **capacity >= size)
				.map(|capacity| format!("SIZED{}", capacity))
				.or_else(|| with_unbounded.then(|| "UNBOUNDED".to_string()));

			match (map.template(DataType::Binary, Some(size)), expected) {
				(Ok(template), Some(expected)) => prop_assert_eq!(template, expected.as_str()),
				(Err(MigrationError::UnsupportedType(_)), None) => {}
				(other, expected) => prop_assert!(false, "got {:?}, expected {:?}", other.map(str::to_string), expected),
			}
		}
	}
}
