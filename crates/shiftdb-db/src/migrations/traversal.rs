//! Directional traversal over migration versions
//!
//! A run first walks backward from the highest applied version, unapplying
//! everything above the target. Once the walk reaches a version at or below the
//! target it turns around, restarts from zero and applies every pending version
//! up to the target. Restarting from zero catches versions below the highest
//! applied one that were never applied, e.g. after two branches were merged.
//!
//! [`step`] is the pure transition function; [`MigrationPlan::compute`] runs it
//! to completion for previews and tests, and the
//! [`Migrator`](super::Migrator) drives it against a live provider.

use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Unbounded};
use std::fmt;

use crate::error::{MigrationError, Result};

/// Whether a visited version is applied or unapplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Up,
	Down,
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Direction::Up => f.write_str("up"),
			Direction::Down => f.write_str("down"),
		}
	}
}

/// One migration step chosen by the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
	pub version: i64,
	pub direction: Direction,
}

/// Traversal state. The payload is the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
	Backward(i64),
	Forward(i64),
	Done,
}

impl Traversal {
	/// Initial state: backward from the highest applied version, or 0.
	pub fn start(applied: &BTreeSet<i64>) -> Self {
		Traversal::Backward(applied.last().copied().unwrap_or(0))
	}
}

/// Advances the traversal by at most one visit.
///
/// `applied` is the set of versions applied when the run started; it is not
/// updated as steps execute. Backward steps only ever unapply versions above
/// `target`, and forward steps stop at `target`, so the two halves never touch
/// the same version.
pub fn step(
	state: Traversal,
	available: &BTreeSet<i64>,
	applied: &BTreeSet<i64>,
	target: i64,
) -> (Traversal, Option<Visit>) {
	match state {
		Traversal::Done => (Traversal::Done, None),
		Traversal::Backward(current) if target >= current => {
			(next_forward(0, available, applied), None)
		}
		Traversal::Backward(current) => {
			let previous = applied.range(..current).next_back().copied().unwrap_or(0);
			(
				Traversal::Backward(previous),
				Some(Visit {
					version: current,
					direction: Direction::Down,
				}),
			)
		}
		Traversal::Forward(current) if current > target => (Traversal::Done, None),
		Traversal::Forward(current) => (
			next_forward(current, available, applied),
			Some(Visit {
				version: current,
				direction: Direction::Up,
			}),
		),
	}
}

fn next_forward(current: i64, available: &BTreeSet<i64>, applied: &BTreeSet<i64>) -> Traversal {
	available
		.range((Excluded(current), Unbounded))
		.find(|version| !applied.contains(version))
		.map_or(Traversal::Done, |&version| Traversal::Forward(version))
}

/// Ordered visits a run would make.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
	pub steps: Vec<Visit>,
}

impl MigrationPlan {
	/// Runs [`step`] until the traversal is done.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdb_db::migrations::traversal::{Direction, MigrationPlan};
	///
	/// // Version 2 was skipped by an earlier merge.
	/// let plan = MigrationPlan::compute(&[1, 2, 3], &[1, 3], 2).unwrap();
	/// let steps: Vec<_> = plan.steps.iter().map(|s| (s.version, s.direction)).collect();
	/// assert_eq!(steps, vec![(3, Direction::Down), (2, Direction::Up)]);
	/// ```
	pub fn compute(available: &[i64], applied: &[i64], target: i64) -> Result<Self> {
		if target < 0 {
			return Err(MigrationError::InvalidOperation(format!(
				"target version must not be negative, got {}",
				target
			)));
		}
		let available: BTreeSet<i64> = available.iter().copied().collect();
		let applied: BTreeSet<i64> = applied.iter().copied().collect();

		let mut state = Traversal::start(&applied);
		let mut steps = Vec::new();
		while state != Traversal::Done {
			let (next, visit) = step(state, &available, &applied, target);
			steps.extend(visit);
			state = next;
		}
		Ok(Self { steps })
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}
}
