//! The [`Reorder`] contract shared by the authoritative collection and client mirrors.

use std::ops::RangeInclusive;

use roster_proto::{Action, Position};

use crate::error::ReorderError;

/// Applies [`Action`]s to an ordered store of records.
///
/// Implementors keep positions dense: after any successful call the records
/// they hold occupy consecutive positions with no gaps or duplicates.
pub trait Reorder {
	/// Checks that `action` can be applied to the current state.
	///
	/// # Errors
	///
	/// Returns the error `apply` would return, without mutating anything.
	fn validate(&self, action: &Action) -> Result<(), ReorderError>;

	/// Applies one action atomically.
	///
	/// # Errors
	///
	/// Returns an error and leaves the store untouched if validation fails.
	fn apply(&mut self, action: &Action) -> Result<(), ReorderError>;

	/// Applies `actions` in order, or none of them.
	///
	/// Validity depends only on the shape of the store, never on record
	/// contents, and no action changes that shape. Validating the whole batch
	/// up front is therefore exact.
	///
	/// # Errors
	///
	/// Returns the first validation error; nothing is mutated in that case.
	fn apply_batch(&mut self, actions: &[Action]) -> Result<(), ReorderError> {
		for action in actions {
			self.validate(action)?;
		}
		for action in actions {
			self.apply(action)?;
		}
		Ok(())
	}
}

/// Returns the action that undoes `action` when applied right after it.
#[must_use]
pub fn invert(action: &Action) -> Action {
	match *action {
		Action::Toggle(pos) => Action::Toggle(pos),
		Action::Swap(a, b) => Action::Swap(a, b),
		Action::Move(from, to) => Action::Move(to, from),
	}
}

/// Returns the inverse of a whole batch: each action inverted, in reverse order.
#[must_use]
pub fn invert_batch(actions: &[Action]) -> Vec<Action> {
	actions.iter().rev().map(invert).collect()
}

/// Span of positions whose records `action` may change.
#[must_use]
pub fn footprint(action: &Action) -> RangeInclusive<Position> {
	match *action {
		Action::Toggle(pos) => pos..=pos,
		Action::Swap(a, b) | Action::Move(a, b) => a.min(b)..=a.max(b),
	}
}

/// Returns true when the footprints of `a` and `b` share a position.
#[must_use]
pub fn overlaps(a: &Action, b: &Action) -> bool {
	let (a, b) = (footprint(a), footprint(b));
	a.start() <= b.end() && b.start() <= a.end()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn move_inverts_to_reverse_move() {
		assert_eq!(invert(&Action::Move(7, 2)), Action::Move(2, 7));
		assert_eq!(invert(&Action::Swap(1, 4)), Action::Swap(1, 4));
		assert_eq!(invert(&Action::Toggle(3)), Action::Toggle(3));
	}

	#[test]
	fn batch_inverse_runs_backwards() {
		let batch = [Action::Toggle(0), Action::Move(1, 5), Action::Swap(2, 3)];
		assert_eq!(
			invert_batch(&batch),
			vec![Action::Swap(2, 3), Action::Move(5, 1), Action::Toggle(0)]
		);
	}

	#[test]
	fn footprints_span_both_endpoints() {
		assert_eq!(footprint(&Action::Move(9, 4)), 4..=9);
		assert_eq!(footprint(&Action::Swap(2, 6)), 2..=6);
		assert_eq!(footprint(&Action::Toggle(5)), 5..=5);
	}

	#[test]
	fn overlap_is_inclusive_at_the_edges() {
		assert!(overlaps(&Action::Move(0, 3), &Action::Toggle(3)));
		assert!(overlaps(&Action::Swap(5, 8), &Action::Move(10, 8)));
		assert!(!overlaps(&Action::Move(0, 3), &Action::Toggle(4)));
	}
}
