//! The authoritative ordered collection.
//!
//! Records live in one `Vec` whose index is always the record's position, so
//! every mutation finishes by renumbering the slots it touched.

use roster_proto::{Action, DEFAULT_WINDOW_LEN, Position, Record, WindowRange};

use crate::error::{ReadError, ReorderError};
use crate::reorder::Reorder;

/// Dense, totally ordered sequence of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedCollection {
	records: Vec<Record>,
}

impl OrderedCollection {
	/// Builds a collection from records in order, assigning positions `0..n`.
	pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
		let mut records: Vec<Record> = records.into_iter().collect();
		for (pos, record) in records.iter_mut().enumerate() {
			record.position = pos;
		}
		Self { records }
	}

	/// Number of records.
	#[must_use]
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Returns true when the collection holds no records.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Record at `pos`, if any.
	#[must_use]
	pub fn get(&self, pos: Position) -> Option<&Record> {
		self.records.get(pos)
	}

	/// All records in position order.
	#[must_use]
	pub fn records(&self) -> &[Record] {
		&self.records
	}

	/// Returns a window of records.
	///
	/// Without a range the first [`DEFAULT_WINDOW_LEN`] records are returned.
	/// A non-empty `search` first keeps only records with a string display
	/// field containing it (case-insensitive); the range then slices the
	/// filtered sequence. Ranges past the end are clamped.
	///
	/// # Errors
	///
	/// Returns [`ReadError::InvalidRange`] when `start > end`.
	pub fn read(
		&self,
		range: Option<WindowRange>,
		search: Option<&str>,
	) -> Result<Vec<Record>, ReadError> {
		let range = range.unwrap_or(WindowRange::new(0, DEFAULT_WINDOW_LEN));
		if range.start > range.end {
			return Err(ReadError::InvalidRange {
				start: range.start,
				end: range.end,
			});
		}

		let needle = search
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_lowercase);
		let matches = self
			.records
			.iter()
			.filter(|r| needle.as_deref().is_none_or(|n| matches_search(r, n)));

		Ok(matches
			.skip(range.start)
			.take(range.len())
			.cloned()
			.collect())
	}

	fn check(&self, pos: Position) -> Result<(), ReorderError> {
		if pos < self.records.len() {
			Ok(())
		} else {
			Err(ReorderError::PositionNotFound(pos))
		}
	}

	fn renumber(&mut self, from: Position, to: Position) {
		for pos in from..=to {
			self.records[pos].position = pos;
		}
	}
}

/// Case-insensitive substring match over the string-valued display fields,
/// joined by single spaces in key order so a query can span `first` and
/// `last`.
fn matches_search(record: &Record, needle: &str) -> bool {
	let haystack = match &record.fields {
		serde_json::Value::Object(map) => map
			.values()
			.filter_map(serde_json::Value::as_str)
			.collect::<Vec<_>>()
			.join(" "),
		other => other.as_str().unwrap_or_default().to_owned(),
	};
	haystack.to_lowercase().contains(needle)
}

impl Reorder for OrderedCollection {
	fn validate(&self, action: &Action) -> Result<(), ReorderError> {
		match *action {
			Action::Toggle(pos) => self.check(pos),
			Action::Swap(a, b) | Action::Move(a, b) => {
				self.check(a)?;
				self.check(b)
			}
		}
	}

	fn apply(&mut self, action: &Action) -> Result<(), ReorderError> {
		self.validate(action)?;
		match *action {
			Action::Toggle(pos) => {
				let record = &mut self.records[pos];
				record.checked = !record.checked;
			}
			Action::Swap(a, b) => {
				if a != b {
					self.records.swap(a, b);
					self.records[a].position = a;
					self.records[b].position = b;
				}
			}
			Action::Move(from, to) => {
				if from != to {
					let record = self.records.remove(from);
					self.records.insert(to, record);
					self.renumber(from.min(to), from.max(to));
				}
			}
		}
		Ok(())
	}
}
