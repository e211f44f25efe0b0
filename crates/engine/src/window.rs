//! Client-side windowed mirror of the collection.
//!
//! A client only holds the windows (pages) it has mounted. A [`WindowSet`]
//! keeps them sorted by start position and never lets two of them claim the
//! same position. Each window keeps a fixed capacity, so a move that crosses
//! a window boundary cascades: every window between source and destination
//! hands its boundary record to the next one in the direction of the shift.

use roster_proto::{Action, Position, Record, WindowRange};

use crate::error::{CascadeDirection, ReorderError};
use crate::reorder::Reorder;

/// One mounted contiguous slice of the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
	start: Position,
	records: Vec<Record>,
}

impl Window {
	/// Creates a window starting at `start`, renumbering `records` from there.
	pub fn new(start: Position, records: impl IntoIterator<Item = Record>) -> Self {
		let mut window = Self {
			start,
			records: records.into_iter().collect(),
		};
		window.renumber();
		window
	}

	/// Position range covered by this window.
	#[must_use]
	pub fn range(&self) -> WindowRange {
		WindowRange::new(self.start, self.start + self.records.len())
	}

	/// First position covered.
	#[must_use]
	pub fn start(&self) -> Position {
		self.start
	}

	/// Records in position order.
	#[must_use]
	pub fn records(&self) -> &[Record] {
		&self.records
	}

	/// Number of records held.
	#[must_use]
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Returns true for a window holding no records.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	fn renumber(&mut self) {
		for (offset, record) in self.records.iter_mut().enumerate() {
			record.position = self.start + offset;
		}
	}
}

/// Whether a mirror can apply a foreign action exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
	/// Every position the action touches is mounted and contiguous.
	Full,
	/// Some touched positions are mounted and some are not; refetch.
	Partial,
	/// No mounted position is affected.
	Outside,
}

/// Ordered, non-overlapping set of mounted windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSet {
	windows: Vec<Window>,
}

impl WindowSet {
	/// Creates an empty set.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Mounted windows in position order.
	#[must_use]
	pub fn windows(&self) -> &[Window] {
		&self.windows
	}

	/// Ranges of all mounted windows in position order.
	#[must_use]
	pub fn ranges(&self) -> Vec<WindowRange> {
		self.windows.iter().map(Window::range).collect()
	}

	/// All mounted records in position order.
	pub fn records(&self) -> impl Iterator<Item = &Record> {
		self.windows.iter().flat_map(|w| w.records.iter())
	}

	/// Mounted record at `pos`, if any.
	#[must_use]
	pub fn get(&self, pos: Position) -> Option<&Record> {
		self.locate(pos)
			.map(|(w, offset)| &self.windows[w].records[offset])
	}

	/// Mounts a window, keeping the set sorted. Empty windows are ignored.
	///
	/// # Errors
	///
	/// Returns [`ReorderError::WindowOverlap`] if any position of `window` is
	/// already mounted.
	pub fn mount(&mut self, window: Window) -> Result<(), ReorderError> {
		if window.is_empty() {
			return Ok(());
		}
		let range = window.range();
		let overlapping = self
			.windows
			.iter()
			.any(|w| w.start < range.end && range.start < w.range().end);
		if overlapping {
			return Err(ReorderError::WindowOverlap {
				start: range.start,
				end: range.end,
			});
		}
		let idx = self.windows.partition_point(|w| w.start < range.start);
		self.windows.insert(idx, window);
		Ok(())
	}

	/// Unmounts the window starting at `start`.
	pub fn unmount(&mut self, start: Position) -> Option<Window> {
		let idx = self.windows.iter().position(|w| w.start == start)?;
		Some(self.windows.remove(idx))
	}

	/// Replaces the records of the window starting at `start` with freshly
	/// read ones. Returns false when no such window is mounted.
	pub fn refresh(&mut self, start: Position, records: Vec<Record>) -> bool {
		let Some(window) = self.windows.iter_mut().find(|w| w.start == start) else {
			return false;
		};
		window.records = records;
		window.renumber();
		true
	}

	/// Classifies how `action` relates to the mounted windows.
	#[must_use]
	pub fn coverage(&self, action: &Action) -> Coverage {
		match *action {
			Action::Toggle(pos) => {
				if self.locate(pos).is_some() {
					Coverage::Full
				} else {
					Coverage::Outside
				}
			}
			Action::Swap(a, b) => match (self.locate(a).is_some(), self.locate(b).is_some()) {
				(true, true) => Coverage::Full,
				(false, false) => Coverage::Outside,
				_ => Coverage::Partial,
			},
			Action::Move(a, b) => {
				let (lo, hi) = (a.min(b), a.max(b));
				if self.covers_contiguously(lo, hi) {
					Coverage::Full
				} else if self
					.windows
					.iter()
					.any(|w| w.start <= hi && lo < w.range().end)
				{
					Coverage::Partial
				} else {
					Coverage::Outside
				}
			}
		}
	}

	/// Finds the window index and in-window offset holding `pos`.
	fn locate(&self, pos: Position) -> Option<(usize, usize)> {
		let idx = self.windows.partition_point(|w| w.range().end <= pos);
		let window = self.windows.get(idx)?;
		window
			.range()
			.contains(pos)
			.then(|| (idx, pos - window.start))
	}

	fn covers_contiguously(&self, lo: Position, hi: Position) -> bool {
		let Some((mut idx, _)) = self.locate(lo) else {
			return false;
		};
		loop {
			let end = self.windows[idx].range().end;
			if hi < end {
				return true;
			}
			match self.windows.get(idx + 1) {
				Some(next) if next.start == end => idx += 1,
				_ => return false,
			}
		}
	}

	fn validate_move(&self, from: Position, to: Position) -> Result<(), ReorderError> {
		let (src, _) = self
			.locate(from)
			.ok_or(ReorderError::PositionNotFound(from))?;
		let (dst, _) = self.locate(to).ok_or(ReorderError::PositionNotFound(to))?;
		let direction = if to < from {
			CascadeDirection::Up
		} else {
			CascadeDirection::Down
		};
		for w in src.min(dst)..src.max(dst) {
			if self.windows[w].range().end != self.windows[w + 1].start {
				let window = match direction {
					CascadeDirection::Up => w + 1,
					CascadeDirection::Down => w,
				};
				return Err(ReorderError::EdgeRecordMissing { window, direction });
			}
		}
		Ok(())
	}

	/// Moves a record between positions, cascading across window boundaries.
	///
	/// Must only run after [`Self::validate_move`] succeeded.
	fn cascade_move(&mut self, from: Position, to: Position) {
		let Some((src, src_offset)) = self.locate(from) else {
			return;
		};
		let Some((dst, dst_offset)) = self.locate(to) else {
			return;
		};

		let moved = self.windows[src].records.remove(src_offset);
		if dst < src {
			for w in (dst + 1..=src).rev() {
				if let Some(carry) = self.windows[w - 1].records.pop() {
					self.windows[w].records.insert(0, carry);
				}
			}
		} else {
			for w in src..dst {
				if !self.windows[w + 1].records.is_empty() {
					let carry = self.windows[w + 1].records.remove(0);
					self.windows[w].records.push(carry);
				}
			}
		}
		self.windows[dst].records.insert(dst_offset, moved);

		for window in &mut self.windows[src.min(dst)..=src.max(dst)] {
			window.renumber();
		}
	}

	fn swap_records(&mut self, a: Position, b: Position) {
		let (Some((wa, oa)), Some((wb, ob))) = (self.locate(a), self.locate(b)) else {
			return;
		};
		if wa == wb {
			self.windows[wa].records.swap(oa, ob);
		} else {
			let (lo, hi) = if wa < wb { ((wa, oa), (wb, ob)) } else { ((wb, ob), (wa, oa)) };
			let (left, right) = self.windows.split_at_mut(hi.0);
			std::mem::swap(&mut left[lo.0].records[lo.1], &mut right[0].records[hi.1]);
		}
		self.windows[wa].records[oa].position = a;
		self.windows[wb].records[ob].position = b;
	}
}

impl Reorder for WindowSet {
	fn validate(&self, action: &Action) -> Result<(), ReorderError> {
		let mounted = |pos| {
			self.locate(pos)
				.map(|_| ())
				.ok_or(ReorderError::PositionNotFound(pos))
		};
		match *action {
			Action::Toggle(pos) => mounted(pos),
			Action::Swap(a, b) => {
				mounted(a)?;
				mounted(b)
			}
			Action::Move(from, to) => self.validate_move(from, to),
		}
	}

	fn apply(&mut self, action: &Action) -> Result<(), ReorderError> {
		self.validate(action)?;
		match *action {
			Action::Toggle(pos) => {
				if let Some((w, offset)) = self.locate(pos) {
					let record = &mut self.windows[w].records[offset];
					record.checked = !record.checked;
				}
			}
			Action::Swap(a, b) => {
				if a != b {
					self.swap_records(a, b);
				}
			}
			Action::Move(from, to) => {
				if from != to {
					self.cascade_move(from, to);
				}
			}
		}
		Ok(())
	}
}
