//! Error types for reordering and reads.

use std::fmt;

use roster_proto::{ErrorCode, Position};
use thiserror::Error;

/// Direction a windowed move shifts records in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDirection {
	/// Destination precedes the source; records shift to higher positions.
	Up,
	/// Destination follows the source; records shift to lower positions.
	Down,
}

impl fmt::Display for CascadeDirection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Up => "up",
			Self::Down => "down",
		})
	}
}

/// Errors raised when an action cannot be applied.
///
/// Every variant is reported before any record is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReorderError {
	/// No record occupies the referenced position.
	#[error("no record at position {0}")]
	PositionNotFound(Position),

	/// A cascading move needed a boundary record from a window that is not
	/// mounted next to the borrowing one.
	#[error("window {window} has no adjacent record to borrow while cascading {direction}")]
	EdgeRecordMissing {
		/// Index of the window left without a neighbour.
		window: usize,
		/// Direction of the cascade.
		direction: CascadeDirection,
	},

	/// A mounted window would share positions with another mounted window.
	#[error("window {start}..{end} overlaps a mounted window")]
	WindowOverlap {
		/// First position of the rejected window.
		start: Position,
		/// End (exclusive) of the rejected window.
		end: Position,
	},
}

impl From<ReorderError> for ErrorCode {
	fn from(err: ReorderError) -> Self {
		match err {
			ReorderError::PositionNotFound(_) => Self::PositionNotFound,
			ReorderError::EdgeRecordMissing { .. } => Self::EdgeRecordMissing,
			ReorderError::WindowOverlap { .. } => Self::Internal,
		}
	}
}

/// Errors raised by collection reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
	/// The range starts after it ends.
	#[error("invalid range {start}..{end}")]
	InvalidRange {
		/// Requested start.
		start: Position,
		/// Requested end.
		end: Position,
	},
}

impl From<ReadError> for ErrorCode {
	fn from(err: ReadError) -> Self {
		match err {
			ReadError::InvalidRange { .. } => Self::InvalidRange,
		}
	}
}
