//! Data model and wire types for the roster collection service.
//!
//! This module defines the records that make up the shared ordered collection,
//! the [`Action`] mutations replicated between clients, and the request and
//! response frames exchanged between clients and the collection server.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dense zero-based rank of a record within the authoritative collection.
pub type Position = usize;

/// Stable identity of a record. Never changes, unlike its [`Position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Identity of one connected client (one browser tab or process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
	/// Generates a fresh random client identity.
	#[must_use]
	pub fn random() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// One record of the shared collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
	/// Stable identity.
	pub id: RecordId,
	/// Current dense position, reassigned by every structural mutation.
	pub position: Position,
	/// Toggle state flipped by [`Action::Toggle`].
	pub checked: bool,
	/// Opaque display payload. Never inspected by reordering.
	#[serde(default)]
	pub fields: serde_json::Value,
}

impl Record {
	/// Creates an unchecked record with an empty payload.
	#[must_use]
	pub fn new(id: RecordId, position: Position) -> Self {
		Self {
			id,
			position,
			checked: false,
			fields: serde_json::Value::Null,
		}
	}

	/// Attaches a display payload.
	#[must_use]
	pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
		self.fields = fields;
		self
	}
}

/// A single replicated mutation of the ordered collection.
///
/// Serialized adjacently tagged, e.g. `{"type":"move","payload":[7,2]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Action {
	/// Flip `checked` on the record at a position.
	Toggle(Position),
	/// Exchange the records at two positions.
	Swap(Position, Position),
	/// Remove the record at the first position and reinsert it at the second.
	Move(Position, Position),
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Toggle(pos) => write!(f, "toggle({pos})"),
			Self::Swap(a, b) => write!(f, "swap({a}, {b})"),
			Self::Move(from, to) => write!(f, "move({from} -> {to})"),
		}
	}
}

/// Half-open `[start, end)` range of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowRange {
	/// First position included.
	pub start: Position,
	/// First position excluded.
	pub end: Position,
}

impl WindowRange {
	/// Creates a range covering `[start, end)`.
	#[must_use]
	pub const fn new(start: Position, end: Position) -> Self {
		Self { start, end }
	}

	/// Number of positions covered. Zero for inverted ranges.
	#[must_use]
	pub const fn len(&self) -> usize {
		self.end.saturating_sub(self.start)
	}

	/// Returns true when the range covers no positions.
	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns true when `pos` lies inside the range.
	#[must_use]
	pub const fn contains(&self, pos: Position) -> bool {
		self.start <= pos && pos < self.end
	}
}

/// Request frame sent by a client. One request per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
	/// Long poll for actions committed by other clients.
	Poll {
		/// The polling client.
		client_id: ClientId,
	},
	/// Submit an ordered batch of actions for authoritative application.
	Submit {
		/// The submitting client; excluded from the resulting broadcast.
		client_id: ClientId,
		/// Actions, applied in list order.
		actions: Vec<Action>,
	},
	/// Read a window of records.
	Read {
		/// Position range to return; defaults to the first window.
		range: Option<WindowRange>,
		/// Optional case-insensitive filter over string display fields.
		search: Option<String>,
	},
}

/// Successful response payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
	/// Long poll completed. Empty when the hold timeout elapsed.
	Notified {
		/// Actions committed by other clients, in commit order.
		actions: Vec<Action>,
	},
	/// Batch applied and broadcast.
	Submitted,
	/// Records for a read request.
	Window {
		/// Records in position order.
		records: Vec<Record>,
	},
}

/// Response frame sent by the server.
pub type Response = Result<ResponsePayload, ErrorCode>;

/// Error codes for collection protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
	/// Unspecified internal server error.
	Internal,
	/// Request frame could not be decoded.
	InvalidRequest,
	/// Read range has `start > end`.
	InvalidRange,
	/// An action referenced a position that holds no record.
	PositionNotFound,
	/// A windowed move could not borrow a boundary record.
	EdgeRecordMissing,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::Internal => "internal error",
			Self::InvalidRequest => "invalid request",
			Self::InvalidRange => "invalid range format",
			Self::PositionNotFound => "position not found",
			Self::EdgeRecordMissing => "edge record missing",
		};
		f.write_str(text)
	}
}

impl std::error::Error for ErrorCode {}
