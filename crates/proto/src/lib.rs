//! Shared data model and wire protocol for the roster collection service.
//!
//! Clients and the collection server exchange one [`Request`] and one
//! [`Response`] per connection, encoded with the [`frame`] codec.
#![warn(missing_docs)]

pub mod frame;
pub mod types;

pub use frame::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use types::{
	Action, ClientId, ErrorCode, Position, Record, RecordId, Request, Response, ResponsePayload,
	WindowRange,
};

/// Number of records returned by a read that names no range.
pub const DEFAULT_WINDOW_LEN: usize = 20;
