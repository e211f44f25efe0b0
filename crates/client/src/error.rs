//! Client error types.

use roster_engine::ReorderError;
use roster_proto::{ErrorCode, FrameError};
use thiserror::Error;

/// Errors from talking to the collection server.
#[derive(Debug, Error)]
pub enum TransportError {
	/// Could not open a connection.
	#[error("connect failed: {0}")]
	Connect(#[source] std::io::Error),

	/// Frame encoding, decoding or stream failure.
	#[error(transparent)]
	Frame(#[from] FrameError),

	/// The server answered with an error code.
	#[error("server rejected request: {0}")]
	Remote(ErrorCode),

	/// The server answered with a payload of the wrong kind.
	#[error("unexpected response payload")]
	UnexpectedResponse,
}

/// Errors surfaced by a [`SyncHandle`](crate::SyncHandle).
#[derive(Debug, Error)]
pub enum SyncError {
	/// The action does not apply to the local mirror.
	#[error(transparent)]
	Reorder(#[from] ReorderError),

	/// A batch could not be committed; the mirror was rolled back.
	#[error("submission failed: {0}")]
	SubmissionFailed(#[source] TransportError),

	/// Reading a window from the server failed.
	#[error("window read failed: {0}")]
	ReadFailed(#[source] TransportError),

	/// The controller has shut down.
	#[error("sync controller closed")]
	Closed,
}
