//! Sync status indicator.

use std::fmt;

/// Where local edits stand relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
	/// Nothing pending or in flight.
	#[default]
	Synced,
	/// Edits are queued and the debounce timer is armed.
	Debouncing,
	/// A batch is in flight.
	Sending,
	/// The last batch failed and was rolled back.
	Error,
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Synced => "SYNCED",
			Self::Debouncing => "WAITING",
			Self::Sending => "PENDING",
			Self::Error => "ERROR",
		})
	}
}
