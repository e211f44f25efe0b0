//! Client synchronisation settings.

use std::time::Duration;

/// Timing configuration for a [`SyncController`](crate::SyncController).
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
	/// Quiet period after the last local edit before the batch is sent.
	/// Defaults to 1 second.
	pub debounce: Duration,
	/// First retry delay after a failed long poll. Defaults to 1 second.
	pub poll_backoff: Duration,
	/// Upper bound for the doubling poll retry delay. Defaults to 30 seconds.
	pub poll_backoff_max: Duration,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			debounce: Duration::from_secs(1),
			poll_backoff: Duration::from_secs(1),
			poll_backoff_max: Duration::from_secs(30),
		}
	}
}
