//! Client-side reconciliation state machine.
//!
//! [`SyncSession`] owns the windowed mirror and every bit of bookkeeping
//! needed to apply edits optimistically, send them in batches and undo them
//! when a batch fails. It performs no I/O: the controller drives it and
//! performs refetches when [`SyncSession::needs_refetch`] says so.
//!
//! Local edits pass through three stages: `pending` (applied to the mirror,
//! not sent), in flight (sent, awaiting the outcome) and confirmed. Foreign
//! batches arriving while a batch is in flight are deferred until it
//! resolves, so a remote move never lands on positions that still reflect
//! an unconfirmed edit.
//!
//! A failed batch is undone by inverse replay: queued edits are unwound,
//! then the failed batch, then the queued edits are reapplied. That is only
//! exact if no foreign action touched the same positions in the meantime, so
//! foreign actions applied while local edits were queued are remembered. If
//! one overlaps, or an inverse no longer applies, the session asks for a
//! refetch instead.

use roster_engine::{Coverage, Reorder, ReorderError, Window, WindowSet, invert, overlaps};
use roster_proto::{Action, Position, Record};

use crate::status::SyncStatus;

/// Optimistic mirror plus pending, in-flight and deferred batches.
#[derive(Debug, Default)]
pub struct SyncSession {
	mirror: WindowSet,
	pending: Vec<Action>,
	inflight: Option<Vec<Action>>,
	deferred: Vec<Vec<Action>>,
	foreign_seen: Vec<Action>,
	status: SyncStatus,
	needs_refetch: bool,
	ignored_foreign: usize,
}

impl SyncSession {
	/// Creates a session with nothing mounted.
	pub fn new() -> Self {
		Self::default()
	}

	/// The local mirror.
	pub fn mirror(&self) -> &WindowSet {
		&self.mirror
	}

	/// Current status.
	pub fn status(&self) -> SyncStatus {
		self.status
	}

	/// Edits applied locally but not yet sent.
	pub fn pending(&self) -> &[Action] {
		&self.pending
	}

	/// Returns true while a batch awaits its outcome.
	pub fn is_inflight(&self) -> bool {
		self.inflight.is_some()
	}

	/// Returns true when the mirror can no longer be trusted and every
	/// mounted window must be read again.
	pub fn needs_refetch(&self) -> bool {
		self.needs_refetch
	}

	/// Mounts a freshly read window.
	///
	/// # Errors
	///
	/// Returns [`ReorderError::WindowOverlap`] if it overlaps a mounted window.
	pub fn mount(&mut self, start: Position, records: Vec<Record>) -> Result<(), ReorderError> {
		self.mirror.mount(Window::new(start, records))
	}

	/// Unmounts the window starting at `start`.
	pub fn unmount(&mut self, start: Position) -> bool {
		self.mirror.unmount(start).is_some()
	}

	/// Applies a user edit to the mirror and queues it for sending.
	///
	/// # Errors
	///
	/// Returns the engine error if the edit does not apply; nothing is queued.
	pub fn local(&mut self, action: Action) -> Result<(), ReorderError> {
		self.mirror.apply(&action)?;
		self.pending.push(action);
		if self.inflight.is_none() {
			self.status = SyncStatus::Debouncing;
		}
		Ok(())
	}

	/// Moves every queued edit in flight and returns the batch to send.
	///
	/// Returns None when nothing is queued or a batch is already in flight.
	pub fn take_batch(&mut self) -> Option<Vec<Action>> {
		if self.inflight.is_some() || self.pending.is_empty() {
			return None;
		}
		let batch = std::mem::take(&mut self.pending);
		self.inflight = Some(batch.clone());
		self.status = SyncStatus::Sending;
		Some(batch)
	}

	/// The in-flight batch was committed by the server.
	pub fn on_sent_ok(&mut self) {
		if self.inflight.take().is_none() {
			return;
		}
		self.status = if self.pending.is_empty() {
			SyncStatus::Synced
		} else {
			SyncStatus::Debouncing
		};
		self.settle();
	}

	/// The in-flight batch failed; restores the mirror to its state without it.
	pub fn on_sent_err(&mut self) {
		let Some(failed) = self.inflight.take() else {
			return;
		};
		self.status = SyncStatus::Error;

		let conflicted = self
			.foreign_seen
			.iter()
			.any(|f| failed.iter().chain(&self.pending).any(|a| overlaps(f, a)));

		if conflicted {
			tracing::warn!(actions = failed.len(), "foreign edits overlap failed batch, refetching");
			self.needs_refetch = true;
		} else if let Some(restored) = self.rolled_back(&failed) {
			self.mirror = restored;
		} else {
			tracing::warn!(actions = failed.len(), "inverse replay does not apply, refetching");
			self.needs_refetch = true;
		}
		self.settle();
	}

	/// Handles a batch committed by another client.
	pub fn on_foreign(&mut self, actions: Vec<Action>) {
		if actions.is_empty() {
			return;
		}
		if self.inflight.is_some() {
			self.deferred.push(actions);
		} else {
			self.apply_foreign(&actions);
		}
	}

	/// Replaces the records of one mounted window after a refetch.
	pub fn refresh(&mut self, start: Position, records: Vec<Record>) -> bool {
		self.mirror.refresh(start, records)
	}

	/// Completes a refetch: queued edits are reapplied on top of the fresh
	/// windows.
	///
	/// Edits that reach outside the mounted windows stay queued without
	/// touching the mirror, since the server can still apply them. Only edits
	/// that fail against windows which are fully mounted are dropped.
	pub fn finish_refetch(&mut self) {
		self.needs_refetch = false;
		self.foreign_seen.clear();
		if self.ignored_foreign > 0 {
			tracing::warn!(
				batches = self.ignored_foreign,
				"foreign batches ignored during refetch, mirror reflects their server state"
			);
			self.ignored_foreign = 0;
		}
		let mut kept = Vec::with_capacity(self.pending.len());
		for action in std::mem::take(&mut self.pending) {
			if self.mirror.coverage(&action) != Coverage::Full {
				tracing::debug!(%action, "queued edit outside mounted windows, keeping it unapplied");
				kept.push(action);
				continue;
			}
			match self.mirror.apply(&action) {
				Ok(()) => kept.push(action),
				Err(err) => tracing::warn!(%action, error = %err, "dropping queued edit after refetch"),
			}
		}
		self.pending = kept;
		if self.pending.is_empty() && self.status == SyncStatus::Debouncing {
			self.status = SyncStatus::Synced;
		}
	}

	/// Runs queued foreign batches once nothing is in flight.
	fn settle(&mut self) {
		if self.pending.is_empty() && self.inflight.is_none() {
			self.foreign_seen.clear();
		}
		for batch in std::mem::take(&mut self.deferred) {
			self.apply_foreign(&batch);
		}
	}

	fn apply_foreign(&mut self, actions: &[Action]) {
		if self.needs_refetch {
			tracing::debug!(actions = actions.len(), "foreign batch arrived while refetch is pending");
			self.ignored_foreign += 1;
			return;
		}
		for action in actions {
			if self.needs_refetch {
				return;
			}
			match self.mirror.coverage(action) {
				Coverage::Outside => continue,
				Coverage::Partial => {
					tracing::debug!(%action, "foreign action straddles mounted windows, refetching");
					self.needs_refetch = true;
				}
				Coverage::Full => {
					if let Err(err) = self.mirror.apply(action) {
						tracing::warn!(%action, error = %err, "foreign action does not apply, refetching");
						self.needs_refetch = true;
					}
				}
			}
			if !self.pending.is_empty() {
				self.foreign_seen.push(*action);
			}
		}
	}

	/// Mirror with queued edits unwound, `failed` undone and the queued
	/// edits replayed. None if any step does not apply.
	///
	/// Actions entirely outside the mounted windows never touched the mirror
	/// and are skipped in both directions.
	fn rolled_back(&self, failed: &[Action]) -> Option<WindowSet> {
		let mut mirror = self.mirror.clone();
		let mounted = |action: &&Action| mirror.coverage(action) != Coverage::Outside;
		let replay: Vec<Action> = self.pending.iter().filter(mounted).copied().collect();
		let undo: Vec<Action> = replay
			.iter()
			.rev()
			.chain(failed.iter().rev().filter(mounted))
			.map(invert)
			.collect();
		mirror.apply_batch(&undo).ok()?;
		mirror.apply_batch(&replay).ok()?;
		Some(mirror)
	}
}

#[cfg(test)]
mod tests;
