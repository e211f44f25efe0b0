//! Sync controller actor.
//!
//! Owns one [`SyncSession`] and drives it from user edits, the debounce
//! timer, submission outcomes and foreign batches from the poll loop. Only
//! one batch is ever in flight; if the debounce timer expires meanwhile, the
//! next batch goes out as soon as the current one resolves.

use std::sync::Arc;

use roster_proto::{Action, ClientId, Position, Record, WindowRange};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{SyncError, TransportError};
use crate::poller;
use crate::session::SyncSession;
use crate::status::SyncStatus;
use crate::transport::Transport;

/// Commands for the sync controller actor.
#[derive(Debug)]
enum SyncCmd {
	Local {
		action: Action,
		reply: oneshot::Sender<Result<(), SyncError>>,
	},
	Mount {
		range: WindowRange,
		reply: oneshot::Sender<Result<(), SyncError>>,
	},
	Unmount {
		start: Position,
		reply: oneshot::Sender<bool>,
	},
	Snapshot {
		reply: oneshot::Sender<Vec<Record>>,
	},
	TakeError {
		reply: oneshot::Sender<Option<SyncError>>,
	},
	Sent(Result<(), TransportError>),
}

/// Cloneable handle to a running [`SyncController`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
	client: ClientId,
	tx: mpsc::Sender<SyncCmd>,
	status: watch::Receiver<SyncStatus>,
	shutdown: CancellationToken,
}

impl SyncHandle {
	/// Identity this controller polls and submits as.
	pub fn client_id(&self) -> ClientId {
		self.client
	}

	/// Flips `checked` on the record at `pos`.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Reorder`] if `pos` is not mounted.
	pub async fn toggle(&self, pos: Position) -> Result<(), SyncError> {
		self.apply(Action::Toggle(pos)).await
	}

	/// Exchanges the records at `a` and `b`.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Reorder`] if either position is not mounted.
	pub async fn swap(&self, a: Position, b: Position) -> Result<(), SyncError> {
		self.apply(Action::Swap(a, b)).await
	}

	/// Moves the record at `from` to `to`, as produced by a drop gesture.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Reorder`] if the move cannot cascade across the
	/// mounted windows.
	pub async fn move_record(&self, from: Position, to: Position) -> Result<(), SyncError> {
		self.apply(Action::Move(from, to)).await
	}

	/// Applies `action` optimistically and queues it for the next batch.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Reorder`] if the action does not apply locally.
	pub async fn apply(&self, action: Action) -> Result<(), SyncError> {
		self.request(|reply| SyncCmd::Local { action, reply })
			.await?
	}

	/// Reads `range` from the server and mounts it.
	///
	/// # Errors
	///
	/// Returns [`SyncError::ReadFailed`] if the read fails, or
	/// [`SyncError::Reorder`] if the window overlaps a mounted one.
	pub async fn mount_window(&self, range: WindowRange) -> Result<(), SyncError> {
		self.request(|reply| SyncCmd::Mount { range, reply })
			.await?
	}

	/// Unmounts the window starting at `start`. Returns false if none was mounted.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Closed`] after shutdown.
	pub async fn unmount_window(&self, start: Position) -> Result<bool, SyncError> {
		self.request(|reply| SyncCmd::Unmount { start, reply })
			.await
	}

	/// Returns every mounted record in position order.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Closed`] after shutdown.
	pub async fn snapshot(&self) -> Result<Vec<Record>, SyncError> {
		self.request(|reply| SyncCmd::Snapshot { reply }).await
	}

	/// Takes the failure behind the last [`SyncStatus::Error`], if any.
	///
	/// A later successful batch clears it.
	///
	/// # Errors
	///
	/// Returns [`SyncError::Closed`] after shutdown.
	pub async fn take_error(&self) -> Result<Option<SyncError>, SyncError> {
		self.request(|reply| SyncCmd::TakeError { reply }).await
	}

	/// Current sync status.
	pub fn status(&self) -> SyncStatus {
		*self.status.borrow()
	}

	/// Receiver notified on every status transition.
	pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
		self.status.clone()
	}

	/// Stops the controller and its poll loop. Outcomes of a batch still in
	/// flight are discarded.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}

	async fn request<T>(
		&self,
		make: impl FnOnce(oneshot::Sender<T>) -> SyncCmd,
	) -> Result<T, SyncError> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(make(reply))
			.await
			.map_err(|_| SyncError::Closed)?;
		rx.await.map_err(|_| SyncError::Closed)
	}
}

/// Actor reconciling one client's mirror with the server.
pub struct SyncController {
	client: ClientId,
	config: SyncConfig,
	transport: Arc<dyn Transport>,
	session: SyncSession,
	rx: mpsc::Receiver<SyncCmd>,
	results: mpsc::WeakSender<SyncCmd>,
	foreign: mpsc::Receiver<Vec<Action>>,
	status: watch::Sender<SyncStatus>,
	debounce: Option<Instant>,
	last_error: Option<SyncError>,
	shutdown: CancellationToken,
}

impl SyncController {
	/// Spawns a controller with a fresh random client id.
	pub fn start(transport: Arc<dyn Transport>, config: SyncConfig) -> SyncHandle {
		Self::start_with_id(ClientId::random(), transport, config)
	}

	/// Spawns a controller and its poll loop for `client`.
	pub fn start_with_id(
		client: ClientId,
		transport: Arc<dyn Transport>,
		config: SyncConfig,
	) -> SyncHandle {
		let (tx, rx) = mpsc::channel(256);
		let (foreign_tx, foreign_rx) = mpsc::channel(64);
		let (status_tx, status_rx) = watch::channel(SyncStatus::Synced);
		let shutdown = CancellationToken::new();

		tokio::spawn(poller::run(
			transport.clone(),
			client,
			config,
			foreign_tx,
			shutdown.clone(),
		));

		let controller = Self {
			client,
			config,
			transport,
			session: SyncSession::new(),
			rx,
			results: tx.downgrade(),
			foreign: foreign_rx,
			status: status_tx,
			debounce: None,
			last_error: None,
			shutdown: shutdown.clone(),
		};
		tokio::spawn(controller.run());

		SyncHandle {
			client,
			tx,
			status: status_rx,
			shutdown,
		}
	}

	async fn run(mut self) {
		tracing::debug!(client = %self.client, "sync controller started");
		loop {
			let debounce = self.debounce;
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				cmd = self.rx.recv() => {
					let Some(cmd) = cmd else {
						break;
					};
					self.handle(cmd).await;
				}
				Some(batch) = self.foreign.recv() => {
					self.session.on_foreign(batch);
					self.reconcile().await;
				}
				_ = tokio::time::sleep_until(debounce.unwrap_or_else(Instant::now)), if debounce.is_some() => {
					self.debounce = None;
					self.flush();
				}
			}
			self.publish();
		}
		self.shutdown.cancel();
		tracing::debug!(client = %self.client, "sync controller stopped");
	}

	async fn handle(&mut self, cmd: SyncCmd) {
		match cmd {
			SyncCmd::Local { action, reply } => {
				let result = self.session.local(action).map_err(SyncError::from);
				if result.is_ok() {
					self.debounce = Some(Instant::now() + self.config.debounce);
				}
				let _ = reply.send(result);
			}
			SyncCmd::Mount { range, reply } => {
				let result = match self.transport.read_window(range).await {
					Ok(records) => self
						.session
						.mount(range.start, records)
						.map_err(SyncError::from),
					Err(err) => Err(SyncError::ReadFailed(err)),
				};
				let _ = reply.send(result);
			}
			SyncCmd::Unmount { start, reply } => {
				let _ = reply.send(self.session.unmount(start));
			}
			SyncCmd::Snapshot { reply } => {
				let _ = reply.send(self.session.mirror().records().cloned().collect());
			}
			SyncCmd::TakeError { reply } => {
				let _ = reply.send(self.last_error.take());
			}
			SyncCmd::Sent(result) => {
				match result {
					Ok(()) => {
						self.session.on_sent_ok();
						self.last_error = None;
					}
					Err(err) => {
						let err = SyncError::SubmissionFailed(err);
						tracing::warn!(client = %self.client, error = %err, "rolling back");
						self.session.on_sent_err();
						self.last_error = Some(err);
					}
				}
				self.reconcile().await;
				if self.debounce.is_none() {
					self.flush();
				}
			}
		}
	}

	/// Sends the queued batch unless one is already in flight.
	fn flush(&mut self) {
		let Some(batch) = self.session.take_batch() else {
			return;
		};
		tracing::debug!(client = %self.client, actions = batch.len(), "sending batch");

		let transport = self.transport.clone();
		let results = self.results.clone();
		let client = self.client;
		tokio::spawn(async move {
			let result = transport.submit(client, batch).await;
			if let Some(tx) = results.upgrade() {
				let _ = tx.send(SyncCmd::Sent(result)).await;
			}
		});
	}

	/// Rereads every mounted window if the session lost track of the server.
	async fn reconcile(&mut self) {
		if !self.session.needs_refetch() {
			return;
		}
		for range in self.session.mirror().ranges() {
			match self.transport.read_window(range).await {
				Ok(records) => {
					self.session.refresh(range.start, records);
				}
				Err(err) => {
					tracing::warn!(client = %self.client, error = %err, "refetch failed, will retry");
					return;
				}
			}
		}
		self.session.finish_refetch();
		tracing::debug!(client = %self.client, "mirror refetched");
		if !self.foreign.is_empty() {
			// Batches committed while the windows were being read may already
			// be part of them and will still be applied on top.
			tracing::warn!(
				client = %self.client,
				queued = self.foreign.len(),
				"foreign batches queued across refetch"
			);
		}
	}

	fn publish(&self) {
		let current = self.session.status();
		self.status.send_if_modified(|status| {
			if *status == current {
				return false;
			}
			tracing::trace!(client = %self.client, %current, "status changed");
			*status = current;
			true
		});
	}
}

#[cfg(test)]
mod tests;
