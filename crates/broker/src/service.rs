//! Collection service actor.
//!
//! A single task owns the authoritative [`OrderedCollection`] and the
//! [`ChangeBroker`]. Every mutation, poll and read is a command on its
//! channel, so no two operations ever interleave.

use roster_engine::{OrderedCollection, Reorder};
use roster_proto::{Action, ClientId, ErrorCode, Record, WindowRange};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::core::{BrokerConfig, ChangeBroker, EvictionTimer, PollHandler, PollTicket};

/// Commands for the collection service actor.
#[derive(Debug)]
pub enum CollectionCmd {
	/// Apply a batch atomically and broadcast it.
	Submit {
		/// Submitting client, excluded from the broadcast.
		client: ClientId,
		/// Actions in application order.
		actions: Vec<Action>,
		/// Reply channel for the outcome.
		reply: oneshot::Sender<Result<(), ErrorCode>>,
	},
	/// Park a long poll.
	Subscribe {
		/// Polling client.
		client: ClientId,
		/// Delivery target.
		handler: PollHandler,
		/// Reply channel for the poll ticket.
		reply: oneshot::Sender<PollTicket>,
	},
	/// A poll round ended without delivery.
	Unsubscribe {
		/// Polling client.
		client: ClientId,
		/// Round being closed.
		ticket: PollTicket,
	},
	/// Read a window of records.
	Read {
		/// Requested range, or the first window.
		range: Option<WindowRange>,
		/// Optional display-field filter.
		search: Option<String>,
		/// Reply channel for the records.
		reply: oneshot::Sender<Result<Vec<Record>, ErrorCode>>,
	},
	/// An eviction timer fired.
	Evict {
		/// Subscription owner.
		client: ClientId,
		/// Generation the timer was armed with.
		generation: u64,
	},
}

/// Cloneable handle to the collection service.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
	tx: mpsc::Sender<CollectionCmd>,
	config: BrokerConfig,
}

impl CollectionHandle {
	/// Applies `actions` in order, then notifies every other client.
	///
	/// # Errors
	///
	/// Returns the engine's error code if any action is invalid; nothing is
	/// applied or broadcast in that case.
	pub async fn submit(&self, client: ClientId, actions: Vec<Action>) -> Result<(), ErrorCode> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(CollectionCmd::Submit {
				client,
				actions,
				reply,
			})
			.await
			.map_err(|_| ErrorCode::Internal)?;
		rx.await.map_err(|_| ErrorCode::Internal)?
	}

	/// Long-polls for actions committed by other clients.
	///
	/// Completes with the delivered actions, or empty once the poll hold
	/// elapses. Dropping the future before completion closes the round.
	///
	/// # Errors
	///
	/// Returns [`ErrorCode::Internal`] if the service has stopped.
	pub async fn poll(&self, client: ClientId) -> Result<Vec<Action>, ErrorCode> {
		let (handler, mut delivery) = oneshot::channel();
		let (reply, ticket_rx) = oneshot::channel();
		self.tx
			.send(CollectionCmd::Subscribe {
				client,
				handler,
				reply,
			})
			.await
			.map_err(|_| ErrorCode::Internal)?;
		let ticket = ticket_rx.await.map_err(|_| ErrorCode::Internal)?;

		let mut guard = PollGuard {
			tx: self.tx.clone(),
			client,
			ticket: Some(ticket),
		};

		match tokio::time::timeout(self.config.poll_hold, &mut delivery).await {
			Ok(Ok(actions)) => {
				guard.disarm();
				Ok(actions)
			}
			// Handler dropped: a newer poll from the same client replaced this one.
			Ok(Err(_)) => {
				guard.disarm();
				Ok(Vec::new())
			}
			Err(_) => {
				delivery.close();
				match delivery.try_recv() {
					Ok(actions) => {
						guard.disarm();
						Ok(actions)
					}
					Err(_) => Ok(Vec::new()),
				}
			}
		}
	}

	/// Reads a window of records.
	///
	/// # Errors
	///
	/// Returns [`ErrorCode::InvalidRange`] for a range with `start > end`.
	pub async fn read(
		&self,
		range: Option<WindowRange>,
		search: Option<String>,
	) -> Result<Vec<Record>, ErrorCode> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(CollectionCmd::Read {
				range,
				search,
				reply,
			})
			.await
			.map_err(|_| ErrorCode::Internal)?;
		rx.await.map_err(|_| ErrorCode::Internal)?
	}
}

/// Closes a poll round that ended without delivery.
struct PollGuard {
	tx: mpsc::Sender<CollectionCmd>,
	client: ClientId,
	ticket: Option<PollTicket>,
}

impl PollGuard {
	fn disarm(&mut self) {
		self.ticket = None;
	}
}

impl Drop for PollGuard {
	fn drop(&mut self) {
		if let Some(ticket) = self.ticket.take() {
			let cmd = CollectionCmd::Unsubscribe {
				client: self.client,
				ticket,
			};
			match self.tx.try_send(cmd) {
				Ok(()) | Err(TrySendError::Closed(_)) => {}
				Err(TrySendError::Full(cmd)) => match Handle::try_current() {
					Ok(runtime) => {
						let tx = self.tx.clone();
						runtime.spawn(async move {
							let _ = tx.send(cmd).await;
						});
					}
					Err(_) => {
						tracing::debug!(client = %self.client, "no runtime to close poll round");
					}
				},
			}
		}
	}
}

/// Actor owning the collection and its subscribers.
pub struct CollectionService {
	rx: mpsc::Receiver<CollectionCmd>,
	timers: mpsc::WeakSender<CollectionCmd>,
	collection: OrderedCollection,
	broker: ChangeBroker,
}

impl CollectionService {
	/// Spawns the service and returns its handle.
	///
	/// The service stops once every handle is dropped.
	pub fn start(collection: OrderedCollection, config: BrokerConfig) -> CollectionHandle {
		let (tx, rx) = mpsc::channel(256);
		let service = Self {
			rx,
			timers: tx.downgrade(),
			collection,
			broker: ChangeBroker::new(config),
		};
		tokio::spawn(service.run());
		CollectionHandle { tx, config }
	}

	async fn run(mut self) {
		tracing::debug!(records = self.collection.len(), "collection service started");
		while let Some(cmd) = self.rx.recv().await {
			match cmd {
				CollectionCmd::Submit {
					client,
					actions,
					reply,
				} => {
					let result = self.handle_submit(client, &actions);
					let _ = reply.send(result);
				}
				CollectionCmd::Subscribe {
					client,
					handler,
					reply,
				} => {
					let subscribed = self.broker.subscribe(client, handler);
					if let Some(timer) = subscribed.timer {
						self.schedule(timer);
					}
					let _ = reply.send(subscribed.ticket);
				}
				CollectionCmd::Unsubscribe { client, ticket } => {
					if let Some(timer) = self.broker.unsubscribe(client, ticket) {
						self.schedule(timer);
					}
				}
				CollectionCmd::Read {
					range,
					search,
					reply,
				} => {
					let result = self
						.collection
						.read(range, search.as_deref())
						.map_err(ErrorCode::from);
					let _ = reply.send(result);
				}
				CollectionCmd::Evict { client, generation } => {
					self.broker.evict(client, generation);
				}
			}
		}
		tracing::debug!("collection service stopped");
	}

	fn handle_submit(&mut self, client: ClientId, actions: &[Action]) -> Result<(), ErrorCode> {
		if let Err(err) = self.collection.apply_batch(actions) {
			tracing::warn!(%client, actions = actions.len(), error = %err, "batch rejected");
			return Err(err.into());
		}
		if actions.is_empty() {
			return Ok(());
		}

		let report = self.broker.notify(client, actions);
		tracing::debug!(
			%client,
			actions = actions.len(),
			delivered = report.delivered,
			buffered = report.buffered,
			"batch applied"
		);
		for timer in report.timers {
			self.schedule(timer);
		}
		Ok(())
	}

	fn schedule(&self, timer: EvictionTimer) {
		let tx = self.timers.clone();
		tracing::trace!(client = %timer.client, generation = timer.generation, "eviction armed");
		tokio::spawn(async move {
			tokio::time::sleep_until(timer.deadline).await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx
					.send(CollectionCmd::Evict {
						client: timer.client,
						generation: timer.generation,
					})
					.await;
			}
		});
	}
}
