//! Change-notification broker for long-polling clients.
//!
//! # Purpose
//!
//! - Fan out every committed action batch to all connected clients except the one that produced it.
//! - Tolerate clients that are between polls by buffering their notifications until they poll again.
//! - Forget clients that stop polling once a grace period has passed.
//! - Exclude timers and I/O: [`ChangeBroker`] is a synchronous state machine; the runtime in
//!   [`crate::service`] schedules the [`EvictionTimer`]s it returns and holds polls open.
//!
//! # Mental model
//!
//! - Each [`ClientId`] has at most one subscription.
//! - A subscription is either `Active` (a poll is parked with a [`PollHandler`]) or `Evicting`
//!   (no poll is parked; notifications accumulate in `pending` until the deadline).
//! - A poll round ends on delivery, on hold timeout, or when the client goes away. Every ending
//!   moves the subscription to `Evicting` and arms a fresh timer.
//! - A client that polls again before the deadline gets its buffer flushed at once.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`ChangeBroker`] | Subscription table | MUST be owned by exactly one task | `ChangeBroker::*` |
//! | [`PollTicket`] | Identity of one poll round | MUST be unique per broker | `ChangeBroker::subscribe` |
//! | [`EvictionTimer`] | Deadline the runtime must schedule | MUST be checked by generation on fire | `ChangeBroker::subscribe`, `ChangeBroker::unsubscribe`, `ChangeBroker::notify` |
//! | [`NotifyReport`] | Outcome of one fan-out | Timers MUST all be scheduled | `ChangeBroker::notify` |
//! | [`BrokerConfig`] | Grace period and poll hold | None | `BrokerConfig::default` |
//!
//! # Invariants
//!
//! 1. Notifications MUST NOT be delivered to their origin client.
//!    - Enforced in: `ChangeBroker::notify`
//!    - Tested by: `core::tests::notify_skips_origin`
//!
//! 2. Actions for one destination MUST be observed in notify order, whether delivered or buffered.
//!    - Enforced in: `ChangeBroker::notify`, `ChangeBroker::subscribe`
//!    - Tested by: `core::tests::buffered_batches_flush_in_order`
//!
//! 3. A stale eviction timer MUST NOT drop a subscription that was re-armed or resumed.
//!    - Enforced in: `ChangeBroker::evict`
//!    - Tested by: `core::tests::eviction::stale_generation_is_ignored`
//!
//! 4. Closing a replaced poll MUST NOT detach the poll that replaced it.
//!    - Enforced in: `ChangeBroker::unsubscribe`
//!    - Tested by: `core::tests::late_unsubscribe_of_replaced_poll_is_ignored`
//!
//! 5. A handler whose receiver is gone MUST be treated as absent; its batch is buffered.
//!    - Enforced in: `ChangeBroker::notify`, `ChangeBroker::subscribe`
//!    - Tested by: `core::tests::dead_handler_buffers_instead`
//!
//! # Lifecycle
//!
//! - Subscribe: creates the subscription on first poll, cancels any armed timer, flushes the buffer.
//! - Unsubscribe: the poll ended without delivery; arms the eviction timer.
//! - Evict: the timer fired with a current generation; the subscription and its buffer are dropped.
//! - A notify for a client that has been evicted is a silent no-op.

mod subscription;

use std::collections::HashMap;
use std::time::Duration;

use roster_proto::{Action, ClientId};
pub use subscription::{EvictionTimer, PollHandler, PollTicket};
use subscription::Subscription;
use tokio::time::Instant;

/// Configuration for the change broker.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
	/// How long a subscription survives without a parked poll.
	/// Defaults to 5 seconds.
	pub eviction_grace: Duration,
	/// Longest time a poll is held open before completing empty.
	/// Defaults to 60 seconds.
	pub poll_hold: Duration,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			eviction_grace: Duration::from_secs(5),
			poll_hold: Duration::from_secs(60),
		}
	}
}

/// Result of [`ChangeBroker::subscribe`].
#[derive(Debug)]
#[must_use]
pub struct Subscribed {
	/// Ticket identifying this poll round.
	pub ticket: PollTicket,
	/// Set when buffered actions were delivered at once, ending the round.
	pub timer: Option<EvictionTimer>,
}

/// Result of [`ChangeBroker::notify`].
#[derive(Debug, Default)]
#[must_use]
pub struct NotifyReport {
	/// Clients whose parked poll received the batch.
	pub delivered: usize,
	/// Clients that had the batch appended to their buffer.
	pub buffered: usize,
	/// Timers armed by completed poll rounds.
	pub timers: Vec<EvictionTimer>,
}

/// Subscription table for long-polling clients.
#[derive(Debug)]
pub struct ChangeBroker {
	config: BrokerConfig,
	subscriptions: HashMap<ClientId, Subscription>,
	next_generation: u64,
	next_ticket: u64,
}

impl ChangeBroker {
	/// Creates an empty broker.
	pub fn new(config: BrokerConfig) -> Self {
		Self {
			config,
			subscriptions: HashMap::new(),
			next_generation: 0,
			next_ticket: 0,
		}
	}

	/// Parks a poll for `client`.
	///
	/// Any armed eviction timer is invalidated. If actions were buffered they
	/// are handed to `handler` at once and the round ends immediately. A poll
	/// already parked for `client` is replaced; its handler is dropped.
	pub fn subscribe(&mut self, client: ClientId, handler: PollHandler) -> Subscribed {
		self.next_ticket += 1;
		let ticket = PollTicket(self.next_ticket);

		let pending = match self.subscriptions.remove(&client) {
			Some(Subscription::Evicting { pending, .. }) => pending,
			Some(Subscription::Active { poll, .. }) => {
				tracing::debug!(%client, replaced = poll.0, "poll replaced");
				Vec::new()
			}
			None => {
				tracing::debug!(%client, "subscription created");
				Vec::new()
			}
		};

		if pending.is_empty() {
			self.subscriptions.insert(
				client,
				Subscription::Active {
					handler,
					poll: ticket,
				},
			);
			return Subscribed {
				ticket,
				timer: None,
			};
		}

		let count = pending.len();
		let pending = match handler.send(pending) {
			Ok(()) => {
				tracing::debug!(%client, actions = count, "flushed buffered actions");
				Vec::new()
			}
			Err(returned) => returned,
		};
		Subscribed {
			ticket,
			timer: Some(self.arm(client, pending)),
		}
	}

	/// Ends the poll round `ticket` without delivery and arms eviction.
	///
	/// Ignored when `ticket` is not the currently parked poll: the round has
	/// already completed or a newer poll replaced it.
	pub fn unsubscribe(&mut self, client: ClientId, ticket: PollTicket) -> Option<EvictionTimer> {
		match self.subscriptions.get(&client) {
			Some(Subscription::Active { poll, .. }) if *poll == ticket => {}
			_ => return None,
		}
		tracing::trace!(%client, poll = ticket.0, "poll closed");
		Some(self.arm(client, Vec::new()))
	}

	/// Fans `actions` out to every subscription except `origin`.
	pub fn notify(&mut self, origin: ClientId, actions: &[Action]) -> NotifyReport {
		let targets: Vec<ClientId> = self
			.subscriptions
			.keys()
			.filter(|id| **id != origin)
			.copied()
			.collect();

		let mut report = NotifyReport::default();
		for client in targets {
			let Some(subscription) = self.subscriptions.remove(&client) else {
				continue;
			};
			match subscription {
				Subscription::Active { handler, .. } => {
					let pending = match handler.send(actions.to_vec()) {
						Ok(()) => {
							report.delivered += 1;
							Vec::new()
						}
						Err(returned) => {
							tracing::debug!(%client, "poll receiver gone, buffering");
							report.buffered += 1;
							returned
						}
					};
					report.timers.push(self.arm(client, pending));
				}
				Subscription::Evicting {
					mut pending,
					generation,
					deadline,
				} => {
					pending.extend_from_slice(actions);
					report.buffered += 1;
					self.subscriptions.insert(
						client,
						Subscription::Evicting {
							pending,
							generation,
							deadline,
						},
					);
				}
			}
		}
		report
	}

	/// Drops the subscription of `client` if `generation` is still current.
	///
	/// Returns true when the subscription was removed.
	pub fn evict(&mut self, client: ClientId, generation: u64) -> bool {
		let current = matches!(
			self.subscriptions.get(&client),
			Some(Subscription::Evicting { generation: armed, .. }) if *armed == generation
		);
		if current {
			if let Some(dropped) = self.subscriptions.remove(&client) {
				tracing::debug!(%client, lost = dropped.pending().len(), "subscription evicted");
			}
		} else {
			tracing::trace!(%client, generation, "stale eviction ignored");
		}
		current
	}

	/// Returns true when `client` has a subscription in any state.
	pub fn is_subscribed(&self, client: ClientId) -> bool {
		self.subscriptions.contains_key(&client)
	}

	/// Returns true when `client` has a poll parked.
	pub fn is_polling(&self, client: ClientId) -> bool {
		matches!(
			self.subscriptions.get(&client),
			Some(Subscription::Active { .. })
		)
	}

	/// Actions buffered for `client`, if subscribed.
	pub fn pending(&self, client: ClientId) -> Option<&[Action]> {
		self.subscriptions.get(&client).map(Subscription::pending)
	}

	/// Number of live subscriptions.
	pub fn len(&self) -> usize {
		self.subscriptions.len()
	}

	/// Returns true when nobody is subscribed.
	pub fn is_empty(&self) -> bool {
		self.subscriptions.is_empty()
	}

	fn arm(&mut self, client: ClientId, pending: Vec<Action>) -> EvictionTimer {
		self.next_generation += 1;
		let generation = self.next_generation;
		let deadline = Instant::now() + self.config.eviction_grace;
		self.subscriptions.insert(
			client,
			Subscription::Evicting {
				pending,
				generation,
				deadline,
			},
		);
		EvictionTimer {
			client,
			generation,
			deadline,
		}
	}
}
