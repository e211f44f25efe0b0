//! Per-client subscription state.

use roster_proto::{Action, ClientId};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Receiving end of a long poll. Completed at most once with the delivered batch.
pub type PollHandler = oneshot::Sender<Vec<Action>>;

/// Identifies one long-poll round. Monotonic across the whole broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollTicket(pub u64);

/// An eviction deadline the runtime must schedule.
///
/// When it fires the runtime calls [`ChangeBroker::evict`](super::ChangeBroker::evict)
/// with the same generation; stale generations are ignored there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionTimer {
	/// Subscription the timer belongs to.
	pub client: ClientId,
	/// Generation the subscription had when the timer was armed.
	pub generation: u64,
	/// Instant at which the subscription is dropped.
	pub deadline: Instant,
}

/// Lifecycle of one client's subscription.
#[derive(Debug)]
pub(crate) enum Subscription {
	/// A poll is waiting; nothing is buffered.
	Active {
		/// Delivery target for the next notification.
		handler: PollHandler,
		/// Ticket of the waiting poll.
		poll: PollTicket,
	},
	/// No poll is waiting; notifications accumulate until the client polls
	/// again or the deadline passes.
	Evicting {
		/// Buffered actions in notify order.
		pending: Vec<Action>,
		/// Generation of the armed eviction timer.
		generation: u64,
		/// When the subscription will be dropped.
		deadline: Instant,
	},
}

impl Subscription {
	pub(crate) fn pending(&self) -> &[Action] {
		match self {
			Self::Active { .. } => &[],
			Self::Evicting { pending, .. } => pending,
		}
	}
}
