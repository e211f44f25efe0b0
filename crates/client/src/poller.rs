//! Background long-poll loop.

use std::sync::Arc;
use std::time::Duration;

use roster_proto::{Action, ClientId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::transport::Transport;

/// Re-issues long polls until cancelled, forwarding every non-empty batch.
///
/// Successful and timed-out polls are re-issued immediately. Failed polls
/// are retried after a delay that doubles up to `poll_backoff_max` and
/// resets after the next success.
pub(crate) async fn run(
	transport: Arc<dyn Transport>,
	client: ClientId,
	config: SyncConfig,
	foreign: mpsc::Sender<Vec<Action>>,
	shutdown: CancellationToken,
) {
	let mut backoff = config.poll_backoff;
	loop {
		let result = tokio::select! {
			_ = shutdown.cancelled() => break,
			result = transport.poll(client) => result,
		};

		match result {
			Ok(actions) => {
				backoff = config.poll_backoff;
				if actions.is_empty() {
					continue;
				}
				tracing::debug!(%client, actions = actions.len(), "foreign batch received");
				let sent = tokio::select! {
					_ = shutdown.cancelled() => break,
					sent = foreign.send(actions) => sent,
				};
				if sent.is_err() {
					break;
				}
			}
			Err(err) => {
				tracing::warn!(%client, error = %err, retry_in = ?backoff, "poll failed");
				tokio::select! {
					_ = shutdown.cancelled() => break,
					_ = tokio::time::sleep(backoff) => {}
				}
				backoff = next_backoff(backoff, config.poll_backoff_max);
			}
		}
	}
	tracing::debug!(%client, "poll loop stopped");
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
	current.saturating_mul(2).min(max)
}
