//! Two clients and a server on loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use roster_broker::{BrokerConfig, CollectionService};
use roster_client::{SyncConfig, SyncController, SyncHandle, SyncStatus, TcpTransport};
use roster_engine::OrderedCollection;
use roster_proto::{Record, RecordId, WindowRange};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn server(records: u64) -> (std::net::SocketAddr, CancellationToken) {
	let handle = CollectionService::start(
		OrderedCollection::new((1..=records).map(|id| Record::new(RecordId(id), 0))),
		BrokerConfig {
			eviction_grace: Duration::from_secs(5),
			poll_hold: Duration::from_secs(2),
		},
	);
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let shutdown = CancellationToken::new();
	tokio::spawn(roster_broker::ipc::serve(listener, handle, shutdown.clone()));
	(addr, shutdown)
}

fn config() -> SyncConfig {
	SyncConfig {
		debounce: Duration::from_millis(50),
		poll_backoff: Duration::from_millis(50),
		poll_backoff_max: Duration::from_millis(200),
	}
}

async fn client(addr: std::net::SocketAddr, range: WindowRange) -> SyncHandle {
	let handle = SyncController::start(Arc::new(TcpTransport::new(addr)), config());
	handle.mount_window(range).await.unwrap();
	handle
}

async fn ids(handle: &SyncHandle) -> Vec<u64> {
	handle
		.snapshot()
		.await
		.unwrap()
		.iter()
		.map(|r| r.id.0)
		.collect()
}

/// Waits until the mirror of `handle` shows `expected`, for a few seconds at most.
async fn wait_for_ids(handle: &SyncHandle, expected: &[u64]) {
	for _ in 0..100 {
		if ids(handle).await == expected {
			return;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("mirror never reached {expected:?}, last {:?}", ids(handle).await);
}

/// Waits until `handle` reports `status`, for a few seconds at most.
async fn wait_for_status(handle: &SyncHandle, status: SyncStatus) {
	let mut rx = handle.watch_status();
	let reached = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == status)).await;
	assert!(matches!(reached, Ok(Ok(_))), "status never reached {status}");
}

#[tokio::test(flavor = "current_thread")]
async fn edits_converge_between_clients() {
	let (addr, shutdown) = server(6).await;
	let alice = client(addr, WindowRange::new(0, 6)).await;
	let bob = client(addr, WindowRange::new(0, 6)).await;
	// Let both poll loops park before anything is committed.
	tokio::time::sleep(Duration::from_millis(100)).await;

	alice.move_record(5, 0).await.unwrap();
	alice.toggle(0).await.unwrap();
	assert_eq!(ids(&alice).await, vec![6, 1, 2, 3, 4, 5]);

	wait_for_ids(&bob, &[6, 1, 2, 3, 4, 5]).await;
	let bob_view = bob.snapshot().await.unwrap();
	assert!(bob_view[0].checked);
	wait_for_status(&alice, SyncStatus::Synced).await;

	bob.swap(1, 2).await.unwrap();
	wait_for_ids(&alice, &[6, 2, 1, 3, 4, 5]).await;

	alice.shutdown();
	bob.shutdown();
	shutdown.cancel();
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_server_reports_error_and_restores_mirror() {
	let (addr, shutdown) = server(4).await;
	let alice = client(addr, WindowRange::new(0, 4)).await;
	let before = alice.snapshot().await.unwrap();

	shutdown.cancel();
	tokio::time::sleep(Duration::from_millis(50)).await;

	alice.toggle(2).await.unwrap();
	alice.swap(0, 3).await.unwrap();
	wait_for_status(&alice, SyncStatus::Error).await;
	assert_eq!(alice.snapshot().await.unwrap(), before);

	alice.shutdown();
}
