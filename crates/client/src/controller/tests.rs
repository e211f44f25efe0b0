use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use roster_engine::{OrderedCollection, Reorder};
use roster_proto::{Action, ClientId, ErrorCode, Record, RecordId, WindowRange};
use tokio::sync::{Notify, mpsc};

use super::{SyncController, SyncHandle};
use crate::config::SyncConfig;
use crate::error::{SyncError, TransportError};
use crate::status::SyncStatus;
use crate::transport::Transport;

/// In-process stand-in for the collection server.
struct MockServer {
	collection: Mutex<OrderedCollection>,
	submits: Mutex<Vec<Vec<Action>>>,
	fail_submits: AtomicBool,
	hold_submits: AtomicBool,
	release: Notify,
	polls: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<Action>>>,
}

impl MockServer {
	fn new(records: u64) -> (Arc<Self>, mpsc::UnboundedSender<Vec<Action>>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let server = Arc::new(Self {
			collection: Mutex::new(OrderedCollection::new(
				(1..=records).map(|id| Record::new(RecordId(id), 0)),
			)),
			submits: Mutex::new(Vec::new()),
			fail_submits: AtomicBool::new(false),
			hold_submits: AtomicBool::new(false),
			release: Notify::new(),
			polls: tokio::sync::Mutex::new(rx),
		});
		(server, tx)
	}

	fn submits(&self) -> Vec<Vec<Action>> {
		self.submits.lock().unwrap().clone()
	}

	/// Commits a batch as if another client had submitted it.
	fn commit_foreign(&self, actions: &[Action], polls: &mpsc::UnboundedSender<Vec<Action>>) {
		self.collection
			.lock()
			.unwrap()
			.apply_batch(actions)
			.unwrap();
		polls.send(actions.to_vec()).unwrap();
	}
}

#[async_trait]
impl Transport for MockServer {
	async fn submit(&self, _: ClientId, actions: Vec<Action>) -> Result<(), TransportError> {
		self.submits.lock().unwrap().push(actions.clone());
		if self.hold_submits.load(Ordering::SeqCst) {
			self.release.notified().await;
		}
		if self.fail_submits.load(Ordering::SeqCst) {
			return Err(TransportError::Remote(ErrorCode::Internal));
		}
		self.collection
			.lock()
			.unwrap()
			.apply_batch(&actions)
			.map_err(|e| TransportError::Remote(e.into()))
	}

	async fn poll(&self, _: ClientId) -> Result<Vec<Action>, TransportError> {
		let mut polls = self.polls.lock().await;
		Ok(polls.recv().await.unwrap_or_default())
	}

	async fn read_window(&self, range: WindowRange) -> Result<Vec<Record>, TransportError> {
		self.collection
			.lock()
			.unwrap()
			.read(Some(range), None)
			.map_err(|e| TransportError::Remote(e.into()))
	}
}

async fn start(server: &Arc<MockServer>, range: WindowRange) -> SyncHandle {
	let handle = SyncController::start(server.clone(), SyncConfig::default());
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

async fn settle() {
	tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn debounce_coalesces_edits_into_one_batch() {
	let (server, _polls) = MockServer::new(4);
	let handle = start(&server, WindowRange::new(0, 4)).await;

	handle.toggle(0).await.unwrap();
	assert_eq!(handle.status(), SyncStatus::Debouncing);

	tokio::time::sleep(Duration::from_millis(600)).await;
	handle.move_record(3, 0).await.unwrap();
	assert_eq!(ids(&handle).await, vec![4, 1, 2, 3]);

	// The second edit restarted the timer.
	tokio::time::sleep(Duration::from_millis(900)).await;
	assert!(server.submits().is_empty());

	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(
		server.submits(),
		vec![vec![Action::Toggle(0), Action::Move(3, 0)]]
	);
	assert_eq!(handle.status(), SyncStatus::Synced);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_submit_rolls_back_and_reports_error() {
	let (server, _polls) = MockServer::new(4);
	server.fail_submits.store(true, Ordering::SeqCst);
	let handle = start(&server, WindowRange::new(0, 4)).await;
	let before = handle.snapshot().await.unwrap();

	handle.toggle(1).await.unwrap();
	handle.swap(0, 2).await.unwrap();
	assert_ne!(handle.snapshot().await.unwrap(), before);

	tokio::time::sleep(Duration::from_millis(1100)).await;
	assert_eq!(handle.status(), SyncStatus::Error);
	assert_eq!(handle.snapshot().await.unwrap(), before);
	assert_eq!(handle.status().to_string(), "ERROR");

	assert!(matches!(
		handle.take_error().await.unwrap(),
		Some(SyncError::SubmissionFailed(TransportError::Remote(
			ErrorCode::Internal
		)))
	));
	assert!(handle.take_error().await.unwrap().is_none());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn foreign_batch_waits_for_inflight_submit() {
	let (server, polls) = MockServer::new(4);
	server.hold_submits.store(true, Ordering::SeqCst);
	let handle = start(&server, WindowRange::new(0, 4)).await;

	handle.toggle(0).await.unwrap();
	tokio::time::sleep(Duration::from_millis(1100)).await;
	assert_eq!(handle.status(), SyncStatus::Sending);

	server.commit_foreign(&[Action::Move(3, 1)], &polls);
	settle().await;
	assert_eq!(ids(&handle).await, vec![1, 2, 3, 4]);

	server.release.notify_one();
	settle().await;
	assert_eq!(ids(&handle).await, vec![1, 4, 2, 3]);
	assert_eq!(handle.status(), SyncStatus::Synced);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_made_while_sending_go_out_next() {
	let (server, _polls) = MockServer::new(4);
	server.hold_submits.store(true, Ordering::SeqCst);
	let handle = start(&server, WindowRange::new(0, 4)).await;

	handle.toggle(0).await.unwrap();
	tokio::time::sleep(Duration::from_millis(1100)).await;
	handle.toggle(1).await.unwrap();
	assert_eq!(handle.status(), SyncStatus::Sending);

	tokio::time::sleep(Duration::from_millis(1100)).await;
	assert_eq!(server.submits().len(), 1);

	server.hold_submits.store(false, Ordering::SeqCst);
	server.release.notify_one();
	settle().await;
	assert_eq!(
		server.submits(),
		vec![vec![Action::Toggle(0)], vec![Action::Toggle(1)]]
	);
	assert_eq!(handle.status(), SyncStatus::Synced);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn straddling_foreign_move_triggers_refetch() {
	let (server, polls) = MockServer::new(6);
	let handle = start(&server, WindowRange::new(0, 3)).await;

	server.commit_foreign(&[Action::Move(5, 1)], &polls);
	settle().await;
	assert_eq!(ids(&handle).await, vec![1, 6, 2]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn foreign_batch_inside_mount_applies_locally() {
	let (server, polls) = MockServer::new(6);
	let handle = start(&server, WindowRange::new(0, 6)).await;

	polls.send(vec![Action::Swap(0, 5), Action::Toggle(2)]).unwrap();
	settle().await;
	let snapshot = handle.snapshot().await.unwrap();
	assert_eq!(
		snapshot.iter().map(|r| r.id.0).collect::<Vec<_>>(),
		vec![6, 2, 3, 4, 5, 1]
	);
	assert!(snapshot[2].checked);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn status_transitions_are_observable() {
	let (server, _polls) = MockServer::new(2);
	let handle = start(&server, WindowRange::new(0, 2)).await;
	let mut status = handle.watch_status();

	handle.toggle(0).await.unwrap();
	status.changed().await.unwrap();
	assert_eq!(*status.borrow_and_update(), SyncStatus::Debouncing);

	status.changed().await.unwrap();
	let seen = *status.borrow_and_update();
	assert!(matches!(seen, SyncStatus::Sending | SyncStatus::Synced));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn invalid_edit_and_overlapping_mount_are_rejected() {
	let (server, _polls) = MockServer::new(6);
	let handle = start(&server, WindowRange::new(0, 3)).await;

	assert!(matches!(
		handle.toggle(4).await,
		Err(SyncError::Reorder(_))
	));
	assert!(matches!(
		handle.mount_window(WindowRange::new(2, 5)).await,
		Err(SyncError::Reorder(_))
	));
	handle.mount_window(WindowRange::new(3, 6)).await.unwrap();
	assert_eq!(ids(&handle).await, vec![1, 2, 3, 4, 5, 6]);

	assert!(handle.unmount_window(0).await.unwrap());
	assert!(!handle.unmount_window(0).await.unwrap());
	assert_eq!(ids(&handle).await, vec![4, 5, 6]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_closes_the_handle() {
	let (server, _polls) = MockServer::new(2);
	let handle = start(&server, WindowRange::new(0, 2)).await;

	handle.shutdown();
	settle().await;
	assert!(matches!(handle.toggle(0).await, Err(SyncError::Closed)));
}
