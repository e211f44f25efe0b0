use pretty_assertions::assert_eq;
use proptest::prelude::*;
use roster_proto::{Action, Record, RecordId};

use super::SyncSession;
use crate::status::SyncStatus;

fn records(ids: std::ops::RangeInclusive<u64>) -> Vec<Record> {
	ids.map(|id| Record::new(RecordId(id), 0)).collect()
}

/// Session with windows `[0,4)` holding ids 1..=4 and `[4,8)` holding 5..=8.
fn session() -> SyncSession {
	let mut s = SyncSession::new();
	s.mount(0, records(1..=4)).unwrap();
	s.mount(4, records(5..=8)).unwrap();
	s
}

fn snapshot(s: &SyncSession) -> Vec<(u64, usize, bool)> {
	s.mirror()
		.records()
		.map(|r| (r.id.0, r.position, r.checked))
		.collect()
}

fn ids(s: &SyncSession) -> Vec<u64> {
	s.mirror().records().map(|r| r.id.0).collect()
}

#[test]
fn local_edit_applies_immediately_and_queues() {
	let mut s = session();
	s.local(Action::Move(5, 0)).unwrap();
	assert_eq!(ids(&s), vec![6, 1, 2, 3, 4, 5, 7, 8]);
	assert_eq!(s.pending(), &[Action::Move(5, 0)]);
	assert_eq!(s.status(), SyncStatus::Debouncing);
}

#[test]
fn invalid_local_edit_is_not_queued() {
	let mut s = session();
	assert!(s.local(Action::Toggle(40)).is_err());
	assert!(s.pending().is_empty());
	assert_eq!(s.status(), SyncStatus::Synced);
}

#[test]
fn batch_lifecycle_reports_status() {
	let mut s = session();
	s.local(Action::Toggle(1)).unwrap();
	s.local(Action::Swap(0, 7)).unwrap();

	let batch = s.take_batch().unwrap();
	assert_eq!(batch, vec![Action::Toggle(1), Action::Swap(0, 7)]);
	assert_eq!(s.status(), SyncStatus::Sending);
	assert!(s.take_batch().is_none());

	s.on_sent_ok();
	assert_eq!(s.status(), SyncStatus::Synced);
	assert!(!s.is_inflight());
}

#[test]
fn failed_batch_rolls_back_toggle_and_swap() {
	let mut s = session();
	let before = snapshot(&s);

	s.local(Action::Toggle(2)).unwrap();
	s.local(Action::Swap(2, 6)).unwrap();
	let _ = s.take_batch().unwrap();
	s.on_sent_err();

	assert_eq!(snapshot(&s), before);
	assert_eq!(s.status(), SyncStatus::Error);
	assert!(!s.needs_refetch());
}

#[test]
fn failed_batch_keeps_edits_queued_after_it() {
	let mut s = session();
	s.local(Action::Move(0, 6)).unwrap();
	let _ = s.take_batch().unwrap();

	s.local(Action::Toggle(7)).unwrap();
	assert_eq!(s.status(), SyncStatus::Sending);
	s.on_sent_err();

	// Move undone, the toggle queued behind it survives on its own position.
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 5, 6, 7, 8]);
	assert!(s.mirror().get(7).unwrap().checked);
	assert_eq!(s.pending(), &[Action::Toggle(7)]);
}

#[test]
fn foreign_batch_waits_for_inflight_batch() {
	let mut s = session();
	s.local(Action::Toggle(0)).unwrap();
	let _ = s.take_batch().unwrap();

	s.on_foreign(vec![Action::Move(7, 4)]);
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 5, 6, 7, 8]);

	s.on_sent_ok();
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 8, 5, 6, 7]);
}

#[test]
fn foreign_batch_applies_after_failed_rollback() {
	let mut s = session();
	s.local(Action::Move(0, 3)).unwrap();
	let _ = s.take_batch().unwrap();
	s.on_foreign(vec![Action::Swap(0, 1)]);

	s.on_sent_err();
	assert_eq!(ids(&s), vec![2, 1, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn overlapping_foreign_edit_forces_refetch_on_failure() {
	let mut s = session();
	s.local(Action::Move(1, 3)).unwrap();
	s.on_foreign(vec![Action::Toggle(2)]);
	let _ = s.take_batch().unwrap();
	s.on_sent_err();

	assert!(s.needs_refetch());

	assert!(s.refresh(0, records(1..=4)));
	assert!(s.refresh(4, records(5..=8)));
	s.finish_refetch();
	assert!(!s.needs_refetch());
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn disjoint_foreign_edit_still_allows_inverse_replay() {
	let mut s = session();
	s.local(Action::Move(0, 2)).unwrap();
	s.on_foreign(vec![Action::Swap(5, 7)]);
	let _ = s.take_batch().unwrap();
	s.on_sent_err();

	assert!(!s.needs_refetch());
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 5, 8, 7, 6]);
}

#[test]
fn partially_mounted_foreign_move_requests_refetch() {
	let mut s = SyncSession::new();
	s.mount(0, records(1..=4)).unwrap();
	s.on_foreign(vec![Action::Move(10, 2)]);
	assert!(s.needs_refetch());
}

#[test]
fn unmounted_foreign_actions_are_ignored() {
	let mut s = session();
	let before = snapshot(&s);
	s.on_foreign(vec![Action::Toggle(30), Action::Move(12, 20), Action::Swap(9, 11)]);
	assert_eq!(snapshot(&s), before);
	assert!(!s.needs_refetch());
}

#[test]
fn refetch_replays_queued_edits_on_fresh_windows() {
	let mut s = session();
	s.local(Action::Toggle(5)).unwrap();
	s.on_foreign(vec![Action::Move(20, 1)]);
	assert!(s.needs_refetch());

	s.refresh(0, records(11..=14));
	s.refresh(4, records(15..=18));
	s.finish_refetch();

	assert_eq!(ids(&s), vec![11, 12, 13, 14, 15, 16, 17, 18]);
	assert!(s.mirror().get(5).unwrap().checked);
	assert_eq!(s.pending(), &[Action::Toggle(5)]);
}

#[test]
fn queued_edit_on_unmounted_window_survives_refetch() {
	let mut s = session();
	s.local(Action::Toggle(1)).unwrap();
	assert!(s.unmount(0));
	s.on_foreign(vec![Action::Move(2, 6)]);
	assert!(s.needs_refetch());

	s.refresh(4, records(5..=8));
	s.finish_refetch();

	assert_eq!(s.pending(), &[Action::Toggle(1)]);
	assert_eq!(s.status(), SyncStatus::Debouncing);
	assert_eq!(s.take_batch(), Some(vec![Action::Toggle(1)]));
}

#[test]
fn rollback_skips_edits_on_unmounted_windows() {
	let mut s = session();
	s.local(Action::Toggle(1)).unwrap();
	s.local(Action::Swap(4, 5)).unwrap();
	let _ = s.take_batch().unwrap();
	s.local(Action::Toggle(2)).unwrap();
	assert!(s.unmount(0));

	s.on_sent_err();

	assert!(!s.needs_refetch());
	assert_eq!(
		snapshot(&s),
		vec![(5, 4, false), (6, 5, false), (7, 6, false), (8, 7, false)]
	);
	assert_eq!(s.pending(), &[Action::Toggle(2)]);
	assert_eq!(s.status(), SyncStatus::Error);
}

#[test]
fn foreign_batches_wait_out_a_pending_refetch() {
	let mut s = session();
	s.on_foreign(vec![Action::Move(12, 3)]);
	assert!(s.needs_refetch());

	s.on_foreign(vec![Action::Swap(4, 5)]);
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 5, 6, 7, 8]);

	s.refresh(0, records(1..=4));
	s.refresh(4, records(5..=8));
	s.finish_refetch();
	s.on_foreign(vec![Action::Swap(4, 5)]);
	assert_eq!(ids(&s), vec![1, 2, 3, 4, 6, 5, 7, 8]);
}

fn action_strategy() -> impl Strategy<Value = Action> {
	prop_oneof![
		(0usize..8).prop_map(Action::Toggle),
		(0usize..8, 0usize..8).prop_map(|(a, b)| Action::Swap(a, b)),
		(0usize..8, 0usize..8).prop_map(|(a, b)| Action::Move(a, b)),
	]
}

proptest! {
	#[test]
	fn any_failed_batch_restores_the_mirror(batch in prop::collection::vec(action_strategy(), 1..12)) {
		let mut s = session();
		let before = snapshot(&s);
		for action in &batch {
			s.local(*action).unwrap();
		}
		let _ = s.take_batch().unwrap();
		s.on_sent_err();
		prop_assert_eq!(snapshot(&s), before);
	}
}
