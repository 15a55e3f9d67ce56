use std::collections::BTreeSet;
use std::sync::Arc;

use test_log::test;
use uuid::Uuid;

use logrt_base::{BackpointerMap, Direction, GlobalAddress, RuntimeError, StreamId};
use logrt_log::InMemoryLogUnit;
use logrt_sequencer::{InMemorySequencer, SequencerClient};
use logrt_wire::{CheckpointMeta, CheckpointPart};

use super::*;

const TOP: GlobalAddress = GlobalAddress::new(i64::MAX);

fn advance_tail(seq: &InMemorySequencer, sid: StreamId, through: i64) {
    for _ in 0..=through {
        seq.token_request(1, BTreeSet::from([sid]), None).unwrap();
    }
}

#[test]
fn sequential_writes_are_discovered_via_backpointers() {
    let log = InMemoryLogUnit::new();
    let seq = InMemorySequencer::new();
    let sid = StreamId::new_random();
    let mut addrs = Vec::new();
    for _ in 0..3 {
        let token = seq.token_request(1, BTreeSet::from([sid]), None).unwrap();
        log.seed(token.global_address, BTreeSet::from([sid]), token.backpointer_map.clone());
        addrs.push(token.global_address);
    }

    let view = QueuedStreamView::new(
        sid,
        Arc::new(log),
        Arc::new(seq),
        Box::new(BackpointerDiscovery),
        TrimPolicy::Propagate,
    );

    for expect in &addrs {
        let entry = view.next(TOP).unwrap().expect("entry expected");
        assert_eq!(entry.address, *expect);
    }
    assert!(view.next(TOP).unwrap().is_none());
}

#[test]
fn entries_without_backpointers_are_found_by_single_stepping_through_holes() {
    let log = InMemoryLogUnit::new();
    let seq = InMemorySequencer::new();
    let sid = StreamId::new_random();
    advance_tail(&seq, sid, 8);

    log.seed(GlobalAddress::new(5), BTreeSet::from([sid]), BackpointerMap::new());
    log.fill_hole(GlobalAddress::new(6)).unwrap();
    log.fill_hole(GlobalAddress::new(7)).unwrap();
    log.seed(GlobalAddress::new(8), BTreeSet::from([sid]), BackpointerMap::new());

    let view = QueuedStreamView::new(
        sid,
        Arc::new(log),
        Arc::new(seq),
        Box::new(BackpointerDiscovery),
        TrimPolicy::Propagate,
    );

    let first = view.next(GlobalAddress::new(8)).unwrap().unwrap();
    assert_eq!(first.address, GlobalAddress::new(5));
    let second = view.next(GlobalAddress::new(8)).unwrap().unwrap();
    assert_eq!(second.address, GlobalAddress::new(8));
    assert!(view.next(GlobalAddress::new(8)).unwrap().is_none());
}

#[test]
fn complete_checkpoint_sequence_subsumes_the_prefix_it_covers() {
    let log = InMemoryLogUnit::new();
    let seq = InMemorySequencer::new();
    let sid = StreamId::new_random();
    advance_tail(&seq, sid, 13);

    for i in 1..=10 {
        log.seed(GlobalAddress::new(i), BTreeSet::from([sid]), BackpointerMap::new());
    }
    let cp_id = Uuid::new_v4();
    log.seed_checkpoint(
        GlobalAddress::new(11),
        BTreeSet::from([sid]),
        BackpointerMap::new(),
        CheckpointMeta { checkpoint_id: cp_id, part: CheckpointPart::Start },
    );
    log.seed_checkpoint(
        GlobalAddress::new(12),
        BTreeSet::from([sid]),
        BackpointerMap::new(),
        CheckpointMeta { checkpoint_id: cp_id, part: CheckpointPart::Continuation },
    );
    log.seed_checkpoint(
        GlobalAddress::new(13),
        BTreeSet::from([sid]),
        BackpointerMap::new(),
        CheckpointMeta { checkpoint_id: cp_id, part: CheckpointPart::End { snapshot_address: GlobalAddress::new(10) } },
    );

    let view = QueuedStreamView::new(
        sid,
        Arc::new(log),
        Arc::new(seq),
        Box::new(BackpointerDiscovery),
        TrimPolicy::Propagate,
    );

    let max = GlobalAddress::new(13);
    let mut seen = Vec::new();
    while let Some(entry) = view.next(max).unwrap() {
        seen.push(entry.address.as_i64());
    }
    assert_eq!(seen, vec![11, 12, 13]);

    let cp = view.checkpoint_success().expect("checkpoint should have been recorded");
    assert_eq!(cp.id, cp_id);
    assert_eq!(cp.start_addr, GlobalAddress::new(11));
    assert_eq!(cp.end_addr, GlobalAddress::new(13));
    assert_eq!(cp.snapshot_address, GlobalAddress::new(10));
    assert_eq!(view.global_pointer(), max);
}

#[test]
fn seek_replays_from_the_new_position_and_find_locates_nearest_resolved_entry() {
    let log = InMemoryLogUnit::new();
    let seq = InMemorySequencer::new();
    let sid = StreamId::new_random();
    let mut addrs = Vec::new();
    for _ in 0..5 {
        let token = seq.token_request(1, BTreeSet::from([sid]), None).unwrap();
        log.seed(token.global_address, BTreeSet::from([sid]), token.backpointer_map.clone());
        addrs.push(token.global_address);
    }

    let view = QueuedStreamView::new(
        sid,
        Arc::new(log),
        Arc::new(seq),
        Box::new(BackpointerDiscovery),
        TrimPolicy::Propagate,
    );

    for _ in 0..3 {
        view.next(TOP).unwrap();
    }
    assert_eq!(view.global_pointer(), addrs[2]);

    view.seek(addrs[1]);
    let entry = view.next(TOP).unwrap().unwrap();
    assert_eq!(entry.address, addrs[1]);

    let found = view.find(addrs[0], Direction::Forward, false).unwrap();
    assert_eq!(found, addrs[1]);
    let found_back = view.find(addrs[4], Direction::Backward, false).unwrap();
    assert!(found_back.is_address());
    assert!(found_back < addrs[4]);
}

#[test]
fn linear_scan_discovery_matches_backpointer_discovery() {
    fn build(discovery: Box<dyn AddressDiscoveryStrategy>) -> (QueuedStreamView, StreamId) {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let sid = StreamId::new_random();
        for _ in 0..4 {
            let token = seq.token_request(1, BTreeSet::from([sid]), None).unwrap();
            log.seed(token.global_address, BTreeSet::from([sid]), token.backpointer_map.clone());
        }
        (QueuedStreamView::new(sid, Arc::new(log), Arc::new(seq), discovery, TrimPolicy::Propagate), sid)
    }

    let (view_bp, _) = build(Box::new(BackpointerDiscovery));
    let (view_scan, _) = build(Box::new(LinearScanDiscovery));

    let mut bp_addrs = Vec::new();
    while let Some(e) = view_bp.next(TOP).unwrap() {
        bp_addrs.push(e.address);
    }
    let mut scan_addrs = Vec::new();
    while let Some(e) = view_scan.next(TOP).unwrap() {
        scan_addrs.push(e.address);
    }
    assert_eq!(bp_addrs, scan_addrs);
}

#[test]
fn propagate_policy_surfaces_trim_error_ignore_policy_terminates_quietly() {
    let sid = StreamId::new_random();

    let log = InMemoryLogUnit::new();
    let seq = InMemorySequencer::new();
    advance_tail(&seq, sid, 5);
    log.seed(GlobalAddress::new(5), BTreeSet::from([sid]), BackpointerMap::new());
    log.trim(sid, GlobalAddress::new(2)).unwrap();

    let propagate = QueuedStreamView::new(
        sid,
        Arc::new(log),
        Arc::new(seq),
        Box::new(BackpointerDiscovery),
        TrimPolicy::Propagate,
    );
    let err = propagate.next(GlobalAddress::new(5)).unwrap_err();
    assert!(matches!(err, RuntimeError::Trimmed { .. }));

    let log2 = InMemoryLogUnit::new();
    let seq2 = InMemorySequencer::new();
    advance_tail(&seq2, sid, 5);
    log2.seed(GlobalAddress::new(5), BTreeSet::from([sid]), BackpointerMap::new());
    log2.trim(sid, GlobalAddress::new(2)).unwrap();

    let ignoring = QueuedStreamView::new(
        sid,
        Arc::new(log2),
        Arc::new(seq2),
        Box::new(BackpointerDiscovery),
        TrimPolicy::IgnoreTrimmed,
    );
    let entry = ignoring.next(GlobalAddress::new(5)).unwrap().unwrap();
    assert_eq!(entry.address, GlobalAddress::new(5));
    assert!(ignoring.next(GlobalAddress::new(5)).unwrap().is_none());
}
