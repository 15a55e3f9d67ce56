use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tracing::{debug, trace};

use logrt_base::{BackpointerMap, GlobalAddress, RuntimeError, StreamId};
use logrt_wire::{Token, TxResolutionInfo};

use crate::SequencerClient;

struct State {
    epoch: u64,
    global_tail: GlobalAddress,
    stream_tails: BTreeMap<StreamId, GlobalAddress>,
}

/// A single-process sequencer. All requests are serialized behind `state`'s
/// mutex, which is what gives concurrent `TX` requests their strict
/// arrival-order tie-break ([4.C Sequencer client]).
pub struct InMemorySequencer {
    state: Mutex<State>,
}

impl InMemorySequencer {
    pub fn new() -> Self {
        InMemorySequencer {
            state: Mutex::new(State {
                epoch: 0,
                global_tail: GlobalAddress::new(0),
                stream_tails: BTreeMap::new(),
            }),
        }
    }

    /// Simulates a layout reconfiguration: bumps the epoch, invalidating
    /// every token issued before this call.
    pub fn bump_epoch(&self) -> u64 {
        let mut state = self.state.lock().expect("sequencer mutex poisoned");
        state.epoch += 1;
        state.epoch
    }

    /// Finds a stream in `read_set` whose tail has advanced past
    /// `read_timestamp`, meaning some write committed to it after the
    /// transaction took its snapshot. `None` means no conflict.
    fn first_conflict(
        stream_tails: &BTreeMap<StreamId, GlobalAddress>,
        read_set: &BTreeSet<StreamId>,
        read_timestamp: GlobalAddress,
    ) -> Option<StreamId> {
        read_set
            .iter()
            .find(|sid| stream_tails.get(sid).is_some_and(|&tail| tail > read_timestamp))
            .copied()
    }
}

impl Default for InMemorySequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencerClient for InMemorySequencer {
    fn token_query(&self, streams: &BTreeSet<StreamId>) -> Token {
        let state = self.state.lock().expect("sequencer mutex poisoned");
        let stream_address_map = streams
            .iter()
            .map(|sid| (*sid, *state.stream_tails.get(sid).unwrap_or(&GlobalAddress::NON_EXIST)))
            .collect();
        Token::tail_only(state.epoch, stream_address_map)
    }

    fn token_request(
        &self,
        count: u64,
        streams: BTreeSet<StreamId>,
        txn_info: Option<TxResolutionInfo>,
    ) -> Result<Token, RuntimeError> {
        let mut state = self.state.lock().expect("sequencer mutex poisoned");

        if let Some(info) = &txn_info {
            if let Some(conflicting) =
                Self::first_conflict(&state.stream_tails, &info.read_set, info.read_timestamp)
            {
                debug!(target: "logrt", stream = %conflicting, read_ts = %info.read_timestamp, "transaction aborted: conflicting write");
                return Err(RuntimeError::TransactionAborted {
                    reason: format!(
                        "stream {conflicting} was written after this transaction's read timestamp {}",
                        info.read_timestamp
                    ),
                });
            }
        }

        let global_address = state.global_tail;
        let mut backpointer_map = BackpointerMap::new();
        let mut stream_address_map = BTreeMap::new();
        for sid in &streams {
            let prev = *state.stream_tails.get(sid).unwrap_or(&GlobalAddress::NON_EXIST);
            backpointer_map.insert(*sid, prev);
            state.stream_tails.insert(*sid, global_address);
            stream_address_map.insert(*sid, global_address);
        }
        state.global_tail =
            state.global_tail.checked_add(count as i64).ok_or(RuntimeError::OutOfSpace)?;

        trace!(target: "logrt", %global_address, count, streams = streams.len(), "token issued");
        Ok(Token { epoch: state.epoch, global_address, backpointer_map, stream_address_map })
    }

    fn current_epoch(&self) -> u64 {
        self.state.lock().expect("sequencer mutex poisoned").epoch
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn sid() -> StreamId {
        StreamId::new_random()
    }

    #[test]
    fn raw_and_stream_requests_advance_the_global_tail() {
        let seq = InMemorySequencer::new();
        let x = sid();
        let t1 = seq.token_request(1, BTreeSet::from([x]), None).unwrap();
        let t2 = seq.token_request(1, BTreeSet::from([x]), None).unwrap();
        assert!(t1.global_address < t2.global_address);
        assert_eq!(t2.backpointer_map[&x], t1.global_address);
    }

    #[test]
    fn query_does_not_allocate() {
        let seq = InMemorySequencer::new();
        let x = sid();
        let before = seq.token_query(&BTreeSet::from([x]));
        let _ = seq.token_request(1, BTreeSet::from([x]), None).unwrap();
        let after = seq.token_query(&BTreeSet::from([x]));
        assert_eq!(before.stream_address_map[&x], GlobalAddress::NON_EXIST);
        assert!(after.stream_address_map[&x].is_address());
        // A second query with no intervening request must not move the tail.
        let again = seq.token_query(&BTreeSet::from([x]));
        assert_eq!(again.stream_address_map, after.stream_address_map);
    }

    #[test]
    fn tx_aborts_when_read_set_was_written_after_read_timestamp() {
        let seq = InMemorySequencer::new();
        let x = sid();
        let y = sid();
        let t_x = seq.token_request(1, BTreeSet::from([x]), None).unwrap();
        // Another transaction commits a write to x after t_x's read point.
        let _t_x2 = seq.token_request(1, BTreeSet::from([x]), None).unwrap();

        let info = TxResolutionInfo {
            read_timestamp: t_x.global_address,
            read_set: BTreeSet::from([x]),
            write_set: BTreeSet::from([y]),
        };
        let result = seq.token_request(1, BTreeSet::from([y]), Some(info));
        assert!(matches!(result, Err(RuntimeError::TransactionAborted { .. })));
    }

    #[test]
    fn tx_commits_when_read_set_is_undisturbed() {
        let seq = InMemorySequencer::new();
        let x = sid();
        let y = sid();
        let t_x = seq.token_request(1, BTreeSet::from([x]), None).unwrap();
        let info = TxResolutionInfo {
            read_timestamp: t_x.global_address,
            read_set: BTreeSet::from([x]),
            write_set: BTreeSet::from([y]),
        };
        let result = seq.token_request(1, BTreeSet::from([y]), Some(info));
        assert!(result.is_ok());
    }

    #[test]
    fn epoch_bump_is_visible_on_next_token() {
        let seq = InMemorySequencer::new();
        let e0 = seq.current_epoch();
        seq.bump_epoch();
        let t = seq.token_request(1, BTreeSet::new(), None).unwrap();
        assert_eq!(t.epoch, e0 + 1);
    }
}
