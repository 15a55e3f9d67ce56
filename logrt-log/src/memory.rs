use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tracing::debug;

use logrt_base::{BackpointerMap, GlobalAddress, RuntimeError, StreamId};
use logrt_wire::{CheckpointMeta, EntryKind, LogEntry, WriteResult};

use crate::{parallel_read_all, LogClient};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    Empty,
    Hole,
    Entry {
        streams: BTreeSet<StreamId>,
        backpointers: BackpointerMap,
        payload: Vec<u8>,
        checkpoint: Option<CheckpointMeta>,
    },
}

struct State {
    slots: BTreeMap<GlobalAddress, Slot>,
    /// Highest address trimmed so far; every address at or below it reads
    /// as `Trimmed` regardless of what, if anything, was written there.
    trim_mark: GlobalAddress,
    capacity: Option<usize>,
}

/// An in-process stand-in for a log-unit server, used by tests and by
/// callers that don't need real network transport. Reads are a pure
/// function of address (idempotent); writes are idempotent when retried
/// with identical content.
pub struct InMemoryLogUnit {
    state: Mutex<State>,
}

impl InMemoryLogUnit {
    pub fn new() -> Self {
        InMemoryLogUnit {
            state: Mutex::new(State {
                slots: BTreeMap::new(),
                trim_mark: GlobalAddress::NON_ADDRESS,
                capacity: None,
            }),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let unit = Self::new();
        unit.state.lock().expect("log unit mutex poisoned").capacity = Some(capacity);
        unit
    }

    fn entry_from_slot(address: GlobalAddress, slot: &Slot) -> LogEntry {
        match slot {
            Slot::Empty => LogEntry::empty(address),
            Slot::Hole => LogEntry::hole(address),
            Slot::Entry { streams, backpointers, payload, checkpoint } => LogEntry {
                address,
                kind: if checkpoint.is_some() { EntryKind::Checkpoint } else { EntryKind::Data },
                streams: streams.clone(),
                backpointers: backpointers.clone(),
                payload: payload.clone(),
                size_estimate: payload.len() as u64,
                checkpoint: checkpoint.clone(),
            },
        }
    }

    /// Seed an entry directly, bypassing sequencer/token allocation. Used by
    /// tests that need exact control over addresses and backpointers.
    pub fn seed(&self, address: GlobalAddress, streams: BTreeSet<StreamId>, backpointers: BackpointerMap) {
        let mut state = self.state.lock().expect("log unit mutex poisoned");
        state.slots.insert(address, Slot::Entry { streams, backpointers, payload: Vec::new(), checkpoint: None });
    }

    pub fn seed_checkpoint(
        &self,
        address: GlobalAddress,
        streams: BTreeSet<StreamId>,
        backpointers: BackpointerMap,
        checkpoint: CheckpointMeta,
    ) {
        let mut state = self.state.lock().expect("log unit mutex poisoned");
        state.slots.insert(
            address,
            Slot::Entry { streams, backpointers, payload: Vec::new(), checkpoint: Some(checkpoint) },
        );
    }
}

impl Default for InMemoryLogUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl LogClient for InMemoryLogUnit {
    fn read(&self, address: GlobalAddress) -> Result<LogEntry, RuntimeError> {
        let state = self.state.lock().expect("log unit mutex poisoned");
        if address <= state.trim_mark {
            return Err(RuntimeError::Trimmed { address });
        }
        Ok(match state.slots.get(&address) {
            Some(slot) => Self::entry_from_slot(address, slot),
            None => LogEntry::empty(address),
        })
    }

    fn read_all(&self, addresses: &[GlobalAddress]) -> Result<Vec<LogEntry>, RuntimeError> {
        parallel_read_all(self, addresses)
    }

    fn write(
        &self,
        address: GlobalAddress,
        streams: BTreeSet<StreamId>,
        payload: Vec<u8>,
    ) -> Result<WriteResult, RuntimeError> {
        let mut state = self.state.lock().expect("log unit mutex poisoned");
        if address <= state.trim_mark {
            return Ok(WriteResult::Trimmed);
        }
        if let Some(capacity) = state.capacity {
            let occupied = state.slots.values().filter(|s| !matches!(s, Slot::Empty)).count();
            if occupied >= capacity && !matches!(state.slots.get(&address), Some(s) if !matches!(s, Slot::Empty)) {
                return Ok(WriteResult::OutOfSpace);
            }
        }
        match state.slots.get(&address) {
            None | Some(Slot::Empty) => {
                state.slots.insert(
                    address,
                    Slot::Entry { streams, backpointers: BackpointerMap::new(), payload, checkpoint: None },
                );
                Ok(WriteResult::Ok)
            }
            Some(Slot::Hole) => Ok(WriteResult::Overwrite),
            Some(Slot::Entry { streams: existing_streams, payload: existing_payload, .. }) => {
                if *existing_streams == streams && *existing_payload == payload {
                    debug!(target: "logrt", ?address, "idempotent rewrite of identical entry");
                    Ok(WriteResult::Ok)
                } else {
                    Ok(WriteResult::Overwrite)
                }
            }
        }
    }

    fn fill_hole(&self, address: GlobalAddress) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("log unit mutex poisoned");
        if address <= state.trim_mark {
            return Err(RuntimeError::Trimmed { address });
        }
        state.slots.entry(address).or_insert(Slot::Hole);
        Ok(())
    }

    fn trim(&self, _stream: StreamId, address: GlobalAddress) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("log unit mutex poisoned");
        if address > state.trim_mark {
            state.trim_mark = address;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn read_of_unwritten_address_is_empty_then_permanent_hole() {
        let unit = InMemoryLogUnit::new();
        let a = GlobalAddress::new(4);
        let e = unit.read(a).unwrap();
        assert_eq!(e.kind, EntryKind::Empty);
        unit.fill_hole(a).unwrap();
        let e = unit.read(a).unwrap();
        assert_eq!(e.kind, EntryKind::Hole);
    }

    #[test]
    fn write_is_idempotent_for_identical_content() {
        let unit = InMemoryLogUnit::new();
        let a = GlobalAddress::new(0);
        let sid = StreamId::new_random();
        let mut streams = BTreeSet::new();
        streams.insert(sid);
        assert_eq!(unit.write(a, streams.clone(), vec![1, 2, 3]).unwrap(), WriteResult::Ok);
        assert_eq!(unit.write(a, streams, vec![1, 2, 3]).unwrap(), WriteResult::Ok);
    }

    #[test]
    fn write_conflict_is_overwrite() {
        let unit = InMemoryLogUnit::new();
        let a = GlobalAddress::new(0);
        let sid = StreamId::new_random();
        let mut streams = BTreeSet::new();
        streams.insert(sid);
        assert_eq!(unit.write(a, streams.clone(), vec![1]).unwrap(), WriteResult::Ok);
        assert_eq!(unit.write(a, streams, vec![2]).unwrap(), WriteResult::Overwrite);
    }

    #[test]
    fn trimmed_address_errors_on_read() {
        let unit = InMemoryLogUnit::new();
        let a = GlobalAddress::new(3);
        let sid = StreamId::new_random();
        unit.seed(a, BTreeSet::from([sid]), BackpointerMap::new());
        unit.trim(sid, a).unwrap();
        assert_eq!(unit.read(a), Err(RuntimeError::Trimmed { address: a }));
    }

    #[test]
    fn read_all_preserves_input_order() {
        let unit = InMemoryLogUnit::new();
        let sid = StreamId::new_random();
        for i in 0..10 {
            unit.seed(GlobalAddress::new(i), BTreeSet::from([sid]), BackpointerMap::new());
        }
        let addrs: Vec<_> = (0..10).rev().map(GlobalAddress::new).collect();
        let entries = unit.read_all(&addrs).unwrap();
        let got: Vec<i64> = entries.iter().map(|e| e.address.as_i64()).collect();
        let want: Vec<i64> = addrs.iter().map(|a| a.as_i64()).collect();
        assert_eq!(got, want);
    }
}
