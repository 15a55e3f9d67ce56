// Log-unit protocol: read/write/fillHole/trim against an individual log
// slot, per [6. EXTERNAL INTERFACES]. Framing is length-prefixed binary on
// the wire (carried by whatever transport [4.G] supplies); this module
// only defines the message shapes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use logrt_base::{BackpointerMap, GlobalAddress, StreamId};

/// The tagged type of a log entry. See [3. DATA MODEL].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Data,
    Hole,
    Checkpoint,
    Trimmed,
    Empty,
}

/// Which part of a checkpoint record sequence this entry represents.
/// A complete sequence is `Start`, zero or more `Continuation`s, then `End`
/// with a `snapshot_address` marking the prefix the checkpoint subsumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointPart {
    Start,
    Continuation,
    End { snapshot_address: GlobalAddress },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub checkpoint_id: Uuid,
    pub part: CheckpointPart,
}

/// An immutable record at some global address. Invariant:
/// `backpointers[sid] < address` whenever a backpointer is a real address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: GlobalAddress,
    pub kind: EntryKind,
    pub streams: BTreeSet<StreamId>,
    pub backpointers: BackpointerMap,
    pub payload: Vec<u8>,
    pub size_estimate: u64,
    pub checkpoint: Option<CheckpointMeta>,
}

impl LogEntry {
    pub fn empty(address: GlobalAddress) -> Self {
        LogEntry {
            address,
            kind: EntryKind::Empty,
            streams: BTreeSet::new(),
            backpointers: BackpointerMap::new(),
            payload: Vec::new(),
            size_estimate: 0,
            checkpoint: None,
        }
    }

    pub fn hole(address: GlobalAddress) -> Self {
        LogEntry { kind: EntryKind::Hole, ..LogEntry::empty(address) }
    }

    pub fn trimmed(address: GlobalAddress) -> Self {
        LogEntry { kind: EntryKind::Trimmed, ..LogEntry::empty(address) }
    }

    pub fn contains_stream(&self, stream: StreamId) -> bool {
        self.streams.contains(&stream)
    }

    pub fn backpointer(&self, stream: StreamId) -> Option<GlobalAddress> {
        self.backpointers.get(&stream).copied()
    }
}

/// Outcome of a `write`. Competing writers racing for the same address
/// resolve via `Overwrite`; the caller can still treat it as success if the
/// winning entry's payload matches its own (idempotent retry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteResult {
    Ok,
    Overwrite,
    Trimmed,
    OutOfSpace,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogUnitRequest {
    Read { address: GlobalAddress },
    ReadAll { addresses: Vec<GlobalAddress> },
    Write { address: GlobalAddress, streams: BTreeSet<StreamId>, payload: Vec<u8> },
    FillHole { address: GlobalAddress },
    Trim { stream: StreamId, address: GlobalAddress },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogUnitResponse {
    Entry(LogEntry),
    Entries(Vec<LogEntry>),
    Write(WriteResult),
    Ack,
}
