// Address primitives: the global address space assigned by the sequencer,
// and the stream identifiers that partition it. See [3. DATA MODEL].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 64-bit global address (GA): the sequencer's monotonically increasing
/// ordinal for a log slot. Negative values below zero are reserved
/// sentinels; see [`GlobalAddress::NEVER_READ`] and friends.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalAddress(i64);

impl GlobalAddress {
    /// No entry has ever been read on this stream view yet.
    pub const NEVER_READ: GlobalAddress = GlobalAddress(-1);
    /// The search found nothing matching the query.
    pub const NOT_FOUND: GlobalAddress = GlobalAddress(-2);
    /// The entry does not belong to the stream in question.
    pub const NON_EXIST: GlobalAddress = GlobalAddress(-3);
    /// Not a valid address at all (uninitialized / placeholder).
    pub const NON_ADDRESS: GlobalAddress = GlobalAddress(-4);

    pub const fn new(ga: i64) -> Self {
        GlobalAddress(ga)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// `isAddress(x) iff x >= 0`.
    pub const fn is_address(self) -> bool {
        self.0 >= 0
    }

    pub fn checked_add(self, delta: i64) -> Option<GlobalAddress> {
        self.0.checked_add(delta).map(GlobalAddress)
    }

    pub fn pred(self) -> GlobalAddress {
        GlobalAddress(self.0 - 1)
    }

    pub fn succ(self) -> GlobalAddress {
        GlobalAddress(self.0 + 1)
    }
}

impl fmt::Debug for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            GlobalAddress::NEVER_READ => write!(f, "NEVER_READ"),
            GlobalAddress::NOT_FOUND => write!(f, "NOT_FOUND"),
            GlobalAddress::NON_EXIST => write!(f, "NON_EXIST"),
            GlobalAddress::NON_ADDRESS => write!(f, "NON_ADDRESS"),
            GlobalAddress(ga) => write!(f, "{ga}"),
        }
    }
}

impl fmt::Display for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A 128-bit stream identifier, partitioning the global address space into
/// logical per-object sub-logs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub fn new_random() -> Self {
        StreamId(Uuid::new_v4())
    }

    pub fn from_u128(v: u128) -> Self {
        StreamId(Uuid::from_u128(v))
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-stream backpointers carried by a log entry: for each stream the
/// entry belongs to, the address of the previous entry of that stream, or
/// `NON_EXIST` if this is the first. Invariant: `backpointer[sid] <
/// entry.address` whenever it is a real address.
pub type BackpointerMap = BTreeMap<StreamId, GlobalAddress>;

/// Direction of a [find](crate) query relative to a known address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}
