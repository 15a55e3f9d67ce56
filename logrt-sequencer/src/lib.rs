//! The sequencer client ([4.C]): issues tokens that serialize writes across
//! the shared global address space, and arbitrates transactional conflict
//! resolution. All token allocations are totally ordered by the
//! sequencer's arrival order ([5. CONCURRENCY & RESOURCE MODEL]); this
//! in-memory implementation serializes them behind a single mutex, which is
//! a faithful (if non-distributed) model of that ordering.

mod memory;

pub use memory::InMemorySequencer;

use std::collections::BTreeSet;

use logrt_base::{RuntimeError, StreamId};
use logrt_wire::{Token, TxResolutionInfo};

/// The client-facing contract of the sequencer. `token_query` never
/// allocates; `token_request` always does, and additionally runs conflict
/// resolution when `txn_info` is supplied.
pub trait SequencerClient: Send + Sync {
    /// `QUERY`: a no-allocation peek at the current global and per-stream
    /// tails.
    fn token_query(&self, streams: &BTreeSet<StreamId>) -> Token;

    /// `RAW` (no streams), `STREAM`/`MULTI_STREAM` (one or more streams), or
    /// `TX` (streams plus resolution info) depending on which fields are
    /// populated.
    fn token_request(
        &self,
        count: u64,
        streams: BTreeSet<StreamId>,
        txn_info: Option<TxResolutionInfo>,
    ) -> Result<Token, RuntimeError>;

    /// Current cluster-layout epoch; a monotonically increasing generation
    /// counter bundled into every token. Exposed so callers can detect that
    /// an outstanding token has gone stale without waiting for a request to
    /// fail.
    fn current_epoch(&self) -> u64;
}
