//! The transactional context ([4.E]): a client-side wrapper over the log
//! and sequencer clients that collects read/write sets and resolves them
//! through the sequencer's conflict check at commit time.
//!
//! This replaces the source runtime's implicit thread-local transaction
//! stack (see [9. DESIGN NOTES]) with an explicit [`TransactionStack`] the
//! caller owns and threads through its own call stack.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use logrt_base::{err, Error, GlobalAddress, RuntimeError, StreamId};
use logrt_log::LogClient;
use logrt_sequencer::SequencerClient;
use logrt_wire::TxResolutionInfo;

/// Conflict-resolution policy. See [4.E Transactional context].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    /// Collects a read set and a write set; aborts if any read-set stream
    /// was written after the snapshot point.
    Optimistic,
    /// Pinned read timestamp, no writes permitted.
    Snapshot,
    /// Conflicts computed on write sets only; read-read conflicts ignored.
    WriteAfterWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committing,
    Committed,
    Aborted,
}

/// One batch of data appended during a transaction, written as a single
/// multi-stream log entry at commit time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingWrite {
    pub streams: BTreeSet<StreamId>,
    pub payload: Vec<u8>,
}

/// One nesting level of transactional state. See [3. DATA MODEL].
#[derive(Debug)]
pub struct Transaction {
    kind: TxKind,
    snapshot: GlobalAddress,
    epoch: u64,
    read_set: BTreeSet<StreamId>,
    write_set: BTreeSet<StreamId>,
    pending: Vec<PendingWrite>,
    state: TxState,
}

impl Transaction {
    fn new(kind: TxKind, snapshot: GlobalAddress, epoch: u64) -> Self {
        Transaction {
            kind,
            snapshot,
            epoch,
            read_set: BTreeSet::new(),
            write_set: BTreeSet::new(),
            pending: Vec::new(),
            state: TxState::Active,
        }
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn snapshot(&self) -> GlobalAddress {
        self.snapshot
    }

    /// The epoch this transaction began under. Pinned alongside `snapshot`
    /// so a layout change mid-transaction can be detected at commit time
    /// instead of silently writing under the new layout.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// An explicit, caller-owned stack of nested transactions. Each thread (or
/// logical task) that wants transactional isolation owns one of these,
/// rather than relying on a process-global thread-local.
#[derive(Default)]
pub struct TransactionStack {
    frames: Vec<Transaction>,
}

impl TransactionStack {
    pub fn new() -> Self {
        TransactionStack { frames: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn active(&self) -> Option<&Transaction> {
        self.frames.last()
    }

    /// Begins a transaction. If another transaction is already active on
    /// this stack, the new one is nested inside it and inherits its
    /// snapshot (the outer transaction's view is what the inner one reads
    /// through).
    pub fn begin(&mut self, kind: TxKind, sequencer: &dyn SequencerClient) -> Result<(), Error> {
        let (snapshot, epoch) = match self.frames.last() {
            Some(parent) => (parent.snapshot, parent.epoch),
            None => {
                // A zero-count, streamless request just reads the current
                // global tail without allocating or touching any stream's
                // tail; it's the cheapest way to pin a read timestamp. The
                // tail is the next address to be allocated (exclusive), so
                // `pred()` converts it to the inclusive last-visible address
                // that `TxResolutionInfo::read_timestamp` expects. The same
                // token carries the epoch this transaction is pinned to.
                let token = sequencer.token_request(0, BTreeSet::new(), None)?;
                (token.global_address.pred(), token.epoch)
            }
        };
        trace!(target: "logrt", ?kind, %snapshot, epoch, depth = self.frames.len() + 1, "transaction begin");
        self.frames.push(Transaction::new(kind, snapshot, epoch));
        Ok(())
    }

    fn active_mut(&mut self) -> Result<&mut Transaction, Error> {
        self.frames.last_mut().ok_or_else(|| err("no active transaction on this stack"))
    }

    fn require_active_state(txn: &Transaction) -> Result<(), Error> {
        if txn.state != TxState::Active {
            return Err(err("transaction is no longer active"));
        }
        Ok(())
    }

    pub fn record_read(&mut self, stream: StreamId) -> Result<(), Error> {
        let txn = self.active_mut()?;
        Self::require_active_state(txn)?;
        txn.read_set.insert(stream);
        Ok(())
    }

    pub fn record_write(&mut self, streams: BTreeSet<StreamId>, payload: Vec<u8>) -> Result<(), Error> {
        let txn = self.active_mut()?;
        Self::require_active_state(txn)?;
        if txn.kind == TxKind::Snapshot {
            return Err(err("writes are not permitted inside a snapshot transaction"));
        }
        txn.write_set.extend(streams.iter().copied());
        txn.pending.push(PendingWrite { streams, payload });
        Ok(())
    }

    /// Explicit abort: ACTIVE → ABORTED for the innermost frame. Per
    /// [4.E], a terminal transaction permits no further operations and is
    /// simply discarded; outer frames are untouched.
    pub fn abort(&mut self) -> Result<(), Error> {
        let txn = self.frames.last_mut().ok_or_else(|| err("no active transaction on this stack"))?;
        txn.state = TxState::Aborted;
        self.frames.pop();
        Ok(())
    }

    /// Commits the innermost transaction. If it is nested inside another,
    /// per [4.E] "commit is performed only at the outermost boundary": the
    /// read/write sets and pending writes merge up into the parent and
    /// `Ok(None)` is returned. At the outermost frame, resolves conflicts
    /// through the sequencer and, on success, writes the batch.
    pub fn commit(
        &mut self,
        log: &dyn LogClient,
        sequencer: &dyn SequencerClient,
    ) -> Result<Option<GlobalAddress>, RuntimeError> {
        let mut txn = self.frames.pop().expect("commit called with no active transaction");
        txn.state = TxState::Committing;

        if let Some(parent) = self.frames.last_mut() {
            trace!(target: "logrt", depth = self.frames.len() + 1, "merging nested transaction into parent");
            parent.read_set.extend(txn.read_set);
            parent.write_set.extend(txn.write_set);
            parent.pending.extend(txn.pending);
            return Ok(None);
        }

        if txn.pending.is_empty() {
            txn.state = TxState::Committed;
            return Ok(None);
        }

        // Write-after-write ignores read-read conflicts by checking the
        // write set's own tails rather than the recorded read set.
        let conflict_set = match txn.kind {
            TxKind::WriteAfterWrite => txn.write_set.clone(),
            _ => txn.read_set.clone(),
        };
        let resolution = TxResolutionInfo {
            read_timestamp: txn.snapshot,
            read_set: conflict_set,
            write_set: txn.write_set.clone(),
        };

        let payload = flatten_pending(&txn.pending);
        let result = sequencer.token_request(1, txn.write_set.clone(), Some(resolution));
        let token = match result {
            Ok(token) => token,
            Err(e) => {
                txn.state = TxState::Aborted;
                debug!(target: "logrt", error = %e, "transaction commit failed");
                return Err(e);
            }
        };

        // A layout change (e.g. a reconfiguration) between this
        // transaction's `begin` and this commit invalidates the epoch it
        // was pinned to; writing under the token anyway would land the
        // batch under a layout the transaction never actually observed.
        if token.epoch != txn.epoch {
            txn.state = TxState::Aborted;
            let wrong_epoch = RuntimeError::WrongEpoch { expected: txn.epoch, found: token.epoch };
            debug!(target: "logrt", error = %wrong_epoch, "transaction commit failed");
            return Err(wrong_epoch);
        }

        use logrt_wire::WriteResult;
        match log.write(token.global_address, txn.write_set.clone(), payload)? {
            WriteResult::Ok => {
                txn.state = TxState::Committed;
                Ok(Some(token.global_address))
            }
            WriteResult::Overwrite => {
                txn.state = TxState::Aborted;
                Err(RuntimeError::Overwrite { address: token.global_address })
            }
            WriteResult::Trimmed => {
                txn.state = TxState::Aborted;
                Err(RuntimeError::Trimmed { address: token.global_address })
            }
            WriteResult::OutOfSpace => {
                txn.state = TxState::Aborted;
                Err(RuntimeError::OutOfSpace)
            }
        }
    }
}

/// Concatenates each pending write's streams tag and payload into one blob
/// so the whole batch lands at a single global address. The wire format of
/// the combined payload is an implementation detail of the writer; this
/// placeholder simply frames each entry with a length prefix.
fn flatten_pending(pending: &[PendingWrite]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in pending {
        out.extend_from_slice(&(p.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&p.payload);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use logrt_log::InMemoryLogUnit;
    use logrt_sequencer::InMemorySequencer;
    use test_log::test;

    fn sid() -> StreamId {
        StreamId::new_random()
    }

    #[test]
    fn optimistic_commit_writes_at_the_token_address() {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let mut stack = TransactionStack::new();
        let x = sid();

        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.record_read(x).unwrap();
        stack.record_write(BTreeSet::from([x]), vec![1, 2, 3]).unwrap();
        let ga = stack.commit(&log, &seq).unwrap().expect("outermost commit writes");

        let entry = log.read(ga).unwrap();
        assert!(entry.contains_stream(x));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn optimistic_commit_aborts_on_conflicting_read_set() {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let x = sid();

        let mut stack = TransactionStack::new();
        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.record_read(x).unwrap();

        // Another writer commits to x after our snapshot was pinned.
        seq.token_request(1, BTreeSet::from([x]), None).unwrap();

        stack.record_write(BTreeSet::from([x]), vec![9]).unwrap();
        let result = stack.commit(&log, &seq);
        assert!(matches!(result, Err(RuntimeError::TransactionAborted { .. })));
    }

    #[test]
    fn nested_transaction_merges_into_parent_without_committing() {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let x = sid();
        let y = sid();

        let mut stack = TransactionStack::new();
        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.record_write(BTreeSet::from([x]), vec![1]).unwrap();

        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.record_write(BTreeSet::from([y]), vec![2]).unwrap();
        let inner = stack.commit(&log, &seq).unwrap();
        assert!(inner.is_none(), "nested commit must not write");
        assert_eq!(stack.depth(), 1);

        let outer = stack.commit(&log, &seq).unwrap().expect("outer commit writes");
        let entry = log.read(outer).unwrap();
        assert!(entry.contains_stream(x));
        assert!(entry.contains_stream(y));
    }

    #[test]
    fn snapshot_transaction_rejects_writes() {
        let seq = InMemorySequencer::new();
        let mut stack = TransactionStack::new();
        stack.begin(TxKind::Snapshot, &seq).unwrap();
        let result = stack.record_write(BTreeSet::from([sid()]), vec![1]);
        assert!(result.is_err());
    }

    #[test]
    fn write_after_write_ignores_unrelated_read_write_conflicts() {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let x = sid();
        let y = sid();

        let mut stack = TransactionStack::new();
        stack.begin(TxKind::WriteAfterWrite, &seq).unwrap();
        stack.record_read(x).unwrap();
        stack.record_write(BTreeSet::from([y]), vec![7]).unwrap();

        // x (read but not written) changes after the snapshot; a
        // write-after-write transaction must not care.
        seq.token_request(1, BTreeSet::from([x]), None).unwrap();

        let result = stack.commit(&log, &seq);
        assert!(result.is_ok());
    }

    #[test]
    fn commit_aborts_with_wrong_epoch_after_a_layout_change() {
        let log = InMemoryLogUnit::new();
        let seq = InMemorySequencer::new();
        let x = sid();

        let mut stack = TransactionStack::new();
        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.record_write(BTreeSet::from([x]), vec![1]).unwrap();

        seq.bump_epoch();

        let result = stack.commit(&log, &seq);
        assert!(matches!(result, Err(RuntimeError::WrongEpoch { expected: 0, found: 1 })));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn abort_discards_the_innermost_frame_only() {
        let seq = InMemorySequencer::new();
        let mut stack = TransactionStack::new();
        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.begin(TxKind::Optimistic, &seq).unwrap();
        stack.abort().unwrap();
        assert_eq!(stack.depth(), 1);
    }
}
