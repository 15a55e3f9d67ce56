// A runtime collects together the client-side pieces needed to talk to a
// shared log database: a log client, a sequencer client, and whatever
// stream views and transactions get opened against them. See [2. SYSTEM
// OVERVIEW].
//
// This crate is a thin facade; the real logic lives in logrt-log,
// logrt-sequencer, logrt-streamview, logrt-txn and logrt-replication.

use std::sync::Arc;

use logrt_base::StreamId;
use logrt_log::LogClient;
use logrt_sequencer::SequencerClient;
use logrt_streamview::{AddressDiscoveryStrategy, BackpointerDiscovery, QueuedStreamView, TrimPolicy};
use logrt_txn::TransactionStack;
use logrt_wire::RuntimeConfig;

/// A configured client to a shared log database cluster. Cheap to clone
/// (everything it owns is behind an `Arc`); typically constructed once per
/// process and shared across worker threads.
#[derive(Clone)]
pub struct Runtime {
    config: Arc<RuntimeConfig>,
    log: Arc<dyn LogClient>,
    sequencer: Arc<dyn SequencerClient>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, log: Arc<dyn LogClient>, sequencer: Arc<dyn SequencerClient>) -> Self {
        Runtime { config: Arc::new(config), log, sequencer }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn LogClient> {
        &self.log
    }

    pub fn sequencer(&self) -> &Arc<dyn SequencerClient> {
        &self.sequencer
    }

    /// Opens a queued stream view over `stream_id`, using backpointer-based
    /// discovery ([4.D]).
    pub fn open_stream(&self, stream_id: StreamId, trim_policy: TrimPolicy) -> QueuedStreamView {
        self.open_stream_with_discovery(stream_id, Box::new(BackpointerDiscovery), trim_policy)
    }

    /// As [`Self::open_stream`], but with an explicit discovery strategy
    /// (e.g. [`logrt_streamview::LinearScanDiscovery`] for
    /// backpointers-disabled operation).
    pub fn open_stream_with_discovery(
        &self,
        stream_id: StreamId,
        discovery: Box<dyn AddressDiscoveryStrategy>,
        trim_policy: TrimPolicy,
    ) -> QueuedStreamView {
        QueuedStreamView::new(stream_id, self.log.clone(), self.sequencer.clone(), discovery, trim_policy)
    }

    /// A fresh, empty transaction stack scoped to this runtime's log and
    /// sequencer ([4.E]).
    pub fn transactions(&self) -> TransactionStack {
        TransactionStack::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use logrt_log::InMemoryLogUnit;
    use logrt_sequencer::InMemorySequencer;
    use logrt_txn::TxKind;
    use std::collections::BTreeSet;
    use test_log::test;

    #[test]
    fn runtime_wires_a_stream_view_and_a_transaction_stack_together() {
        let runtime = Runtime::new(
            RuntimeConfig::default(),
            Arc::new(InMemoryLogUnit::new()),
            Arc::new(InMemorySequencer::new()),
        );
        let sid = StreamId::new_random();

        let mut txns = runtime.transactions();
        txns.begin(TxKind::Optimistic, runtime.sequencer().as_ref()).unwrap();
        txns.record_write(BTreeSet::from([sid]), vec![1, 2, 3]).unwrap();
        let ga = txns.commit(runtime.log().as_ref(), runtime.sequencer().as_ref()).unwrap().unwrap();

        let view = runtime.open_stream(sid, TrimPolicy::Propagate);
        let entry = view.next(ga).unwrap().expect("the committed write should be visible");
        assert_eq!(entry.address, ga);
    }
}
