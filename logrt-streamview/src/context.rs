use std::collections::BTreeSet;

use uuid::Uuid;

use logrt_base::GlobalAddress;

/// Successfully resolved prefix of a checkpoint record sequence
/// (`START` + entries + `END` sharing a checkpoint id), discovered during a
/// backward fill walk. See [4.D Queued stream view, Checkpoint filter].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointSuccess {
    pub id: Uuid,
    pub start_addr: GlobalAddress,
    pub end_addr: GlobalAddress,
    pub num_entries: u64,
    pub bytes: u64,
    pub snapshot_address: GlobalAddress,
}

/// Per-stream mutable state of a [`crate::QueuedStreamView`]. Created on
/// first access, reset by [`StreamContext::reset`], destroyed with the
/// view. See [3. DATA MODEL, Stream context].
pub struct StreamContext {
    pub global_pointer: GlobalAddress,
    pub min_resolution: GlobalAddress,
    pub max_resolution: GlobalAddress,
    pub read_queue: BTreeSet<GlobalAddress>,
    pub read_cp_queue: BTreeSet<GlobalAddress>,
    pub resolved_queue: BTreeSet<GlobalAddress>,
    pub checkpoint_success: Option<CheckpointSuccess>,
}

impl StreamContext {
    pub fn new() -> Self {
        StreamContext {
            global_pointer: GlobalAddress::NEVER_READ,
            min_resolution: GlobalAddress::NON_ADDRESS,
            max_resolution: GlobalAddress::NON_ADDRESS,
            read_queue: BTreeSet::new(),
            read_cp_queue: BTreeSet::new(),
            resolved_queue: BTreeSet::new(),
            checkpoint_success: None,
        }
    }

    pub fn reset(&mut self) {
        self.global_pointer = GlobalAddress::NEVER_READ;
        self.min_resolution = GlobalAddress::NON_ADDRESS;
        self.max_resolution = GlobalAddress::NON_ADDRESS;
        self.read_queue.clear();
        self.read_cp_queue.clear();
        self.resolved_queue.clear();
        self.checkpoint_success = None;
    }

    /// Stop address for the backward fill walk: don't re-scan anything
    /// already covered by the last forward position, or by a confirmed
    /// checkpoint's subsumed prefix.
    pub fn stop_address(&self) -> GlobalAddress {
        match &self.checkpoint_success {
            Some(cp) => self.global_pointer.max(cp.start_addr),
            None => self.global_pointer,
        }
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}
