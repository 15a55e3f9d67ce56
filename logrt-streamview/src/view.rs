use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};
use uuid::Uuid;

use logrt_base::{Direction, GlobalAddress, RuntimeError, StreamId};
use logrt_log::LogClient;
use logrt_sequencer::SequencerClient;
use logrt_wire::{CheckpointPart, LogEntry};

use crate::context::{CheckpointSuccess, StreamContext};
use crate::discovery::AddressDiscoveryStrategy;

/// Whether a trimmed read during the backward fill walk is a hard error or
/// a signal that this stream view has nothing more to yield. See [7. ERROR
/// HANDLING DESIGN, Trimmed].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimPolicy {
    Propagate,
    IgnoreTrimmed,
}

#[derive(Debug, PartialEq, Eq)]
enum FilterAction {
    Include,
    IncludeStop,
    Exclude,
    ExcludeStop,
}

/// Scratch state threaded through a single backward walk while a candidate
/// checkpoint record sequence is being assembled. Discarded if the walk
/// ends before a matching `START` is found.
#[derive(Default)]
struct CheckpointWalk {
    active_id: Option<Uuid>,
    end_addr: Option<GlobalAddress>,
    snapshot_address: Option<GlobalAddress>,
    count: u64,
    bytes: u64,
}

/// First complete checkpoint record sequence wins ([4.D, Checkpoint
/// filter]): classifies `entry` and says whether it belongs in the
/// checkpoint queue rather than the ordinary read queue.
fn checkpoint_filter(
    entry: &LogEntry,
    walk: &mut CheckpointWalk,
    already_confirmed: bool,
) -> (FilterAction, bool) {
    let Some(meta) = &entry.checkpoint else {
        return (FilterAction::Include, false);
    };
    if already_confirmed {
        return (FilterAction::ExcludeStop, false);
    }
    match walk.active_id {
        None => match meta.part {
            CheckpointPart::End { snapshot_address } => {
                walk.active_id = Some(meta.checkpoint_id);
                walk.end_addr = Some(entry.address);
                walk.snapshot_address = Some(snapshot_address);
                walk.count = 1;
                walk.bytes = entry.size_estimate;
                (FilterAction::Include, true)
            }
            // A START or CONTINUATION with no END seen yet is a dangling
            // fragment (checkpoint still being written, or we started the
            // walk partway through one); it can't subsume anything on its
            // own.
            _ => (FilterAction::Exclude, false),
        },
        Some(active) if active == meta.checkpoint_id => {
            walk.count += 1;
            walk.bytes += entry.size_estimate;
            match meta.part {
                CheckpointPart::Start => (FilterAction::IncludeStop, true),
                _ => (FilterAction::Include, true),
            }
        }
        // An older, unrelated checkpoint id; the first complete sequence we
        // find wins, so ignore this one and keep walking.
        Some(_) => (FilterAction::Exclude, false),
    }
}

/// The central algorithm of the runtime ([4.D]): a lazily-maintained,
/// per-stream iterator over a globally ordered log. All mutating methods
/// hold `ctx`'s mutex for their full duration, including calls out to the
/// log client and sequencer ([5. CONCURRENCY & RESOURCE MODEL]).
pub struct QueuedStreamView {
    stream_id: StreamId,
    log: Arc<dyn LogClient>,
    sequencer: Arc<dyn SequencerClient>,
    discovery: Box<dyn AddressDiscoveryStrategy>,
    trim_policy: TrimPolicy,
    ctx: Mutex<StreamContext>,
}

impl QueuedStreamView {
    pub fn new(
        stream_id: StreamId,
        log: Arc<dyn LogClient>,
        sequencer: Arc<dyn SequencerClient>,
        discovery: Box<dyn AddressDiscoveryStrategy>,
        trim_policy: TrimPolicy,
    ) -> Self {
        trace!(target: "logrt", stream = %stream_id, strategy = discovery.name(), "stream view created");
        QueuedStreamView { stream_id, log, sequencer, discovery, trim_policy, ctx: Mutex::new(StreamContext::new()) }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn reset(&self) {
        self.ctx.lock().expect("stream view mutex poisoned").reset();
    }

    pub fn global_pointer(&self) -> GlobalAddress {
        self.ctx.lock().expect("stream view mutex poisoned").global_pointer
    }

    pub fn checkpoint_success(&self) -> Option<CheckpointSuccess> {
        self.ctx.lock().expect("stream view mutex poisoned").checkpoint_success.clone()
    }

    /// The entry at the current forward position, if any has been read yet.
    pub fn current(&self) -> Result<Option<LogEntry>, RuntimeError> {
        let ctx = self.ctx.lock().expect("stream view mutex poisoned");
        if !ctx.global_pointer.is_address() {
            return Ok(None);
        }
        Ok(Some(self.log.read(ctx.global_pointer)?))
    }

    /// [4.D, Filling the read queue]: discovers every candidate address for
    /// this stream between the current position and `max_global`, walking
    /// backward from the stream's tail. Returns whether either queue holds
    /// anything to yield.
    fn fill_read_queue(&self, max_global: GlobalAddress, ctx: &mut StreamContext) -> Result<bool, RuntimeError> {
        let mut streams = BTreeSet::new();
        streams.insert(self.stream_id);
        let token = self.sequencer.token_query(&streams);
        let reported = *token.stream_address_map.get(&self.stream_id).unwrap_or(&GlobalAddress::NON_EXIST);
        let tail = if reported.is_address() { reported.min(max_global) } else { reported };

        if !tail.is_address() || tail <= ctx.global_pointer {
            return Ok(!ctx.read_queue.is_empty() || !ctx.read_cp_queue.is_empty());
        }

        let stop_address = ctx.stop_address();
        let mut current = tail;
        let mut single_step = false;
        let mut walk = CheckpointWalk::default();

        while current.is_address() && current > stop_address {
            let entry = match self.log.read(current) {
                Ok(e) => e,
                Err(RuntimeError::Trimmed { address }) => {
                    if self.trim_policy == TrimPolicy::IgnoreTrimmed {
                        return Ok(!ctx.read_queue.is_empty() || !ctx.read_cp_queue.is_empty());
                    }
                    return Err(RuntimeError::Trimmed { address });
                }
                Err(e) => return Err(e),
            };

            let mut backpointer = None;
            if entry.contains_stream(self.stream_id) {
                backpointer = entry.backpointer(self.stream_id);
                let already_confirmed = ctx.checkpoint_success.is_some();
                let (action, routed_to_cp) = checkpoint_filter(&entry, &mut walk, already_confirmed);
                match action {
                    FilterAction::Include | FilterAction::IncludeStop => {
                        if routed_to_cp {
                            ctx.read_cp_queue.insert(current);
                        } else {
                            ctx.read_queue.insert(current);
                        }
                    }
                    FilterAction::Exclude | FilterAction::ExcludeStop => {}
                }
                if action == FilterAction::IncludeStop {
                    ctx.checkpoint_success = Some(CheckpointSuccess {
                        id: walk.active_id.expect("include-stop implies an active checkpoint"),
                        start_addr: current,
                        end_addr: walk.end_addr.expect("include-stop implies an observed end"),
                        num_entries: walk.count,
                        bytes: walk.bytes,
                        snapshot_address: walk.snapshot_address.expect("include-stop implies a snapshot address"),
                    });
                    break;
                }
                if action == FilterAction::ExcludeStop {
                    break;
                }
            }

            let (next, used_backpointer) = self.discovery.discover_address_space(current, backpointer);
            if used_backpointer {
                if single_step {
                    debug!(target: "logrt", stream = %self.stream_id, address = %current, "leaving single-step scan mode");
                    single_step = false;
                }
            } else if !single_step {
                debug!(target: "logrt", stream = %self.stream_id, address = %current, "entering single-step scan mode");
                single_step = true;
            }
            current = next;
        }

        Ok(!ctx.read_queue.is_empty() || !ctx.read_cp_queue.is_empty())
    }

    /// [4.D, Producing the next entry].
    pub fn next(&self, max_global: GlobalAddress) -> Result<Option<LogEntry>, RuntimeError> {
        let mut ctx = self.ctx.lock().expect("stream view mutex poisoned");
        loop {
            if ctx.read_queue.is_empty() && ctx.read_cp_queue.is_empty() && !self.fill_read_queue(max_global, &mut ctx)? {
                return Ok(None);
            }

            if let Some(&addr) = ctx.read_cp_queue.iter().next() {
                ctx.read_cp_queue.remove(&addr);
                let entry = self.log.read(addr)?;
                if ctx.read_queue.is_empty() {
                    if let Some(cp) = ctx.checkpoint_success.clone() {
                        // Open question in [9. DESIGN NOTES]: fast-forward only
                        // when the checkpoint's end can't exceed max_global;
                        // otherwise advance exactly to its end address.
                        ctx.global_pointer = if cp.end_addr <= max_global { max_global } else { cp.end_addr };
                    }
                }
                return Ok(Some(entry));
            }

            let Some(&addr) = ctx.read_queue.iter().next() else {
                // Queues were non-empty a moment ago but the cp queue just
                // drained to nothing and the read queue is also empty;
                // refill and retry.
                continue;
            };
            if addr > max_global {
                return Ok(None);
            }
            ctx.read_queue.remove(&addr);
            let entry = self.log.read(addr)?;
            if entry.contains_stream(self.stream_id) {
                ctx.global_pointer = addr;
                ctx.resolved_queue.insert(addr);
                ctx.max_resolution = ctx.max_resolution.max(addr);
                return Ok(Some(entry));
            }
            // Address was a candidate that turned out not to belong to the
            // stream (e.g. a different stream's entry read along a shared
            // backpointer chain); drop it and keep going.
        }
    }

    /// [4.D, Bulk next]: fills to `max_global`, parallel-reads every
    /// candidate at or below it, and truncates the batch at the first entry
    /// for which `stop_at` returns true (inclusive).
    pub fn next_batch(
        &self,
        max_global: GlobalAddress,
        mut stop_at: impl FnMut(&LogEntry) -> bool,
    ) -> Result<Vec<LogEntry>, RuntimeError> {
        let mut ctx = self.ctx.lock().expect("stream view mutex poisoned");
        self.fill_read_queue(max_global, &mut ctx)?;

        let candidates: Vec<GlobalAddress> = ctx.read_queue.range(..=max_global).copied().collect();
        let entries = self.log.read_all(&candidates)?;

        let mut batch = Vec::with_capacity(entries.len());
        for (addr, entry) in candidates.iter().zip(entries.into_iter()) {
            ctx.read_queue.remove(addr);
            if !entry.contains_stream(self.stream_id) {
                continue;
            }
            ctx.resolved_queue.insert(*addr);
            ctx.max_resolution = ctx.max_resolution.max(*addr);
            ctx.global_pointer = ctx.global_pointer.max(*addr);
            let stop = stop_at(&entry);
            batch.push(entry);
            if stop {
                break;
            }
        }
        Ok(batch)
    }

    /// Walks backward from just below `ctx.min_resolution` to the start of
    /// the log, resolving every entry belonging to this stream directly
    /// into `resolved_queue`. Used by [`Self::previous`] to extend coverage
    /// earlier than what forward iteration has already resolved.
    fn resolve_downward(&self, ctx: &mut StreamContext) -> Result<(), RuntimeError> {
        if !ctx.min_resolution.is_address() {
            return Ok(());
        }
        let mut current = ctx.min_resolution.pred();
        while current.is_address() {
            let entry = match self.log.read(current) {
                Ok(e) => e,
                Err(RuntimeError::Trimmed { .. }) if self.trim_policy == TrimPolicy::IgnoreTrimmed => break,
                Err(e) => return Err(e),
            };
            let backpointer = entry.backpointer(self.stream_id);
            if entry.contains_stream(self.stream_id) {
                ctx.resolved_queue.insert(current);
                ctx.max_resolution = ctx.max_resolution.max(current);
            }
            let (next, _) = self.discovery.discover_address_space(current, backpointer);
            current = next;
        }
        ctx.min_resolution = GlobalAddress::NON_ADDRESS;
        Ok(())
    }

    /// [4.D, Reverse iteration].
    pub fn previous(&self) -> Result<Option<LogEntry>, RuntimeError> {
        let mut ctx = self.ctx.lock().expect("stream view mutex poisoned");
        loop {
            let prev_addr = ctx.resolved_queue.range(..ctx.global_pointer).next_back().copied();
            let need_resolve = match prev_addr {
                Some(addr) => ctx.min_resolution.is_address() && addr < ctx.min_resolution,
                None => ctx.min_resolution.is_address(),
            };
            if need_resolve {
                self.resolve_downward(&mut ctx)?;
                continue;
            }
            let Some(prev_addr) = prev_addr else {
                return Ok(None);
            };
            if ctx.global_pointer.is_address() {
                ctx.read_queue.insert(ctx.global_pointer);
            }
            ctx.global_pointer = prev_addr;
            return Ok(Some(self.log.read(prev_addr)?));
        }
    }

    /// Ensures the stream view has resolved everything up to and including
    /// `bound`, by repeatedly calling [`Self::next`].
    fn remaining_up_to(&self, bound: GlobalAddress) -> Result<(), RuntimeError> {
        while self.next(bound)?.is_some() {}
        Ok(())
    }

    /// [4.D, Search].
    pub fn find(&self, addr: GlobalAddress, dir: Direction, inclusive: bool) -> Result<GlobalAddress, RuntimeError> {
        self.remaining_up_to(addr.succ())?;
        let ctx = self.ctx.lock().expect("stream view mutex poisoned");
        if inclusive && ctx.resolved_queue.contains(&addr) {
            return Ok(addr);
        }
        let found = match dir {
            Direction::Forward => ctx.resolved_queue.range(addr.succ()..).next().copied(),
            Direction::Backward => ctx.resolved_queue.range(..addr).next_back().copied(),
        };
        Ok(found.unwrap_or(GlobalAddress::NOT_FOUND))
    }

    /// [4.D, Seek]: after a seek, entries at or above the new position must
    /// be re-yielded by forward iteration, so they move back from
    /// `resolved_queue` into `read_queue`.
    pub fn seek(&self, addr: GlobalAddress) {
        let mut ctx = self.ctx.lock().expect("stream view mutex poisoned");
        ctx.read_queue.retain(|&a| a >= addr);
        let moved: Vec<GlobalAddress> = ctx.resolved_queue.range(addr..).copied().collect();
        for a in &moved {
            ctx.resolved_queue.remove(a);
            ctx.read_queue.insert(*a);
        }
        ctx.global_pointer = addr.pred();
        // Open question in [9. DESIGN NOTES]: clamp so min_resolution never
        // exceeds max_resolution, rather than letting a seek past the
        // known tail push it out ahead.
        ctx.min_resolution = addr.min(ctx.max_resolution);
        trace!(target: "logrt", stream = %self.stream_id, %addr, "seek");
    }
}

#[cfg(test)]
mod test;
