// Log-replication finite-state machine: [4.F Log-replication FSM]. Every
// transition is processed on a single dispatcher thread so that
// `process_event -> on_exit(old) -> on_entry(new)` is atomic; action tasks
// (snapshot reader, delta follower) run on their own threads and only ever
// communicate back by enqueueing events, never by touching FSM state
// directly ([5. CONCURRENCY & RESOURCE MODEL]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicationState {
    Initialized,
    InSnapshotSync,
    InLogEntrySync,
    InRequireSnapshotSync,
    Stopped,
}

impl ReplicationState {
    pub fn is_terminal(self) -> bool {
        self == ReplicationState::Stopped
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicationEvent {
    SnapshotSyncRequest,
    SnapshotSyncCancel,
    StartLogEntrySync,
    /// Emitted by the snapshot-reader task on success; has the same effect
    /// as `StartLogEntrySync` from `InSnapshotSync`.
    SnapshotSyncComplete,
    TrimmedException,
    LeadershipLost,
    LogReplicationStop,
}

fn transition(state: ReplicationState, event: ReplicationEvent) -> Option<ReplicationState> {
    use ReplicationEvent::*;
    use ReplicationState::*;
    match (state, event) {
        (Initialized, SnapshotSyncRequest) => Some(InSnapshotSync),
        (Initialized, StartLogEntrySync) => Some(InLogEntrySync),
        (Initialized, LogReplicationStop) => Some(Stopped),

        (InSnapshotSync, SnapshotSyncRequest) => Some(InSnapshotSync),
        (InSnapshotSync, SnapshotSyncCancel) => Some(InRequireSnapshotSync),
        (InSnapshotSync, TrimmedException) => Some(InRequireSnapshotSync),
        (InSnapshotSync, LeadershipLost) => Some(Initialized),
        (InSnapshotSync, StartLogEntrySync) => Some(InLogEntrySync),
        (InSnapshotSync, SnapshotSyncComplete) => Some(InLogEntrySync),
        (InSnapshotSync, LogReplicationStop) => Some(Stopped),

        (InLogEntrySync, TrimmedException) => Some(InRequireSnapshotSync),
        (InLogEntrySync, SnapshotSyncRequest) => Some(InSnapshotSync),
        (InLogEntrySync, LeadershipLost) => Some(Initialized),
        (InLogEntrySync, LogReplicationStop) => Some(Stopped),

        (InRequireSnapshotSync, SnapshotSyncRequest) => Some(InSnapshotSync),
        (InRequireSnapshotSync, LeadershipLost) => Some(Initialized),
        (InRequireSnapshotSync, LogReplicationStop) => Some(Stopped),

        _ => None,
    }
}

/// Streams all tables at a pinned log address to the peer. Implementations
/// must check `cancelled` periodically and return promptly once it is set.
pub trait SnapshotReader: Send + Sync {
    fn run(&self, cancelled: Arc<AtomicBool>, events: Sender<ReplicationEvent>);
}

/// Continuously streams incremental deltas to the peer once a snapshot has
/// brought it up to date.
pub trait DeltaFollower: Send + Sync {
    fn run(&self, cancelled: Arc<AtomicBool>, events: Sender<ReplicationEvent>);
}

/// Drives [4.F]'s state machine. Construct with [`ReplicationFsm::new`],
/// then run [`ReplicationFsm::dispatch_forever`] on a dedicated thread with
/// the paired receiver; other threads (or the action tasks themselves) feed
/// events in through the paired sender.
pub struct ReplicationFsm {
    state: Mutex<ReplicationState>,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
    snapshot_reader: Arc<dyn SnapshotReader>,
    delta_follower: Arc<dyn DeltaFollower>,
    events_tx: Sender<ReplicationEvent>,
}

impl ReplicationFsm {
    pub fn new(
        snapshot_reader: Arc<dyn SnapshotReader>,
        delta_follower: Arc<dyn DeltaFollower>,
    ) -> (Arc<Self>, Sender<ReplicationEvent>, Receiver<ReplicationEvent>) {
        let (tx, rx) = mpsc::channel();
        let fsm = Arc::new(ReplicationFsm {
            state: Mutex::new(ReplicationState::Initialized),
            cancel: Mutex::new(None),
            snapshot_reader,
            delta_follower,
            events_tx: tx.clone(),
        });
        (fsm, tx, rx)
    }

    pub fn state(&self) -> ReplicationState {
        *self.state.lock().expect("fsm mutex poisoned")
    }

    /// Runs the dispatcher loop on the calling thread until the FSM reaches
    /// `Stopped` or the sender side is dropped.
    pub fn dispatch_forever(self: &Arc<Self>, events: Receiver<ReplicationEvent>) {
        for event in events {
            self.process_event(event);
            if self.state().is_terminal() {
                break;
            }
        }
    }

    pub fn process_event(self: &Arc<Self>, event: ReplicationEvent) {
        let mut state = self.state.lock().expect("fsm mutex poisoned");
        let old = *state;
        match transition(old, event) {
            None => {
                debug!(target: "logrt", ?old, ?event, "unknown event for this state, ignored");
            }
            Some(new_state) => {
                self.on_exit(old);
                *state = new_state;
                info!(target: "logrt", ?old, ?new_state, ?event, "replication state transition");
                self.on_entry(new_state);
            }
        }
    }

    /// Cancels whatever action task is running for `old`, whether the FSM
    /// is leaving that state entirely or restarting it from scratch (a
    /// `SNAPSHOT_SYNC_REQUEST` received while already `InSnapshotSync`).
    fn on_exit(&self, old: ReplicationState) {
        if matches!(old, ReplicationState::InSnapshotSync | ReplicationState::InLogEntrySync) {
            if let Some(flag) = self.cancel.lock().expect("cancel mutex poisoned").take() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn on_entry(self: &Arc<Self>, new_state: ReplicationState) {
        match new_state {
            ReplicationState::InSnapshotSync => {
                let flag = Arc::new(AtomicBool::new(false));
                *self.cancel.lock().expect("cancel mutex poisoned") = Some(flag.clone());
                let reader = self.snapshot_reader.clone();
                let events = self.events_tx.clone();
                thread::spawn(move || reader.run(flag, events));
            }
            ReplicationState::InLogEntrySync => {
                let flag = Arc::new(AtomicBool::new(false));
                *self.cancel.lock().expect("cancel mutex poisoned") = Some(flag.clone());
                let follower = self.delta_follower.clone();
                let events = self.events_tx.clone();
                thread::spawn(move || follower.run(flag, events));
            }
            _ => {}
        }
    }
}
