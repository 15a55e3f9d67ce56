//! The queued stream view ([4.D]): a lazy, per-stream iterator over the
//! shared log, built from a [`logrt_log::LogClient`] and a
//! [`logrt_sequencer::SequencerClient`].

mod context;
mod discovery;
mod view;

pub use context::{CheckpointSuccess, StreamContext};
pub use discovery::{AddressDiscoveryStrategy, BackpointerDiscovery, LinearScanDiscovery};
pub use view::{QueuedStreamView, TrimPolicy};
