//! The log client ([4.B]): single-address `read`, batched `readAll`,
//! on-demand `fillHole`, and stream-scoped `trim`. Concrete wire transport
//! to log-unit servers is out of scope ([1. PURPOSE & SCOPE]); this crate
//! defines the client-facing contract and an in-memory double that
//! satisfies it, used by the stream view and its tests.

mod memory;

pub use memory::InMemoryLogUnit;

use std::collections::BTreeSet;

use logrt_base::{GlobalAddress, RuntimeError, StreamId};
use logrt_wire::{LogEntry, WriteResult};

/// The client-facing contract of a log unit. `read` of a never-written
/// address returns an `Empty` entry rather than an error; callers that need
/// to force progress past a hole call `fill_hole` explicitly. `read` of a
/// trimmed address returns `Err(RuntimeError::Trimmed)`.
pub trait LogClient: Send + Sync {
    fn read(&self, address: GlobalAddress) -> Result<LogEntry, RuntimeError>;

    /// Parallel fetch of several addresses, returned in the same order as
    /// `addresses` regardless of completion order. Implementations
    /// typically just call [`parallel_read_all`].
    fn read_all(&self, addresses: &[GlobalAddress]) -> Result<Vec<LogEntry>, RuntimeError>;

    fn write(
        &self,
        address: GlobalAddress,
        streams: BTreeSet<StreamId>,
        payload: Vec<u8>,
    ) -> Result<WriteResult, RuntimeError>;

    fn fill_hole(&self, address: GlobalAddress) -> Result<(), RuntimeError>;

    fn trim(&self, stream: StreamId, address: GlobalAddress) -> Result<(), RuntimeError>;
}

/// Fans out one OS thread per address and joins them back in input order,
/// matching the "parallel OS threads" scheduling model of [5. CONCURRENCY &
/// RESOURCE MODEL]. Shared by every [`LogClient`] implementation's
/// `read_all`.
pub fn parallel_read_all(
    client: &(impl LogClient + ?Sized),
    addresses: &[GlobalAddress],
) -> Result<Vec<LogEntry>, RuntimeError> {
    let mut results: Vec<Option<Result<LogEntry, RuntimeError>>> =
        (0..addresses.len()).map(|_| None).collect();
    std::thread::scope(|scope| {
        let handles: Vec<_> =
            addresses.iter().map(|addr| scope.spawn(move || client.read(*addr))).collect();
        for (slot, handle) in results.iter_mut().zip(handles) {
            *slot = Some(
                handle
                    .join()
                    .unwrap_or_else(|_| Err(RuntimeError::Network("reader thread panicked".to_string()))),
            );
        }
    });
    results.into_iter().map(|r| r.expect("every slot filled")).collect()
}
