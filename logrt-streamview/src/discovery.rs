// Replaces the source runtime's deep inheritance
// (`AbstractQueuedStreamView` -> `BackpointerStreamView`, see [9. DESIGN
// NOTES]) with a single algorithm parameterized over an address-discovery
// strategy: one method deciding how the backward fill walk steps from one
// candidate address to the next.

use logrt_base::GlobalAddress;

/// How [`crate::QueuedStreamView::fill_read_queue`] steps backward through
/// the log while discovering addresses that might belong to a stream.
pub trait AddressDiscoveryStrategy: Send + Sync {
    /// Given the address just examined and, if one was present and usable,
    /// the entry's backpointer for the stream in question, return the next
    /// address to examine and whether the backpointer was actually taken.
    fn discover_address_space(
        &self,
        current: GlobalAddress,
        backpointer: Option<GlobalAddress>,
    ) -> (GlobalAddress, bool);

    fn name(&self) -> &'static str;
}

/// Jump via backpointers when available, falling back to a single-step
/// decrement otherwise (e.g. for entries predating backpointer support, or
/// holes with no stream association at all).
#[derive(Default)]
pub struct BackpointerDiscovery;

impl AddressDiscoveryStrategy for BackpointerDiscovery {
    fn discover_address_space(
        &self,
        current: GlobalAddress,
        backpointer: Option<GlobalAddress>,
    ) -> (GlobalAddress, bool) {
        match backpointer {
            Some(bp) => (bp, true),
            None => (current.pred(), false),
        }
    }

    fn name(&self) -> &'static str {
        "backpointer"
    }
}

/// Pure linear scan, ignoring any backpointers present. Used when the
/// stream view's `backpointersDisabled` policy is set; must produce the
/// same output as [`BackpointerDiscovery`], just more slowly.
#[derive(Default)]
pub struct LinearScanDiscovery;

impl AddressDiscoveryStrategy for LinearScanDiscovery {
    fn discover_address_space(
        &self,
        current: GlobalAddress,
        _backpointer: Option<GlobalAddress>,
    ) -> (GlobalAddress, bool) {
        (current.pred(), false)
    }

    fn name(&self) -> &'static str {
        "linear-scan"
    }
}
