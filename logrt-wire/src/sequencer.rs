// Sequencer protocol: request kinds encoded as single byte + body, per
// [6. EXTERNAL INTERFACES].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use logrt_base::{BackpointerMap, GlobalAddress, StreamId};

/// The single-byte request kind tag. `Stream` and `MultiStream` share a
/// body shape (count + stream set); the source protocol distinguishes them
/// only to let a single-stream client skip building a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestKind {
    Query = 0,
    Raw = 1,
    Stream = 2,
    MultiStream = 3,
    Tx = 4,
}

/// A snapshot of the transaction's dependencies, consumed by the sequencer
/// to decide commit vs. abort: [4.C Sequencer client].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResolutionInfo {
    pub read_timestamp: GlobalAddress,
    pub read_set: BTreeSet<StreamId>,
    pub write_set: BTreeSet<StreamId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerRequest {
    /// No-allocation peek at the current tails.
    Query { streams: BTreeSet<StreamId> },
    /// Allocate `count` raw global addresses with no stream association.
    Raw { count: u64 },
    /// Allocate `count` addresses for one or more streams.
    MultiStream { count: u64, streams: BTreeSet<StreamId> },
    /// As `MultiStream`, but first checked against `resolution` for
    /// conflicts with committed writes.
    Tx { count: u64, streams: BTreeSet<StreamId>, resolution: TxResolutionInfo },
}

impl SequencerRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            SequencerRequest::Query { .. } => RequestKind::Query,
            SequencerRequest::Raw { .. } => RequestKind::Raw,
            SequencerRequest::MultiStream { .. } => RequestKind::MultiStream,
            SequencerRequest::Tx { .. } => RequestKind::Tx,
        }
    }
}

/// The sequencer's token: a write permission bundling the allocated
/// address (or stream tails for a `Query`), the epoch it was issued under,
/// and backpointers for each stream it touched. See [3. DATA MODEL].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub epoch: u64,
    pub global_address: GlobalAddress,
    pub backpointer_map: BackpointerMap,
    pub stream_address_map: BTreeMap<StreamId, GlobalAddress>,
}

impl Token {
    pub fn tail_only(epoch: u64, stream_address_map: BTreeMap<StreamId, GlobalAddress>) -> Self {
        Token {
            epoch,
            global_address: GlobalAddress::NON_ADDRESS,
            backpointer_map: BackpointerMap::new(),
            stream_address_map,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerResponse {
    Token(Token),
    AbortedTransaction { reason: String },
    /// The caller's view of the epoch is stale, e.g. after a layout change;
    /// mirrors [`logrt_wire::WireErrorCode::WrongEpoch`] at the
    /// request/response layer instead of the replication-handshake layer.
    WrongEpoch { expected: u64, found: u64 },
}
