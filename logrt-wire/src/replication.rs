// Replication wire format, per [6. EXTERNAL INTERFACES]: a stream of
// `LogReplicationEntry` messages exchanged between an active cluster and a
// standby by the transport adapter [4.G] on behalf of the FSM [4.F].

use serde::{Deserialize, Serialize};

use logrt_base::GlobalAddress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogReplicationMsgType {
    SnapshotStart,
    SnapshotMessage,
    SnapshotEnd,
    LogEntry,
    Heartbeat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogReplicationEntry {
    pub msg_type: LogReplicationMsgType,
    pub epoch: u64,
    pub timestamp: GlobalAddress,
    pub snapshot_timestamp: GlobalAddress,
    pub payload: Vec<u8>,
    pub ack: bool,
}

impl LogReplicationEntry {
    pub fn heartbeat(epoch: u64, timestamp: GlobalAddress) -> Self {
        LogReplicationEntry {
            msg_type: LogReplicationMsgType::Heartbeat,
            epoch,
            timestamp,
            snapshot_timestamp: GlobalAddress::NON_ADDRESS,
            payload: Vec::new(),
            ack: false,
        }
    }
}

/// The error-code taxonomy carried on the replication and log-unit wire
/// protocols, distinct from the client-local [`logrt_base::RuntimeError`]
/// used once a response has been decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorCode {
    WrongEpoch,
    WrongClusterId,
    NotReady,
    ErrorServerException,
    Ack,
    Nack,
}
