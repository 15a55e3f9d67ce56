mod config;
mod logunit;
mod replication;
mod sequencer;

pub use config::{RuntimeConfig, SaslConfig, SocketType, TlsConfig};
pub use logunit::{CheckpointMeta, CheckpointPart, EntryKind, LogEntry, LogUnitRequest, LogUnitResponse, WriteResult};
pub use replication::{LogReplicationEntry, LogReplicationMsgType, WireErrorCode};
pub use sequencer::{RequestKind, SequencerRequest, SequencerResponse, Token, TxResolutionInfo};
