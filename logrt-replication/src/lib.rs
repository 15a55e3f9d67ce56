//! Log replication ([4.F], [4.G]): the finite-state machine governing
//! snapshot vs. incremental sync between an active and standby cluster, and
//! the transport adapter carrying its wire traffic.

mod fsm;
mod transport;

pub use fsm::{DeltaFollower, ReplicationEvent, ReplicationFsm, ReplicationState, SnapshotReader};
pub use transport::{Connector, ConnectionFuture, ReconnectingTransport, ReplicationTransport};
