// We want a few things here:
// 1. A way to create a new internal error with a backtrace, for genuine
//    programming-error conditions (invariant violations) that should be
//    fatal rather than recovered from.
// 2. A tagged, matchable error type for the well-known recoverable and
//    logical failure modes of the runtime (trimmed reads, stale epochs,
//    conflicting writes, aborted transactions, ...), so callers can
//    dispatch on the kind without downcasting an opaque error.
// 3. Logging of both kinds through tracing as they're created.

use std::borrow::Cow;
use std::fmt;

use backtrace_error::DynBacktraceError;
use tracing::error;

use crate::GlobalAddress;

#[cfg(test)]
use test_log::test;

/// An internal error, carrying a backtrace to the point it was created.
/// Reserved for conditions that indicate a bug rather than an expected
/// runtime outcome; see [`RuntimeError`] for the latter.
#[derive(Debug)]
pub struct Error(DynBacktraceError);

pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "logrt", "{:?}", err);
        Error(DynBacktraceError::from(err))
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(SimpleErr(msg.into()))
}

/// The tagged error taxonomy of [7. ERROR HANDLING DESIGN]: every failure a
/// caller is expected to branch on, rather than an opaque internal `Error`.
/// This replaces the source runtime's exception hierarchy
/// (`TrimmedException`, `OverwriteException`, ...) with ordinary result
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The requested address has been garbage-collected.
    Trimmed { address: GlobalAddress },
    /// The caller's view of the cluster layout (epoch) is stale.
    WrongEpoch { expected: u64, found: u64 },
    /// Cluster identity mismatch; fatal for the connection.
    WrongCluster,
    /// A competing writer already occupies this address.
    Overwrite { address: GlobalAddress },
    /// The log unit backing this address has no remaining capacity.
    OutOfSpace,
    /// Transient network or transport failure.
    Network(String),
    /// The server isn't ready to serve this request yet.
    ServerNotReady,
    /// The sequencer rejected a transaction's conflict-resolution request.
    TransactionAborted { reason: String },
    /// Replication-local signal that this node is no longer the leader.
    LeadershipLost,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Trimmed { address } => write!(f, "address {address} has been trimmed"),
            RuntimeError::WrongEpoch { expected, found } => {
                write!(f, "wrong epoch: expected {expected}, found {found}")
            }
            RuntimeError::WrongCluster => write!(f, "wrong cluster id"),
            RuntimeError::Overwrite { address } => {
                write!(f, "address {address} was already written by another client")
            }
            RuntimeError::OutOfSpace => write!(f, "log unit is out of space"),
            RuntimeError::Network(msg) => write!(f, "network error: {msg}"),
            RuntimeError::ServerNotReady => write!(f, "server not ready"),
            RuntimeError::TransactionAborted { reason } => {
                write!(f, "transaction aborted: {reason}")
            }
            RuntimeError::LeadershipLost => write!(f, "leadership lost"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    /// True for failures the component that incurred them is expected to
    /// recover from locally (reconnect loops, refresh-and-retry), per the
    /// propagation policy in [7. ERROR HANDLING DESIGN].
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RuntimeError::Network(_) | RuntimeError::ServerNotReady
        )
    }
}

#[test]
fn test_error() {
    let _err = err("test error");
}

#[test]
fn test_runtime_error_display() {
    let e = RuntimeError::Trimmed { address: GlobalAddress::new(5) };
    assert_eq!(format!("{e}"), "address 5 has been trimmed");
    assert!(!e.is_transient());
    assert!(RuntimeError::Network("timeout".into()).is_transient());
}
