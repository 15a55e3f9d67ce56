// Replication transport adapter: [4.G]. An opaque duplex stream of
// `LogReplicationEntry` messages; connection lifecycle is
// reconnect-until-shutdown, and every close replaces the outstanding
// "connection future" with a fresh pending one so a caller awaiting it sees
// disconnection rather than racing the next reconnect attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use logrt_base::RuntimeError;
use logrt_wire::LogReplicationEntry;

enum Slot {
    Pending,
    Resolved(Result<(), RuntimeError>),
}

struct Shared {
    slot: Mutex<Slot>,
    condvar: Condvar,
}

/// Resolves exactly once, when the connection instance it was issued for
/// closes. See [4.G Replication transport adapter].
#[derive(Clone)]
pub struct ConnectionFuture {
    shared: Arc<Shared>,
}

impl ConnectionFuture {
    fn pending() -> Self {
        ConnectionFuture { shared: Arc::new(Shared { slot: Mutex::new(Slot::Pending), condvar: Condvar::new() }) }
    }

    fn resolve(&self, result: Result<(), RuntimeError>) {
        let mut slot = self.shared.slot.lock().expect("connection future mutex poisoned");
        *slot = Slot::Resolved(result);
        self.shared.condvar.notify_all();
    }

    /// Blocks the calling thread until this connection instance closes.
    pub fn wait(&self) -> Result<(), RuntimeError> {
        let mut slot = self.shared.slot.lock().expect("connection future mutex poisoned");
        loop {
            match &*slot {
                Slot::Resolved(r) => return r.clone(),
                Slot::Pending => {
                    slot = self.shared.condvar.wait(slot).expect("connection future mutex poisoned");
                }
            }
        }
    }
}

/// One connected duplex session. `send` may block on I/O ([5. CONCURRENCY &
/// RESOURCE MODEL]); `closed` resolves once this particular session ends,
/// for whatever reason.
pub trait ReplicationTransport: Send + Sync {
    fn send(&self, msg: LogReplicationEntry) -> Result<(), RuntimeError>;
    fn set_receiver(&self, receiver: Box<dyn Fn(LogReplicationEntry) + Send + Sync>);
    fn closed(&self) -> ConnectionFuture;
}

/// Establishes a new [`ReplicationTransport`] session, e.g. by opening a
/// socket and performing a handshake.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ReplicationTransport>, RuntimeError>;
}

struct CurrentSession {
    transport: Option<Arc<dyn ReplicationTransport>>,
    future: ConnectionFuture,
}

/// Drives the reconnect-until-shutdown lifecycle over a [`Connector`].
/// [`Self::run`] blocks the calling thread, so it's meant to be driven on
/// its own worker thread.
pub struct ReconnectingTransport {
    connector: Arc<dyn Connector>,
    retry_interval: Duration,
    current: Mutex<CurrentSession>,
    shutdown: Arc<AtomicBool>,
}

impl ReconnectingTransport {
    pub fn new(connector: Arc<dyn Connector>, retry_interval: Duration) -> Self {
        ReconnectingTransport {
            connector,
            retry_interval,
            current: Mutex::new(CurrentSession { transport: None, future: ConnectionFuture::pending() }),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The future for whatever connection instance is current right now;
    /// callers that want to notice the *next* disconnection should fetch
    /// this again after each resolution rather than caching it.
    pub fn connection_future(&self) -> ConnectionFuture {
        self.current.lock().expect("transport mutex poisoned").future.clone()
    }

    pub fn send(&self, msg: LogReplicationEntry) -> Result<(), RuntimeError> {
        let guard = self.current.lock().expect("transport mutex poisoned");
        match &guard.transport {
            Some(t) => t.send(msg),
            None => Err(RuntimeError::Network("no active replication connection".to_string())),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let guard = self.current.lock().expect("transport mutex poisoned");
        guard.future.resolve(Ok(()));
    }

    /// Runs the reconnect loop on the calling thread until [`Self::shutdown`]
    /// is called.
    pub fn run(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let transport = match self.connector.connect() {
                Ok(t) => t,
                Err(e) => {
                    warn!(target: "logrt", error = %e, "replication connection attempt failed, retrying");
                    thread::sleep(self.retry_interval);
                    continue;
                }
            };
            let closed = transport.closed();
            {
                let mut guard = self.current.lock().expect("transport mutex poisoned");
                guard.transport = Some(transport);
                guard.future = closed.clone();
            }
            let outcome = closed.wait();
            debug!(target: "logrt", ?outcome, "replication connection closed");
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(self.retry_interval);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use logrt_base::GlobalAddress;
    use test_log::test;

    struct FakeTransport {
        sent: StdMutex<Vec<LogReplicationEntry>>,
        closed: ConnectionFuture,
    }

    impl ReplicationTransport for FakeTransport {
        fn send(&self, msg: LogReplicationEntry) -> Result<(), RuntimeError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
        fn set_receiver(&self, _receiver: Box<dyn Fn(LogReplicationEntry) + Send + Sync>) {}
        fn closed(&self) -> ConnectionFuture {
            self.closed.clone()
        }
    }

    /// Builds a brand-new [`FakeTransport`] (with a fresh, still-pending
    /// [`ConnectionFuture`]) on every [`Connector::connect`] call, the way a
    /// real connector hands out a new session on every reconnect, and keeps
    /// every transport it ever created so tests can inspect them.
    struct FakeConnector {
        created: StdMutex<Vec<Arc<FakeTransport>>>,
    }
    impl FakeConnector {
        fn new() -> Self {
            FakeConnector { created: StdMutex::new(Vec::new()) }
        }
        fn transports(&self) -> Vec<Arc<FakeTransport>> {
            self.created.lock().unwrap().clone()
        }
    }
    impl Connector for FakeConnector {
        fn connect(&self) -> Result<Arc<dyn ReplicationTransport>, RuntimeError> {
            let transport =
                Arc::new(FakeTransport { sent: StdMutex::new(Vec::new()), closed: ConnectionFuture::pending() });
            self.created.lock().unwrap().push(transport.clone());
            Ok(transport)
        }
    }

    #[test]
    fn send_goes_to_the_current_session() {
        let connector = Arc::new(FakeConnector::new());
        let reconnecting = Arc::new(ReconnectingTransport::new(connector.clone(), Duration::from_millis(5)));

        let driver = reconnecting.clone();
        let handle = thread::spawn(move || driver.run());
        thread::sleep(Duration::from_millis(20));

        reconnecting.send(LogReplicationEntry::heartbeat(1, GlobalAddress::new(0))).unwrap();
        let transports = connector.transports();
        assert_eq!(transports.len(), 1);
        assert_eq!(transports[0].sent.lock().unwrap().len(), 1);

        reconnecting.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn connection_future_resolves_on_close_and_is_replaced_on_reconnect() {
        let connector = Arc::new(FakeConnector::new());
        let reconnecting = Arc::new(ReconnectingTransport::new(connector.clone(), Duration::from_millis(5)));

        let driver = reconnecting.clone();
        let handle = thread::spawn(move || driver.run());
        thread::sleep(Duration::from_millis(20));

        let first_future = reconnecting.connection_future();
        let first_transport = connector.transports().into_iter().next().expect("first connection made");
        first_transport.closed.resolve(Ok(()));
        first_future.wait().unwrap();

        thread::sleep(Duration::from_millis(20));
        let second_future = reconnecting.connection_future();
        // A fresh connection replaces the future rather than reusing the
        // already-resolved one.
        assert!(!Arc::ptr_eq(&first_future.shared, &second_future.shared));
        assert_eq!(connector.transports().len(), 2);

        reconnecting.shutdown();
        handle.join().unwrap();
    }
}
