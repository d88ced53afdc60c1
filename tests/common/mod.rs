//! In-memory transport for exercising the connection manager.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use spp_chat::bluetooth::{Acceptor, ConnectionManager, PeerIdentity, Transport};
use spp_chat::config::LinkConfig;
use spp_chat::events::EventReceiver;
use spp_chat::{ConnectionState, LinkEvent};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// How a dial to a given address behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialPlan {
    Succeed,
    Fail,
    Hang,
}

/// Resource transitions seen by the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    ListenOpened,
    ListenClosed,
    DialStarted(String),
    DialEnded(String),
    StreamOpened(u64),
    StreamClosed(u64),
}

#[derive(Debug, Default)]
pub struct Journal {
    pub ops: Vec<Op>,
    pub live_handles: i32,
    pub max_handles: i32,
    pub live_streams: i32,
    pub max_streams: i32,
    next_stream: u64,
}

impl Journal {
    fn record(&mut self, op: Op) {
        match op {
            Op::ListenOpened | Op::DialStarted(_) => {
                self.live_handles += 1;
                self.max_handles = self.max_handles.max(self.live_handles);
            }
            Op::ListenClosed | Op::DialEnded(_) => self.live_handles -= 1,
            Op::StreamOpened(_) => {
                self.live_streams += 1;
                self.max_streams = self.max_streams.max(self.live_streams);
            }
            Op::StreamClosed(_) => self.live_streams -= 1,
        }
        self.ops.push(op);
    }
}

struct Shared {
    journal: Mutex<Journal>,
    plans: Mutex<HashMap<String, DialPlan>>,
    remotes: Mutex<HashMap<String, DuplexStream>>,
    listen_failures: Mutex<u32>,
    accept_failures: Mutex<u32>,
    read_fault: Mutex<bool>,
    write_fault: Mutex<bool>,
    inbound_tx: mpsc::UnboundedSender<(DuplexStream, PeerIdentity)>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(DuplexStream, PeerIdentity)>>,
}

impl Shared {
    fn record(&self, op: Op) {
        self.journal.lock().record(op);
    }

    fn track(self: &Arc<Self>, inner: DuplexStream) -> TrackedStream {
        let id = {
            let mut journal = self.journal.lock();
            journal.next_stream += 1;
            let id = journal.next_stream;
            journal.record(Op::StreamOpened(id));
            id
        };
        TrackedStream {
            id,
            inner,
            shared: self.clone(),
        }
    }
}

/// Stream that records its own closing.
pub struct TrackedStream {
    pub id: u64,
    inner: DuplexStream,
    shared: Arc<Shared>,
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.shared.record(Op::StreamClosed(self.id));
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if *self.shared.read_fault.lock() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "link lost",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if *self.shared.write_fault.lock() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link lost",
            )));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

pub struct FakeAcceptor {
    shared: Arc<Shared>,
}

impl Drop for FakeAcceptor {
    fn drop(&mut self) {
        self.shared.record(Op::ListenClosed);
    }
}

#[async_trait]
impl Acceptor for FakeAcceptor {
    type Stream = TrackedStream;

    async fn accept(&mut self) -> io::Result<(TrackedStream, PeerIdentity)> {
        {
            let mut failures = self.shared.accept_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "socket went away"));
            }
        }
        let mut inbound = self.shared.inbound_rx.lock().await;
        match inbound.recv().await {
            Some((stream, peer)) => Ok((self.shared.track(stream), peer)),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "inbound closed")),
        }
    }
}

struct DialGuard {
    address: String,
    shared: Arc<Shared>,
}

impl Drop for DialGuard {
    fn drop(&mut self) {
        self.shared.record(Op::DialEnded(self.address.clone()));
    }
}

/// Transport double. Clones share the same journal and remotes.
#[derive(Clone)]
pub struct FakeTransport {
    shared: Arc<Shared>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                journal: Mutex::new(Journal::default()),
                plans: Mutex::new(HashMap::new()),
                remotes: Mutex::new(HashMap::new()),
                listen_failures: Mutex::new(0),
                accept_failures: Mutex::new(0),
                read_fault: Mutex::new(false),
                write_fault: Mutex::new(false),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            }),
        }
    }

    pub fn plan(&self, address: &str, plan: DialPlan) {
        self.shared.plans.lock().insert(address.to_string(), plan);
    }

    pub fn fail_next_listens(&self, count: u32) {
        *self.shared.listen_failures.lock() = count;
    }

    /// Make the next `count` accepts on an open handle fail.
    pub fn fail_next_accepts(&self, count: u32) {
        *self.shared.accept_failures.lock() = count;
    }

    /// Make every read on tracked streams fail from now on.
    pub fn break_reads(&self) {
        *self.shared.read_fault.lock() = true;
    }

    /// Make every write on tracked streams fail from now on.
    pub fn break_writes(&self) {
        *self.shared.write_fault.lock() = true;
    }

    /// Simulate `peer` dialing us. Returns the remote end of the stream.
    pub fn dial_in(&self, peer: PeerIdentity) -> DuplexStream {
        let (local, remote) = duplex(4096);
        let _ = self.shared.inbound_tx.send((local, peer));
        remote
    }

    /// A stream pair outside the listener, for `accepted_stream`.
    pub fn stream_pair(&self) -> (TrackedStream, DuplexStream) {
        let (local, remote) = duplex(4096);
        (self.shared.track(local), remote)
    }

    /// Remote end of the last successful dial to `address`.
    pub fn take_remote(&self, address: &str) -> Option<DuplexStream> {
        self.shared.remotes.lock().remove(address)
    }

    pub fn ops(&self) -> Vec<Op> {
        self.shared.journal.lock().ops.clone()
    }

    pub fn with_journal<R>(&self, f: impl FnOnce(&Journal) -> R) -> R {
        f(&self.shared.journal.lock())
    }

    pub fn dial_started(&self, address: &str) -> bool {
        self.ops()
            .iter()
            .any(|op| *op == Op::DialStarted(address.to_string()))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Stream = TrackedStream;
    type Acceptor = FakeAcceptor;

    async fn listen(&self) -> io::Result<FakeAcceptor> {
        {
            let mut failures = self.shared.listen_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "adapter busy"));
            }
        }
        self.shared.record(Op::ListenOpened);
        Ok(FakeAcceptor {
            shared: self.shared.clone(),
        })
    }

    async fn connect(&self, peer: &PeerIdentity) -> io::Result<TrackedStream> {
        let plan = self
            .shared
            .plans
            .lock()
            .get(&peer.address)
            .copied()
            .unwrap_or(DialPlan::Succeed);

        self.shared.record(Op::DialStarted(peer.address.clone()));
        let _guard = DialGuard {
            address: peer.address.clone(),
            shared: self.shared.clone(),
        };

        match plan {
            DialPlan::Succeed => {}
            DialPlan::Fail => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            }
            DialPlan::Hang => std::future::pending::<()>().await,
        }

        let (local, remote) = duplex(4096);
        self.shared
            .remotes
            .lock()
            .insert(peer.address.clone(), remote);
        Ok(self.shared.track(local))
    }
}

pub fn fast_config() -> LinkConfig {
    LinkConfig {
        accept_retry_delay_ms: 10,
        accept_failure_threshold: 3,
        read_buffer_size: 1024,
    }
}

pub fn manager() -> (ConnectionManager<FakeTransport>, FakeTransport, EventReceiver) {
    manager_with(fast_config())
}

pub fn manager_with(
    config: LinkConfig,
) -> (ConnectionManager<FakeTransport>, FakeTransport, EventReceiver) {
    let transport = FakeTransport::new();
    let mut manager = ConnectionManager::new(transport.clone(), config);
    let events = manager.take_event_receiver().unwrap();
    (manager, transport, events)
}

pub async fn next_event(events: &mut EventReceiver) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub async fn assert_quiet(events: &mut EventReceiver) {
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        panic!("unexpected event: {:?}", event);
    }
}

pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub async fn wait_for_state(manager: &ConnectionManager<FakeTransport>, state: ConnectionState) {
    wait_for(|| manager.current_state() == state).await;
}

/// Handle opens and closes (listeners and dials) must strictly alternate.
pub fn assert_handles_alternate(ops: &[Op]) {
    let mut open = false;
    for op in ops {
        match op {
            Op::ListenOpened | Op::DialStarted(_) => {
                assert!(!open, "handle opened while another was open: {:?}", ops);
                open = true;
            }
            Op::ListenClosed | Op::DialEnded(_) => {
                assert!(open, "handle closed twice: {:?}", ops);
                open = false;
            }
            _ => {}
        }
    }
}

/// Every stream that was opened has been closed exactly once.
pub fn assert_streams_closed_once(ops: &[Op]) {
    let mut counts: HashMap<u64, (u32, u32)> = HashMap::new();
    for op in ops {
        match op {
            Op::StreamOpened(id) => counts.entry(*id).or_default().0 += 1,
            Op::StreamClosed(id) => counts.entry(*id).or_default().1 += 1,
            _ => {}
        }
    }
    for (id, (opened, closed)) in counts {
        assert_eq!((opened, closed), (1, 1), "stream {} open/close counts", id);
    }
}

pub fn position(ops: &[Op], op: &Op) -> usize {
    ops.iter()
        .position(|o| o == op)
        .unwrap_or_else(|| panic!("{:?} not in {:?}", op, ops))
}

pub fn count(ops: &[Op], op: &Op) -> usize {
    ops.iter().filter(|o| *o == op).count()
}
