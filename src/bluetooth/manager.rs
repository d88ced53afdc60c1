// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection manager.
//!
//! Owns the link state and the single active worker (listener, connector or
//! session). All transitions run on one task, in this order: cancel the old
//! worker, wait for it to release its transport handle, update the state,
//! emit `StateChanged`, spawn the new worker. Workers report back over a
//! channel tagged with their epoch; reports from a replaced worker are
//! dropped, which closes any stream they carry.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connector::run_connector;
use super::listener::run_listener;
use super::session::{run_session, Session, SessionEnd};
use super::transport::{PeerIdentity, Transport};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::events::{EventReceiver, EventSender, LinkEvent};
use crate::state::{ConnectionState, LinkState};

/// Reports from workers to the manager.
pub(crate) enum Report<S> {
    /// The listener accepted an inbound stream.
    Accepted {
        epoch: u64,
        stream: S,
        peer: PeerIdentity,
    },
    /// The listener has failed this many times in a row.
    AcceptFailing {
        epoch: u64,
        failures: u32,
        error: LinkError,
    },
    /// The connector reached its peer.
    Connected {
        epoch: u64,
        stream: S,
        peer: PeerIdentity,
    },
    /// The connector gave up.
    ConnectFailed { epoch: u64, error: LinkError },
    /// The session's stream ended on its own.
    SessionEnded { epoch: u64, end: SessionEnd },
}

impl<S> Report<S> {
    fn epoch(&self) -> u64 {
        match self {
            Report::Accepted { epoch, .. }
            | Report::AcceptFailing { epoch, .. }
            | Report::Connected { epoch, .. }
            | Report::ConnectFailed { epoch, .. }
            | Report::SessionEnded { epoch, .. } => *epoch,
        }
    }
}

pub(crate) type ReportSender<S> = mpsc::UnboundedSender<Report<S>>;

/// Requests from the public surface.
enum Command<S> {
    Start(oneshot::Sender<()>),
    Connect(PeerIdentity, oneshot::Sender<()>),
    Accept(S, PeerIdentity, oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerKind {
    Listener,
    Connector,
    Session,
}

struct Worker {
    kind: WorkerKind,
    epoch: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum Input<S> {
    Command(Command<S>),
    Report(Report<S>),
}

/// Transition loop state. Lives on its own task.
struct ManagerCore<T: Transport> {
    transport: Arc<T>,
    config: LinkConfig,
    state: Arc<LinkState>,
    event_tx: EventSender,
    report_tx: ReportSender<T::Stream>,
    report_rx: mpsc::UnboundedReceiver<Report<T::Stream>>,
    worker: Option<Worker>,
    next_epoch: u64,
}

impl<T: Transport> ManagerCore<T> {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command<T::Stream>>) {
        loop {
            let input = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => break,
                },
                Some(report) = self.report_rx.recv() => Input::Report(report),
            };

            match input {
                Input::Command(command) => self.handle_command(command).await,
                Input::Report(report) => self.handle_report(report).await,
            }
        }

        debug!("Connection manager dropped, shutting down");
        self.enter_none().await;
    }

    async fn handle_command(&mut self, command: Command<T::Stream>) {
        match command {
            Command::Start(reply) => {
                if self.state.get_state() == ConnectionState::None {
                    self.enter_listening().await;
                } else {
                    debug!("Start ignored while {}", self.state.get_state());
                }
                let _ = reply.send(());
            }
            Command::Connect(peer, reply) => {
                self.enter_connecting(peer).await;
                let _ = reply.send(());
            }
            Command::Accept(stream, peer, reply) => {
                self.promote_inbound(stream, peer).await;
                let _ = reply.send(());
            }
            Command::Stop(reply) => {
                self.enter_none().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_report(&mut self, report: Report<T::Stream>) {
        if !self.is_current(report.epoch()) {
            debug!(epoch = report.epoch(), "Discarding report from retired worker");
            return;
        }

        match report {
            Report::Accepted { stream, peer, .. } => {
                self.promote_inbound(stream, peer).await;
            }
            Report::AcceptFailing {
                failures, error, ..
            } => {
                error!("Listener failed {} times in a row: {}", failures, error);
                self.emit(LinkEvent::Notification(error.to_string()));
            }
            Report::Connected { stream, peer, .. } => {
                self.enter_connected(stream, peer).await;
            }
            Report::ConnectFailed { error, .. } => {
                self.emit(LinkEvent::Notification(error.to_string()));
                self.enter_listening().await;
            }
            Report::SessionEnded { end, .. } => {
                match end {
                    SessionEnd::Fault(e) => warn!("Device connection was lost: {}", e),
                    _ => info!("Device disconnected"),
                }
                self.enter_listening().await;
            }
        }
    }

    /// Inbound connections only replace a listener or a pending dial.
    async fn promote_inbound(&mut self, stream: T::Stream, peer: PeerIdentity) {
        match self.state.get_state() {
            ConnectionState::Listening | ConnectionState::Connecting => {
                self.enter_connected(stream, peer).await;
            }
            state @ (ConnectionState::None | ConnectionState::Connected) => {
                info!("Refusing connection from {} while {}", peer, state);
                drop(stream);
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.worker.as_ref().is_some_and(|w| w.epoch == epoch)
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        info!("State -> {}", state);
        self.state.set_state(state);
        self.emit(LinkEvent::StateChanged(state));
    }

    /// Cancel the active worker and wait until it has released its transport
    /// handle. Reports still queued afterwards all belong to retired workers.
    async fn retire_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!(epoch = worker.epoch, kind = ?worker.kind, "Retiring worker");
            if worker.kind == WorkerKind::Session {
                self.state.detach_outbound();
            }
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                error!("{:?} worker failed: {}", worker.kind, e);
            }
        }

        while let Ok(report) = self.report_rx.try_recv() {
            debug!(epoch = report.epoch(), "Discarding report from retired worker");
        }
    }

    fn install(
        &mut self,
        kind: WorkerKind,
        epoch: u64,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    ) {
        debug!(epoch, kind = ?kind, "Worker spawned");
        self.worker = Some(Worker {
            kind,
            epoch,
            cancel,
            handle,
        });
    }

    fn allocate_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    async fn enter_none(&mut self) {
        self.retire_worker().await;
        if self.state.get_state() != ConnectionState::None {
            self.set_state(ConnectionState::None);
        }
    }

    async fn enter_listening(&mut self) {
        self.retire_worker().await;
        self.set_state(ConnectionState::Listening);

        let epoch = self.allocate_epoch();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_listener(
            self.transport.clone(),
            epoch,
            self.config.clone(),
            self.report_tx.clone(),
            cancel.clone(),
        ));
        self.install(WorkerKind::Listener, epoch, cancel, handle);
    }

    async fn enter_connecting(&mut self, peer: PeerIdentity) {
        self.retire_worker().await;
        self.set_state(ConnectionState::Connecting);

        let epoch = self.allocate_epoch();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_connector(
            self.transport.clone(),
            epoch,
            peer,
            self.report_tx.clone(),
            cancel.clone(),
        ));
        self.install(WorkerKind::Connector, epoch, cancel, handle);
    }

    async fn enter_connected(&mut self, stream: T::Stream, peer: PeerIdentity) {
        self.retire_worker().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        info!("State -> {} ({})", ConnectionState::Connected, peer);
        self.state.set_connected(peer.clone(), outbound_tx);
        self.emit(LinkEvent::StateChanged(ConnectionState::Connected));
        self.emit(LinkEvent::PeerConnected(peer.clone()));

        let epoch = self.allocate_epoch();
        let cancel = CancellationToken::new();
        let session = Session::new(
            stream,
            peer,
            outbound_rx,
            self.event_tx.clone(),
            self.config.read_buffer_size,
        );
        let handle = tokio::spawn(run_session(
            session,
            epoch,
            self.report_tx.clone(),
            cancel.clone(),
        ));
        self.install(WorkerKind::Session, epoch, cancel, handle);
    }
}

/// Single-session connection manager.
///
/// Must be created inside a tokio runtime. Dropping it cancels every worker.
pub struct ConnectionManager<T: Transport> {
    state: Arc<LinkState>,
    command_tx: mpsc::UnboundedSender<Command<T::Stream>>,
    event_rx: Option<EventReceiver>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a new connection manager in the `None` state.
    pub fn new(transport: T, config: LinkConfig) -> Self {
        let state = LinkState::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let core = ManagerCore {
            transport: Arc::new(transport),
            config,
            state: state.clone(),
            event_tx,
            report_tx,
            report_rx,
            worker: None,
            next_epoch: 1,
        };
        tokio::spawn(core.run(command_rx));

        Self {
            state,
            command_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.event_rx.take()
    }

    /// Current state snapshot.
    pub fn current_state(&self) -> ConnectionState {
        self.state.get_state()
    }

    /// Peer of the active session, if any.
    pub fn peer(&self) -> Option<PeerIdentity> {
        self.state.get_peer()
    }

    /// Start listening. Does nothing unless the manager is idle.
    pub async fn start(&self) {
        self.request(Command::Start).await;
    }

    /// Dial `peer`, tearing down whatever is running. Last caller wins.
    pub async fn connect(&self, peer: PeerIdentity) {
        self.request(|reply| Command::Connect(peer, reply)).await;
    }

    /// Promote an inbound stream to a session.
    ///
    /// Refused (the stream is closed) when idle or already connected.
    pub async fn accepted_stream(&self, stream: T::Stream, peer: PeerIdentity) {
        self.request(|reply| Command::Accept(stream, peer, reply)).await;
    }

    /// Queue `payload` on the active session.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.state.enqueue(payload.into())
    }

    /// Stop every worker and return to `None`.
    ///
    /// Returns once all workers have exited and their handles are closed.
    pub async fn stop(&self) {
        self.request(Command::Stop).await;
    }

    async fn request<F>(&self, make: F)
    where
        F: FnOnce(oneshot::Sender<()>) -> Command<T::Stream>,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(make(reply_tx)).is_err() {
            warn!("Connection manager task is gone");
            return;
        }
        let _ = reply_rx.await;
    }
}
