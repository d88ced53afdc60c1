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

//! Connection state and the shared snapshot read by consumers.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bluetooth::PeerIdentity;
use crate::error::{LinkError, Result};

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No worker active, no peer known.
    None,
    /// Waiting for a peer to dial in.
    Listening,
    /// Dialing a peer.
    Connecting,
    /// A session owns a live stream.
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::None => "Not connected",
            ConnectionState::Listening => "Listening",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Snapshot {
    state: ConnectionState,
    peer: Option<PeerIdentity>,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Shared link state.
///
/// Written only by the manager's transition loop; state, peer and the active
/// session's outbound queue change together under one lock, so a reader never
/// sees a `Connected` state paired with a stale queue.
#[derive(Debug)]
pub struct LinkState {
    inner: RwLock<Snapshot>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                state: ConnectionState::None,
                peer: None,
                outbound: None,
            }),
        }
    }
}

impl LinkState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get_state(&self) -> ConnectionState {
        self.inner.read().state
    }

    pub fn get_peer(&self) -> Option<PeerIdentity> {
        self.inner.read().peer.clone()
    }

    /// Enter a state that has no session attached.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut inner = self.inner.write();
        inner.state = state;
        inner.peer = None;
        inner.outbound = None;
    }

    /// Enter `Connected` with the new session's outbound queue.
    pub(crate) fn set_connected(
        &self,
        peer: PeerIdentity,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) {
        let mut inner = self.inner.write();
        inner.state = ConnectionState::Connected;
        inner.peer = Some(peer);
        inner.outbound = Some(outbound);
    }

    /// Stop accepting payloads for the current session.
    ///
    /// The state stays `Connected` until the manager finishes the transition;
    /// `enqueue` fails with `NotConnected` from here on.
    pub(crate) fn detach_outbound(&self) {
        self.inner.write().outbound = None;
    }

    /// Queue a payload on the active session.
    ///
    /// Fails with [`LinkError::NotConnected`] unless a session is active and
    /// still draining its queue.
    pub(crate) fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        let inner = self.inner.read();
        if inner.state != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        let outbound = inner.outbound.as_ref().ok_or(LinkError::NotConnected)?;
        if payload.is_empty() {
            return Ok(());
        }
        outbound.send(payload).map_err(|_| LinkError::NotConnected)
    }
}
