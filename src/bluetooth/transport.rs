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

//! Transport boundary used by the connection core.
//!
//! A transport hands out reliable, ordered byte streams. The core never looks
//! at framing or security; dropping a listener or stream closes it.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Identity of a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    /// Transport address (a Bluetooth MAC for RFCOMM).
    pub address: String,
    /// Human readable name.
    pub name: String,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Identity whose display name is its address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.address {
            f.write_str(&self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// Passive handle that yields inbound connections.
#[async_trait]
pub trait Acceptor: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for one peer to connect.
    async fn accept(&mut self) -> io::Result<(Self::Stream, PeerIdentity)>;
}

/// Factory for listening handles and outbound streams.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    type Acceptor: Acceptor<Stream = Self::Stream>;

    /// Open the listening handle for the service.
    async fn listen(&self) -> io::Result<Self::Acceptor>;

    /// Make a single connection attempt, bounded by the transport's own timeout.
    async fn connect(&self, peer: &PeerIdentity) -> io::Result<Self::Stream>;
}
