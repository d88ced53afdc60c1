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

//! Bluetooth RFCOMM transport backed by BlueZ.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, Address};
use std::io;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use super::transport::{Acceptor, PeerIdentity, Transport};
use crate::config::BluetoothConfig;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM transport on the default adapter.
///
/// Clones share the adapter, so a clone kept by the console can list paired
/// devices while the manager owns the original.
#[derive(Clone)]
pub struct RfcommTransport {
    adapter: Adapter,
    channel: u8,
    connect_timeout: Duration,
}

impl RfcommTransport {
    /// Open the default adapter and prepare it for serial connections.
    pub async fn new(config: &BluetoothConfig) -> Result<Self> {
        info!("Initializing Bluetooth transport...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        adapter.set_alias(config.device_name.clone()).await?;
        info!("Bluetooth name set to: {}", config.device_name);

        if config.discoverable {
            adapter.set_discoverable(true).await?;
            adapter.set_pairable(true).await?;
            info!("Adapter is discoverable and pairable");
        }

        Ok(Self {
            adapter,
            channel: config.channel,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        })
    }

    /// Get the adapter address.
    pub async fn address(&self) -> Result<Address> {
        Ok(self.adapter.address().await?)
    }

    /// Get paired devices.
    pub async fn paired_devices(&self) -> Result<Vec<PeerIdentity>> {
        let mut devices = Vec::new();

        for addr in self.adapter.device_addresses().await? {
            let device = self.adapter.device(addr)?;
            if device.is_paired().await? {
                let name = device.alias().await.unwrap_or_else(|_| addr.to_string());
                devices.push(PeerIdentity::new(addr.to_string(), name));
            }
        }

        Ok(devices)
    }
}

/// Resolve the alias BlueZ knows for `addr`, falling back to the address.
async fn peer_identity(adapter: &Adapter, addr: Address) -> PeerIdentity {
    let name = match adapter.device(addr) {
        Ok(device) => device.alias().await.ok(),
        Err(_) => None,
    };
    match name {
        Some(name) => PeerIdentity::new(addr.to_string(), name),
        None => PeerIdentity::from_address(addr.to_string()),
    }
}

/// Listening RFCOMM socket.
pub struct RfcommAcceptor {
    listener: Listener,
    adapter: Adapter,
}

#[async_trait]
impl Acceptor for RfcommAcceptor {
    type Stream = Stream;

    async fn accept(&mut self) -> io::Result<(Stream, PeerIdentity)> {
        let (stream, remote_addr) = self.listener.accept().await?;
        debug!("Connection from: {:?}", remote_addr);
        let peer = peer_identity(&self.adapter, remote_addr.addr).await;
        Ok((stream, peer))
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    type Stream = Stream;
    type Acceptor = RfcommAcceptor;

    async fn listen(&self) -> io::Result<RfcommAcceptor> {
        let local_addr = SocketAddr::new(Address::any(), self.channel);
        let listener = Listener::bind(local_addr).await?;
        info!(
            "RFCOMM server listening on channel {} (SPP {})",
            self.channel, SPP_UUID
        );

        Ok(RfcommAcceptor {
            listener,
            adapter: self.adapter.clone(),
        })
    }

    async fn connect(&self, peer: &PeerIdentity) -> io::Result<Stream> {
        let addr: Address = peer.address.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid Bluetooth address: {}", peer.address),
            )
        })?;

        debug!("Dialing {} on channel {}", addr, self.channel);
        match timeout(
            self.connect_timeout,
            Stream::connect(SocketAddr::new(addr, self.channel)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {:?}", self.connect_timeout),
            )),
        }
    }
}
