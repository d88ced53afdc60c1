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

//! Link events and their rendering as chat lines.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bluetooth::PeerIdentity;
use crate::state::ConnectionState;

/// Events delivered to the consumer, in the order the facts occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The manager entered a new state.
    StateChanged(ConnectionState),
    /// A session was established with this peer.
    PeerConnected(PeerIdentity),
    /// Bytes read from the stream, exactly as one read returned them.
    DataReceived(Vec<u8>),
    /// Bytes written to the stream.
    DataSent(Vec<u8>),
    /// Transient user-facing message.
    Notification(String),
}

/// Sending half of the event channel.
pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// One line of console output.
#[derive(Debug, Clone)]
pub struct ChatLine {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl ChatLine {
    fn new(text: String) -> Self {
        Self {
            timestamp: Local::now(),
            text,
        }
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Turns link events into chat lines.
///
/// Remembers the connected device's name so incoming data can be attributed.
#[derive(Debug, Default)]
pub struct ChatLog {
    device_name: Option<String>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the device currently chatting with us.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: LinkEvent) -> ChatLine {
        match event {
            LinkEvent::StateChanged(state) => {
                if state != ConnectionState::Connected {
                    self.device_name = None;
                }
                ChatLine::new(format!("-- {} --", state))
            }
            LinkEvent::PeerConnected(peer) => {
                let text = format!("Connected to {}", peer.name);
                self.device_name = Some(peer.name);
                ChatLine::new(text)
            }
            LinkEvent::DataReceived(bytes) => {
                debug!("Rendering {} received bytes", bytes.len());
                let name = self.device_name.as_deref().unwrap_or("Peer");
                ChatLine::new(format!("{}:  {}", name, String::from_utf8_lossy(&bytes)))
            }
            LinkEvent::DataSent(bytes) => {
                ChatLine::new(format!("Me:  {}", String::from_utf8_lossy(&bytes)))
            }
            LinkEvent::Notification(text) => ChatLine::new(format!("* {}", text)),
        }
    }
}
