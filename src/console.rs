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

//! Console input handling.
//!
//! Maps typed lines to chat actions.

use crate::bluetooth::PeerIdentity;

/// Help text shown for `/help` and unknown commands.
pub const HELP: &str = "Commands: /connect <address> [name], /peers, /state, /quit, /help. \
Anything else is sent to the connected device.";

/// Actions that can be triggered from the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Dial a device.
    Connect(PeerIdentity),
    /// List paired devices.
    Peers,
    /// Print the connection state.
    State,
    /// Print usage.
    Help,
    /// Leave the program.
    Quit,
    /// Send the line to the peer.
    Send(String),
    /// Blank line.
    Nothing,
    /// A slash command that could not be parsed.
    Invalid(String),
}

impl ConsoleAction {
    /// Parse one input line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Self::Nothing;
        }

        let Some(command) = trimmed.trim_start().strip_prefix('/') else {
            return Self::Send(trimmed.to_string());
        };

        let mut parts = command.split_whitespace();
        match parts.next().map(str::to_lowercase).as_deref() {
            Some("connect") => match parts.next() {
                Some(address) => {
                    let name = parts.collect::<Vec<_>>().join(" ");
                    if name.is_empty() {
                        Self::Connect(PeerIdentity::from_address(address))
                    } else {
                        Self::Connect(PeerIdentity::new(address, name))
                    }
                }
                None => Self::Invalid("/connect needs a device address".to_string()),
            },
            Some("peers") => Self::Peers,
            Some("state") => Self::State,
            Some("help") => Self::Help,
            Some("quit") | Some("exit") => Self::Quit,
            Some(other) => Self::Invalid(format!("Unknown command: /{}", other)),
            None => Self::Invalid("Empty command".to_string()),
        }
    }
}

/// Render the paired device list for `/peers`.
pub fn format_peers(peers: &[PeerIdentity]) -> String {
    if peers.is_empty() {
        return "No paired devices".to_string();
    }
    peers
        .iter()
        .map(|peer| format!("  {}", peer))
        .collect::<Vec<_>>()
        .join("\n")
}
