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

//! Link error types.

use std::io;
use thiserror::Error;

use crate::bluetooth::PeerIdentity;

/// Errors produced by the connection core.
///
/// Only [`LinkError::NotConnected`] is ever returned to a caller. The other
/// variants are absorbed at the worker boundary and show up as log lines,
/// state transitions or `Notification` events.
#[derive(Debug, Error)]
pub enum LinkError {
    /// `send` was called while no session is active.
    #[error("You are not connected to a device")]
    NotConnected,

    /// Opening the listening handle or accepting a connection failed.
    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A single outbound connection attempt failed.
    #[error("Unable to connect to {peer}: {source}")]
    Connect {
        peer: PeerIdentity,
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to an established stream failed.
    #[error("Stream fault: {0}")]
    Stream(#[source] io::Error),
}

/// Result alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
