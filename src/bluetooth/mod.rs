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

//! Bluetooth communication module.
//!
//! Runs the single serial-profile link: a listener waiting for peers, a
//! connector dialing one, and the session that owns the live stream.

mod connector;
mod listener;
mod manager;
mod rfcomm;
mod session;
mod transport;

pub use manager::ConnectionManager;
pub use rfcomm::{RfcommAcceptor, RfcommTransport, SPP_UUID};
pub use session::{Session, SessionEnd};
pub use transport::{Acceptor, PeerIdentity, Transport};
