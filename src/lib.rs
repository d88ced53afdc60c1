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

//! Serial Port Profile chat link.
//!
//! A [`ConnectionManager`] keeps at most one Bluetooth RFCOMM session alive,
//! switching between listening for peers, dialing a chosen peer and running
//! the connected session. Lifecycle and data are reported as [`LinkEvent`]s.

pub mod bluetooth;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod state;

pub use bluetooth::{ConnectionManager, PeerIdentity, Transport};
pub use error::LinkError;
pub use events::LinkEvent;
pub use state::ConnectionState;
