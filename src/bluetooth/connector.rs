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

//! Outbound connector worker.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{Report, ReportSender};
use super::transport::{PeerIdentity, Transport};
use crate::error::LinkError;

/// Make one connection attempt to `peer` and report the outcome.
///
/// Cancellation drops the in-flight attempt; nothing is reported then.
pub(crate) async fn run_connector<T: Transport>(
    transport: Arc<T>,
    epoch: u64,
    peer: PeerIdentity,
    reports: ReportSender<T::Stream>,
    cancel: CancellationToken,
) {
    info!(epoch, "Connecting to {}", peer);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(epoch, "Connect attempt to {} canceled", peer);
            return;
        }
        result = transport.connect(&peer) => result,
    };

    let report = match result {
        Ok(stream) => {
            info!(epoch, "Connected to {}", peer);
            Report::Connected {
                epoch,
                stream,
                peer,
            }
        }
        Err(source) => {
            let error = LinkError::Connect { peer, source };
            warn!(epoch, "{}", error);
            Report::ConnectFailed { epoch, error }
        }
    };

    let _ = reports.send(report);
}
