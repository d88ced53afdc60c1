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

//! Inbound listener worker.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{Report, ReportSender};
use super::transport::{Acceptor, PeerIdentity, Transport};
use crate::config::LinkConfig;
use crate::error::LinkError;

enum Step<A, S> {
    Opened(A),
    Accepted(S, PeerIdentity),
}

/// Sleep for `delay` unless canceled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Accept loop for incoming connections.
///
/// Opens the listening handle, then hands every accepted stream to the
/// manager until canceled. A failed accept drops the handle so the next
/// attempt binds a fresh one. Failures to open or accept are retried after
/// the configured delay; the streak only resets on an accepted connection,
/// and the manager hears about it once it reaches the configured threshold
/// (a threshold of 0 counts as 1).
pub(crate) async fn run_listener<T: Transport>(
    transport: Arc<T>,
    epoch: u64,
    config: LinkConfig,
    reports: ReportSender<T::Stream>,
    cancel: CancellationToken,
) {
    let delay = config.accept_retry_delay();
    let threshold = config.accept_failure_threshold.max(1);
    let mut acceptor: Option<T::Acceptor> = None;
    let mut failures: u32 = 0;

    loop {
        let attempt = match acceptor.as_mut() {
            Some(handle) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    accepted = handle.accept() => {
                        accepted.map(|(stream, peer)| Step::Accepted(stream, peer))
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    opened = transport.listen() => opened.map(Step::Opened),
                }
            }
        };

        match attempt {
            Ok(Step::Opened(handle)) => {
                acceptor = Some(handle);
                info!(epoch, "Waiting for connections...");
            }
            Ok(Step::Accepted(stream, peer)) => {
                failures = 0;
                info!(epoch, "Connection from: {}", peer);
                if reports
                    .send(Report::Accepted {
                        epoch,
                        stream,
                        peer,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let error = LinkError::Accept(e);
                warn!(epoch, failures, "{}", error);
                if acceptor.take().is_some() {
                    debug!(epoch, "Dropped failed listening handle");
                }
                if failures == threshold
                    && reports
                        .send(Report::AcceptFailing {
                            epoch,
                            failures,
                            error,
                        })
                        .is_err()
                {
                    break;
                }
                if !pause(&cancel, delay).await {
                    break;
                }
            }
        }
    }

    drop(acceptor);
    debug!(epoch, "Listener closed");
}
