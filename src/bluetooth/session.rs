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

//! Connected session over one live stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{Report, ReportSender};
use super::transport::PeerIdentity;
use crate::error::LinkError;
use crate::events::{EventSender, LinkEvent};

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the stream.
    Eof,
    /// A read or write failed.
    Fault(LinkError),
    /// The manager replaced or stopped the session.
    Canceled,
}

/// Handler for a single established connection.
pub struct Session<S> {
    stream: S,
    peer: PeerIdentity,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: EventSender,
    read_buffer_size: usize,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Create a new session handler.
    pub fn new(
        stream: S,
        peer: PeerIdentity,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        event_tx: EventSender,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            outbound,
            event_tx,
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    /// Run the session until the stream ends, fails or `cancel` fires.
    ///
    /// Every successful read is reported as-is; the stream carries no framing.
    /// The stream is closed by the time this returns.
    pub async fn run(self, cancel: CancellationToken) -> SessionEnd {
        let Self {
            stream,
            peer,
            mut outbound,
            event_tx,
            read_buffer_size,
        } = self;
        info!("Session with {} started", peer);

        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buf = vec![0u8; read_buffer_size];

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Session with {} canceled", peer);
                    return SessionEnd::Canceled;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("Connection closed by remote");
                        return SessionEnd::Eof;
                    }
                    Ok(n) => {
                        debug!("Received {} bytes", n);
                        let _ = event_tx.send(LinkEvent::DataReceived(buf[..n].to_vec()));
                    }
                    Err(e) => {
                        warn!("Read error: {}", e);
                        return SessionEnd::Fault(LinkError::Stream(e));
                    }
                },
                Some(payload) = outbound.recv() => {
                    let written = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return SessionEnd::Canceled,
                        written = write_payload(&mut writer, &payload) => written,
                    };
                    match written {
                        Ok(()) => {
                            debug!("Sent {} bytes", payload.len());
                            let _ = event_tx.send(LinkEvent::DataSent(payload));
                        }
                        Err(e) => {
                            warn!("Write error: {}", e);
                            return SessionEnd::Fault(LinkError::Stream(e));
                        }
                    }
                }
            }
        }
    }
}

async fn write_payload<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Worker body: run the session and tell the manager how it ended.
pub(crate) async fn run_session<S>(
    session: Session<S>,
    epoch: u64,
    reports: ReportSender<S>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    match session.run(cancel).await {
        SessionEnd::Canceled => {}
        end => {
            let _ = reports.send(Report::SessionEnded { epoch, end });
        }
    }
}
