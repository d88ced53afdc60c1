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

//! SPP chat console.

use anyhow::Result;
use spp_chat::bluetooth::{ConnectionManager, RfcommTransport};
use spp_chat::config::Config;
use spp_chat::console::{format_peers, ConsoleAction, HELP};
use spp_chat::events::ChatLog;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spp_chat=info".parse()?),
        )
        .init();

    info!("Starting SPP chat v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let transport = RfcommTransport::new(&config.bluetooth).await?;
    info!("Local adapter: {}", transport.address().await?);
    let directory = transport.clone();

    let mut manager = ConnectionManager::new(transport, config.link.clone());
    let Some(mut event_rx) = manager.take_event_receiver() else {
        anyhow::bail!("event receiver already taken");
    };
    manager.start().await;

    let mut chat = ChatLog::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                println!("{}", chat.process_event(event));
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                match ConsoleAction::parse(&line) {
                    ConsoleAction::Connect(peer) => manager.connect(peer).await,
                    ConsoleAction::Peers => match directory.paired_devices().await {
                        Ok(peers) => println!("{}", format_peers(&peers)),
                        Err(e) => {
                            warn!("Failed to list paired devices: {}", e);
                            println!("* Unable to list paired devices: {}", e);
                        }
                    },
                    ConsoleAction::State => match manager.peer() {
                        Some(peer) => println!("{} to {}", manager.current_state(), peer),
                        None => println!("{}", manager.current_state()),
                    },
                    ConsoleAction::Help => println!("{}", HELP),
                    ConsoleAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                    ConsoleAction::Send(text) => {
                        if let Err(e) = manager.send(text.into_bytes()) {
                            println!("* {}", e);
                        }
                    }
                    ConsoleAction::Invalid(reason) => println!("* {}", reason),
                    ConsoleAction::Nothing => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.stop().await;
    while let Ok(event) = event_rx.try_recv() {
        println!("{}", chat.process_event(event));
    }
    info!("SPP chat stopped");
    Ok(())
}
