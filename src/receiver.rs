/*
 *  receiver.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Configuration receiver - WebSocket endpoint feeding the shared config
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Every text frame carries one complete configuration. A valid one replaces
//! the live configuration and is acknowledged; an invalid one is reported back
//! and the connection stays open.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::normalize::normalize;
use crate::shared::SharedConfig;

/// A peer that opens a socket but never upgrades is dropped after this
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reply sent for every payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Ok { scenes: usize, images: usize },
    Error { message: String },
}

impl Ack {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"error"}"#.to_string())
    }
}

/// Validate `payload` and, if it holds up, make it the live configuration
pub fn apply_payload(shared: &SharedConfig, payload: &str) -> Ack {
    match normalize(payload) {
        Ok(config) => {
            let ack = Ack::Ok {
                scenes: config.data.scenes.len(),
                images: config.data.images.len(),
            };
            let generation = shared.publish(config);
            info!("Configuration {} accepted: {:?}", generation, ack);
            ack
        }
        Err(e) => {
            warn!("Rejected configuration: {}", e);
            Ack::Error { message: e.to_string() }
        }
    }
}

pub struct ConfigReceiver {
    listener: TcpListener,
    shared: SharedConfig,
}

impl ConfigReceiver {
    pub async fn bind(addr: &str, shared: SharedConfig) -> Result<Self, ReceiverError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ReceiverError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { listener, shared })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown`; each one runs on `tracker`
    pub async fn serve(self, shutdown: CancellationToken, tracker: TaskTracker) {
        if let Ok(addr) = self.local_addr() {
            info!("Listening for configurations on ws://{}", addr);
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracker.spawn(handle_connection(stream, peer, self.shared.clone(), shutdown.clone()));
                    }
                    Err(e) => {
                        // usually fd exhaustion; back off instead of spinning
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        info!("Stopped accepting connections");
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: SharedConfig, shutdown: CancellationToken) {
    let handshake = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("Dropping {} mid-handshake for shutdown", peer);
            return;
        }
        handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_async(stream)) => handshake,
    };
    let ws = match handshake {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
        Err(_) => {
            warn!("WebSocket handshake with {} timed out", peer);
            return;
        }
    };
    info!("Client connected: {}", peer);

    let (mut write, mut read) = ws.split();
    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => text.to_owned(),
                    Err(_) => {
                        let ack = Ack::Error { message: "binary payload is not UTF-8".into() };
                        if write.send(Message::text(ack.to_json())).await.is_err() {
                            break;
                        }
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("Connection {} error: {}", peer, e);
                    break;
                }
            },
        };

        let ack = apply_payload(&shared, &payload);
        if let Err(e) = write.send(Message::text(ack.to_json())).await {
            debug!("Could not acknowledge {}: {}", peer, e);
            break;
        }
    }
    info!("Client disconnected: {}", peer);
}
