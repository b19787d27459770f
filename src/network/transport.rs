// src/network/transport.rs
//! Pool connections
//!
//! A [`Connection`] moves text frames to and from the pool over either a
//! plain TCP stream (one frame per line) or a WebSocket (one frame per text
//! message). Reads are cancel safe so they can sit inside `tokio::select!`.
//! A TCP frame longer than [`MAX_FRAME_LEN`] is a protocol violation.

use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;
use url::Url;

/// Longest accepted TCP frame, newline excluded
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Where a pool URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolAddress {
    /// Line-delimited stream at `host:port`
    Tcp(String),
    /// WebSocket URL
    WebSocket(String),
}

impl PoolAddress {
    /// Parses a pool URL
    ///
    /// Accepts `stratum+tcp://host:port`, `tcp://host:port`, bare
    /// `host:port`, and `ws://` or `wss://` URLs.
    ///
    /// # Errors
    /// Returns `MinerError::Config` for unsupported schemes or missing ports.
    pub fn parse(url: &str) -> Result<Self, MinerError> {
        let url = url.trim();
        if !url.contains("://") {
            return match url.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(PoolAddress::Tcp(url.to_string()))
                }
                _ => Err(MinerError::Config(format!(
                    "Pool address '{}' must be host:port",
                    url
                ))),
            };
        }

        let parsed = Url::parse(url)
            .map_err(|e| MinerError::Config(format!("Invalid pool URL '{}': {}", url, e)))?;
        match parsed.scheme() {
            "stratum+tcp" | "tcp" => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| MinerError::Config(format!("Pool URL '{}' has no host", url)))?;
                let port = parsed
                    .port()
                    .ok_or_else(|| MinerError::Config(format!("Pool URL '{}' has no port", url)))?;
                Ok(PoolAddress::Tcp(format!("{}:{}", host, port)))
            }
            "ws" | "wss" => Ok(PoolAddress::WebSocket(url.to_string())),
            scheme => Err(MinerError::Config(format!(
                "Unsupported pool URL scheme '{}'",
                scheme
            ))),
        }
    }
}

/// An open pool connection
pub enum Connection {
    /// Plain TCP, newline-terminated frames
    Tcp {
        /// Buffered read half
        reader: BufReader<OwnedReadHalf>,
        /// Bytes of a frame whose newline has not arrived yet
        partial: Vec<u8>,
        /// Write half
        writer: OwnedWriteHalf,
    },
    /// WebSocket, one text message per frame
    WebSocket(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
}

impl Connection {
    /// Connects to `address` within `timeout`
    ///
    /// # Errors
    /// Returns `MinerError::Transport` on connect failure or timeout.
    pub async fn open(address: &PoolAddress, timeout: Duration) -> Result<Self, MinerError> {
        let connect = async {
            match address {
                PoolAddress::Tcp(addr) => {
                    let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                        MinerError::Transport(format!("Connect to {} failed: {}", addr, e))
                    })?;
                    let _ = stream.set_nodelay(true);
                    let (read, writer) = stream.into_split();
                    Ok::<_, MinerError>(Connection::Tcp {
                        reader: BufReader::new(read),
                        partial: Vec::new(),
                        writer,
                    })
                }
                PoolAddress::WebSocket(url) => {
                    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
                        .await
                        .map_err(|e| {
                            MinerError::Transport(format!("Connect to {} failed: {}", url, e))
                        })?;
                    Ok(Connection::WebSocket(Box::new(ws)))
                }
            }
        };

        time::timeout(timeout, connect)
            .await
            .map_err(|_| MinerError::Transport(format!("Connect to {:?} timed out", address)))?
    }

    /// Reads the next frame
    ///
    /// # Returns
    /// `Ok(None)` when the pool closed the connection
    ///
    /// # Errors
    /// Returns `MinerError::Protocol` for an over-long or non-UTF-8 TCP frame.
    pub async fn read_frame(&mut self) -> Result<Option<String>, MinerError> {
        match self {
            Connection::Tcp {
                reader, partial, ..
            } => loop {
                // One byte past the cap is enough to tell an over-long frame
                let budget = (MAX_FRAME_LEN + 1).saturating_sub(partial.len()) as u64;
                let read = (&mut *reader).take(budget).read_until(b'\n', partial).await?;

                if partial.last() == Some(&b'\n') {
                    let line = std::mem::take(partial);
                    let line = String::from_utf8(line)
                        .map_err(|_| MinerError::Protocol("Frame is not UTF-8".into()))?;
                    let line = line.trim_end_matches(['\r', '\n']);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(line.to_string()));
                }
                if partial.len() > MAX_FRAME_LEN {
                    partial.clear();
                    return Err(MinerError::Protocol(format!(
                        "Frame exceeds {} bytes",
                        MAX_FRAME_LEN
                    )));
                }
                if read == 0 {
                    // A trailing frame without its newline is dropped
                    partial.clear();
                    return Ok(None);
                }
            },
            Connection::WebSocket(ws) => loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_string())),
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                }
            },
        }
    }

    /// Writes one frame
    pub async fn write_frame(&mut self, frame: &str) -> Result<(), MinerError> {
        match self {
            Connection::Tcp { writer, .. } => {
                writer.write_all(frame.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Connection::WebSocket(ws) => {
                ws.send(Message::Text(frame.to_string().into())).await?;
            }
        }
        Ok(())
    }

    /// Closes the connection, giving up after `timeout`
    pub async fn close(self, timeout: Duration) {
        let shutdown = async {
            match self {
                Connection::Tcp { mut writer, .. } => {
                    let _ = writer.shutdown().await;
                }
                Connection::WebSocket(mut ws) => {
                    let _ = (*ws).close(None).await;
                }
            }
        };
        if time::timeout(timeout, shutdown).await.is_err() {
            log::debug!("Connection close timed out");
        }
    }
}
