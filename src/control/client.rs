//! One-shot command sender.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::control::Ack;
use crate::error::{LinkError, LinkResult};

/// Outcome of a send, as seen by the client.
///
/// `NotAcknowledged` does not mean the command was not applied: the reply
/// may have been lost on the way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Acknowledged,
    NotAcknowledged,
}

impl Delivery {
    pub fn is_acknowledged(self) -> bool {
        self == Self::Acknowledged
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Acknowledged => "ACK",
            Self::NotAcknowledged => "NO ACK",
        })
    }
}

/// Sends commands to a control server at `host:port`.
#[derive(Debug, Clone)]
pub struct ControlClient {
    server: String,
}

impl ControlClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Send `command` and wait up to `timeout` for the reply.
    ///
    /// Only a reply of exactly `OK` counts as acknowledged. Failures are
    /// logged, never returned.
    pub async fn send(&self, command: &str, timeout: Duration) -> Delivery {
        match self.exchange(command, timeout).await {
            Ok(reply) if reply == Ack::OK_BYTES => Delivery::Acknowledged,
            Ok(reply) => {
                tracing::debug!(
                    command,
                    reply = %String::from_utf8_lossy(&reply),
                    "command not acknowledged"
                );
                Delivery::NotAcknowledged
            }
            Err(e) => {
                tracing::warn!(command, "{e}");
                Delivery::NotAcknowledged
            }
        }
    }

    async fn exchange(&self, command: &str, timeout: Duration) -> LinkResult<Vec<u8>> {
        let target = self.resolve().await?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| LinkError::transport("bind", local, e))?;
        socket
            .connect(target)
            .await
            .map_err(|e| LinkError::transport("connect", target, e))?;
        socket
            .send(command.as_bytes())
            .await
            .map_err(|e| LinkError::transport("send", target, e))?;

        let mut buf = [0u8; 64];
        match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
            Ok(received) => {
                let len = received.map_err(|e| LinkError::transport("receive", target, e))?;
                Ok(buf[..len].to_vec())
            }
            Err(_) => Err(LinkError::transport(
                "receive",
                target,
                io::Error::new(io::ErrorKind::TimedOut, format!("no reply within {timeout:?}")),
            )),
        }
    }

    async fn resolve(&self) -> LinkResult<SocketAddr> {
        tokio::net::lookup_host(self.server.as_str())
            .await
            .map_err(|e| LinkError::transport("resolve", &self.server, e))?
            .next()
            .ok_or_else(|| {
                LinkError::transport(
                    "resolve",
                    &self.server,
                    io::Error::new(io::ErrorKind::NotFound, "no address"),
                )
            })
    }
}
