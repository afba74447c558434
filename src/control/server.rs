//! UDP receive loop on the device.
//!
//! Datagrams are handled one at a time in receipt order, so the actuators
//! never see two commands interleaved. The loop waits on the socket with a
//! bounded timeout and on a cancellation token; `stop()` cancels the token
//! and the loop exits at its next wake. A second token is cancelled when the
//! loop exits, so any number of callers may `join` concurrently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::actuator::ActuatorController;
use crate::control::handle_datagram;
use crate::error::{LinkError, LinkResult};

/// Largest command accepted; longer datagrams are truncated.
const RECV_BUFFER_SIZE: usize = 1024;

/// Control server bound to a UDP endpoint.
pub struct ControlServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl ControlServer {
    /// Bind `addr` and start the receive loop on a tokio task.
    ///
    /// A bind failure is returned here; the server is never running without
    /// a socket. `poll_interval` bounds each wait on the socket.
    pub async fn bind(
        addr: &str,
        actuators: Arc<ActuatorController>,
        poll_interval: Duration,
    ) -> LinkResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| LinkError::transport("bind", addr, e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| LinkError::transport("bind", addr, e))?;
        tracing::info!(%local_addr, "control server listening");

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        tokio::spawn(receive_loop(
            socket,
            actuators,
            poll_interval,
            cancel.clone(),
            finished.clone().drop_guard(),
        ));

        Ok(Self {
            local_addr,
            cancel,
            finished,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the receive loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.finished.is_cancelled()
    }

    /// Ask the loop to exit. Any number of calls, from any thread.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(local_addr = %self.local_addr, "stopping control server");
        }
        self.cancel.cancel();
    }

    /// Wait up to `timeout` for the loop to exit.
    ///
    /// Returns `true` only once the loop has exited, also when it ended by
    /// panicking. Overlapping calls all observe the same exit.
    pub async fn join(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.finished.cancelled())
            .await
            .is_ok()
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    socket: UdpSocket,
    actuators: Arc<ActuatorController>,
    poll_interval: Duration,
    cancel: CancellationToken,
    _finished: DropGuard,
) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = tokio::time::timeout(poll_interval, socket.recv_from(&mut buf)) => {
                match received {
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        tracing::warn!("control receive failed: {e}");
                        continue;
                    }
                    // Poll interval elapsed.
                    Err(_) => continue,
                }
            }
        };

        // An empty datagram carries no command and gets no reply.
        if len == 0 {
            tracing::trace!(%peer, "empty datagram ignored");
            continue;
        }

        let payload = &buf[..len];
        tracing::debug!(%peer, command = %String::from_utf8_lossy(payload).trim(), "command received");
        let ack = handle_datagram(&actuators, payload);
        if let Err(e) = socket.send_to(ack.as_bytes(), peer).await {
            tracing::warn!(%peer, "failed to send {ack}: {e}");
        }
    }
    tracing::info!("control server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    async fn server() -> (ControlServer, Arc<ActuatorController>) {
        let actuators = Arc::new(ActuatorController::mock(&[17, 27]));
        let server = ControlServer::bind("127.0.0.1:0", Arc::clone(&actuators), POLL)
            .await
            .unwrap();
        (server, actuators)
    }

    async fn exchange(socket: &UdpSocket, payload: &[u8]) -> Vec<u8> {
        socket.send(payload).await.unwrap();
        let mut buf = [0u8; 16];
        let len = tokio::time::timeout(Duration::from_secs(1), socket.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf[..len].to_vec()
    }

    #[tokio::test]
    async fn test_replies_per_datagram() {
        let (server, actuators) = server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server.local_addr()).await.unwrap();

        assert_eq!(exchange(&socket, b"LED ON 17").await, b"OK");
        assert_eq!(actuators.level(17), Some(true));
        assert_eq!(exchange(&socket, b"LED ON").await, b"ERR");
        assert_eq!(exchange(&socket, b"SET 99 1").await, b"ERR");
        assert_eq!(exchange(&socket, b"SET 27 1").await, b"OK");
        assert_eq!(actuators.level(27), Some(true));

        server.stop();
        assert!(server.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_empty_datagram_gets_no_reply() {
        let (server, _actuators) = server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server.local_addr()).await.unwrap();

        socket.send(b"").await.unwrap();
        let mut buf = [0u8; 16];
        let waited = tokio::time::timeout(Duration::from_millis(200), socket.recv(&mut buf)).await;
        assert!(waited.is_err());

        // Still serving afterwards.
        assert_eq!(exchange(&socket, b"LED TOGGLE 17").await, b"OK");
        server.stop();
        assert!(server.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (server, _actuators) = server().await;
        assert!(server.is_running());
        server.stop();
        server.stop();
        assert!(server.join(Duration::from_secs(1)).await);
        assert!(server.join(Duration::from_secs(1)).await);
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_stop_wakes_parked_receive() {
        let actuators = Arc::new(ActuatorController::mock(&[17]));
        let server = ControlServer::bind("127.0.0.1:0", actuators, Duration::from_secs(60))
            .await
            .unwrap();
        // Let the loop park in its receive.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.is_running());

        server.stop();
        assert!(server.join(Duration::from_millis(300)).await);
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_joins_agree() {
        let (server, _actuators) = server().await;
        let (a, b) = tokio::join!(
            server.join(Duration::from_millis(100)),
            server.join(Duration::from_millis(100))
        );
        assert!(!a && !b);
        assert!(server.is_running());

        server.stop();
        let (a, b) = tokio::join!(
            server.join(Duration::from_secs(1)),
            server.join(Duration::from_secs(1))
        );
        assert!(a && b);
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let (server, _actuators) = server().await;
        let taken = server.local_addr().to_string();
        let result =
            ControlServer::bind(&taken, Arc::new(ActuatorController::mock(&[17])), POLL).await;
        assert!(matches!(result, Err(LinkError::Transport { operation: "bind", .. })));
    }
}
