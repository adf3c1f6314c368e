//! Verified Connector: bounded raw connect plus post-handshake peer check.
//!
//! The pre-connect screening can be invalidated between lookup and connect
//! by a changed DNS answer. The decisive check therefore
//! runs *after* the handshake, against the peer address the network stack
//! actually used, which is the only address that matters.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::resolve::screen;
use crate::types::{ErrorCode, GuardConfig, GuardError};

/// Hard budget for the raw connect, from attempt start.
///
/// Bounds resource consumption under slow-connection abuse (a Slowloris-style
/// attack against the guard itself).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Raw connection seam.
///
/// Production dials the given address over TCP; tests substitute transports
/// that stall, fail, or land somewhere other than the dialed address (the
/// rebinding scenario).
pub trait Transport: Send + Sync {
    fn connect(&self, addr: SocketAddr) -> impl Future<Output = io::Result<TcpStream>> + Send;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// A peer address that completed the handshake and re-classified public.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPeer {
    pub addr: SocketAddr,
}

/// Open a bounded raw connection and verify the observed peer.
///
/// The socket is never reused for payload transfer; it exists only to learn
/// which address the transport layer really connected to. It is an owned
/// value on every path here, so timeout, error, success, and caller
/// cancellation all close it on drop.
///
/// # Errors
///
/// [`ErrorCode::HandshakeTimeout`] when the budget expires,
/// [`ErrorCode::HandshakeError`] for any other connect failure,
/// [`ErrorCode::PrivateAddressPostHandshake`] when the observed peer
/// classifies private — the rebinding detection.
pub async fn verify_peer<T: Transport>(
    transport: &T,
    addr: SocketAddr,
    config: &GuardConfig,
) -> Result<VerifiedPeer, GuardError> {
    let stream = timeout(HANDSHAKE_TIMEOUT, transport.connect(addr))
        .await
        .map_err(|_| {
            GuardError::new(
                ErrorCode::HandshakeTimeout,
                format!(
                    "connect to {addr} did not complete within {}s",
                    HANDSHAKE_TIMEOUT.as_secs()
                ),
                true,
            )
            .with_detail("addr", addr.to_string())
        })?
        .map_err(|e| {
            GuardError::new(ErrorCode::HandshakeError, format!("connect to {addr} failed: {e}"), true)
                .with_detail("addr", addr.to_string())
        })?;

    let peer = stream.peer_addr().map_err(|e| {
        GuardError::new(
            ErrorCode::HandshakeError,
            format!("could not read peer address: {e}"),
            true,
        )
    })?;

    if let Some(reason) = screen(peer.ip(), config) {
        // Tear down immediately; the dialed address and the observed peer
        // disagree on safety, which is what a rebinding attack looks like.
        drop(stream);
        tracing::warn!(dialed = %addr, peer = %peer, reason, "blocked after handshake");
        return Err(GuardError::new(
            ErrorCode::PrivateAddressPostHandshake,
            format!("connected peer {peer} is {reason}"),
            false,
        )
        .with_detail("dialed", addr.to_string())
        .with_detail("peer", peer.to_string()));
    }

    tracing::debug!(peer = %peer, "peer verified");
    drop(stream);
    Ok(VerifiedPeer { addr: peer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    /// Never completes; drives the timeout path.
    struct Stalled;

    impl Transport for Stalled {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<TcpStream> {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        }
    }

    /// Fails immediately with a transport error.
    struct Refused;

    impl Transport for Refused {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<TcpStream> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    fn insecure() -> GuardConfig {
        GuardConfig {
            allow_insecure_overrides: true,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connect_times_out() {
        let addr: SocketAddr = "203.0.113.1:443".parse().unwrap();
        let err = verify_peer(&Stalled, addr, &GuardConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HandshakeTimeout);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn refused_connect_is_handshake_error() {
        let addr: SocketAddr = "203.0.113.1:443".parse().unwrap();
        let err = verify_peer(&Refused, addr, &GuardConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HandshakeError);
    }

    /// The accepted side of `listener` must observe EOF, proving the guard's
    /// raw socket was dropped and not leaked.
    async fn assert_guard_side_closed(listener: &TcpListener) {
        let (mut accepted, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        let n = accepted.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "guard-side socket must be closed");
    }

    #[tokio::test]
    async fn loopback_peer_is_rejected_post_handshake() {
        // A real handshake against a local listener: the observed peer is
        // loopback, so the secure config must refuse it even though the
        // transport was happy to connect.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = verify_peer(&TcpTransport, addr, &GuardConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PrivateAddressPostHandshake);

        // Teardown on the rejection path: the listener sees the connection
        // closed, not held open.
        assert_guard_side_closed(&listener).await;
    }

    #[tokio::test]
    async fn loopback_peer_verifies_under_insecure_overrides() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = verify_peer(&TcpTransport, addr, &insecure()).await.unwrap();
        assert_eq!(peer.addr, addr);

        // The probe socket is never reused for payload transfer; success
        // must close it just like rejection does.
        assert_guard_side_closed(&listener).await;
    }
}
