//! Heartbeat Transport
//!
//! UDP link carrying heartbeat datagrams between the pair members. The
//! link is behind a trait so the daemon wiring and tests can swap the
//! transport out.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::protocol::{decode_frame, encode_frame, HeartbeatMessage};
use crate::error::{Error, Result};

/// Largest datagram accepted; generous for the fixed-layout heartbeat
const MAX_DATAGRAM: usize = 128;

/// Bidirectional heartbeat link to the peer
#[async_trait]
pub trait HeartbeatLink: Send + Sync {
    /// Send one heartbeat to the peer
    async fn send(&self, msg: &HeartbeatMessage) -> Result<()>;

    /// Wait for one heartbeat from the peer
    async fn recv(&self) -> Result<HeartbeatMessage>;
}

/// UDP implementation of the heartbeat link
pub struct UdpLink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpLink {
    /// Bind the local endpoint and record the peer address
    pub async fn bind(bind_address: &str, peer_address: &str) -> Result<Self> {
        let peer: SocketAddr = peer_address.parse().map_err(|e| {
            Error::Network(format!("invalid peer address {}: {}", peer_address, e))
        })?;
        let socket = UdpSocket::bind(bind_address).await?;
        tracing::info!(
            "Heartbeat link bound on {}, peer {}",
            socket.local_addr()?,
            peer
        );

        Ok(Self { socket, peer })
    }

    /// Local address the link is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl HeartbeatLink for UdpLink {
    async fn send(&self, msg: &HeartbeatMessage) -> Result<()> {
        let frame = encode_frame(msg);
        self.socket.send_to(&frame, self.peer).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<HeartbeatMessage> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        tracing::trace!("Heartbeat datagram from {} ({} bytes)", from, len);
        decode_frame(&buf[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::state::Role;

    async fn link_pair() -> (UdpLink, UdpLink) {
        let socket_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr_a = socket_a.local_addr().unwrap();
        let addr_b = socket_b.local_addr().unwrap();

        (
            UdpLink {
                socket: socket_a,
                peer: addr_b,
            },
            UdpLink {
                socket: socket_b,
                peer: addr_a,
            },
        )
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let (a, b) = link_pair().await;
        let msg = HeartbeatMessage {
            cluster_id: 7,
            sender_role: Role::Standby,
            sender_serial: "A100".to_string(),
            timestamp: 1_700_000_000,
        };

        a.send(&msg).await.unwrap();
        let received = b.recv().await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_udp_rejects_garbage_datagram() {
        let (a, b) = link_pair().await;

        a.socket.send_to(&[0xde, 0xad, 0xbe, 0xef], b.socket.local_addr().unwrap())
            .await
            .unwrap();

        let err = b.recv().await.unwrap_err();
        assert!(err.is_wire());
    }

    #[tokio::test]
    async fn test_bind_rejects_unparseable_peer() {
        let result = UdpLink::bind("127.0.0.1:0", "not-an-address").await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
