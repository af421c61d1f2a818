//! Upstream forwarding.
//!
//! Every forwarded query gets its own ephemeral UDP socket connected to the
//! upstream resolver, so a worker can only ever receive the reply to its own
//! query. The wait for that reply is bounded; when it runs out the query is
//! abandoned and the client is left to retry on its own.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

/// Largest UDP DNS message an upstream can send back.
pub const MAX_UPSTREAM_PACKET_SIZE: usize = 65536;

/// Default bound on the wait for an upstream reply.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(2000);

/// A failure talking to the upstream resolver. A timeout is not one of these.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to open upstream socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to send query to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for reply from {addr}: {source}")]
    Recv {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// What came back from the upstream resolver.
#[derive(Debug, PartialEq, Eq)]
pub enum UpstreamReply {
    /// Raw reply bytes, to be relayed verbatim.
    Answer(Vec<u8>),
    /// Nothing arrived before the deadline.
    TimedOut,
}

/// Sends queries to a single upstream resolver.
#[derive(Debug, Clone, Copy)]
pub struct Forwarder {
    addr: SocketAddr,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward `query` unmodified and wait for the reply.
    ///
    /// The socket is dropped before returning on every path.
    pub async fn forward(&self, query: &[u8]) -> Result<UpstreamReply, ForwardError> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
            .await
            .map_err(ForwardError::Bind)?;

        // Connecting filters out datagrams from anyone but the upstream.
        socket
            .connect(self.addr)
            .await
            .map_err(|source| ForwardError::Send {
                addr: self.addr,
                source,
            })?;
        socket
            .send(query)
            .await
            .map_err(|source| ForwardError::Send {
                addr: self.addr,
                source,
            })?;

        let mut buf = vec![0u8; MAX_UPSTREAM_PACKET_SIZE];
        match tokio::time::timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                Ok(UpstreamReply::Answer(buf))
            }
            Ok(Err(source)) => Err(ForwardError::Recv {
                addr: self.addr,
                source,
            }),
            Err(_) => Ok(UpstreamReply::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    async fn local_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn forward_returns_upstream_reply_verbatim() {
        let upstream = local_socket().await;
        let forwarder = Forwarder::new(upstream.local_addr().unwrap(), DEFAULT_UPSTREAM_TIMEOUT);

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = upstream.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..len].to_vec();
            reply[2] |= 0x80;
            reply.extend_from_slice(&[0xde, 0xad]);
            upstream.send_to(&reply, src).await.unwrap();
            buf[..len].to_vec()
        });

        let query: [u8; 17] = [0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1];
        let reply = forwarder.forward(&query).await.unwrap();
        let received = server.await.unwrap();

        assert_eq!(received, query);
        let mut expected = query.to_vec();
        expected[2] |= 0x80;
        expected.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(reply, UpstreamReply::Answer(expected));
    }

    #[tokio::test]
    async fn forward_times_out_on_silent_upstream() {
        let upstream = local_socket().await;
        let timeout = Duration::from_millis(100);
        let forwarder = Forwarder::new(upstream.local_addr().unwrap(), timeout);

        let start = Instant::now();
        let reply = forwarder.forward(&[0u8; 12]).await.unwrap();

        assert_eq!(reply, UpstreamReply::TimedOut);
        assert!(start.elapsed() >= timeout);
        assert!(start.elapsed() < timeout * 10);
    }

    #[tokio::test]
    async fn forward_ignores_datagrams_from_other_senders() {
        let upstream = local_socket().await;
        let upstream_addr = upstream.local_addr().unwrap();
        let forwarder = Forwarder::new(upstream_addr, Duration::from_millis(500));

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = upstream.recv_from(&mut buf).await.unwrap();

            let stranger = local_socket().await;
            stranger.send_to(b"spoofed", src).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            upstream.send_to(&buf[..len], src).await.unwrap();
        });

        let reply = forwarder.forward(b"query-bytes-0000").await.unwrap();
        server.await.unwrap();

        assert_eq!(reply, UpstreamReply::Answer(b"query-bytes-0000".to_vec()));
    }

    #[tokio::test]
    async fn forward_reports_refused_port_as_recv_error() {
        let closed = local_socket().await.local_addr().unwrap();
        let forwarder = Forwarder::new(closed, Duration::from_millis(500));

        let result = forwarder.forward(&[0u8; 12]).await;

        assert!(matches!(result, Err(ForwardError::Recv { .. })));
    }

    #[tokio::test]
    async fn repeated_timeouts_complete_independently() {
        let upstream = local_socket().await;
        let forwarder = Forwarder::new(upstream.local_addr().unwrap(), Duration::from_millis(50));

        for _ in 0..20 {
            assert_eq!(
                forwarder.forward(&[0u8; 12]).await.unwrap(),
                UpstreamReply::TimedOut
            );
        }
    }
}
