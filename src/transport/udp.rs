//! UDP transport for DNS queries.
//!
//! A single listening socket receives every client datagram. Each datagram
//! is copied into its own buffer and handed to a newly spawned worker task,
//! so a slow upstream never holds up the next query. Workers reply through
//! the shared listening socket; a UDP send is one datagram, so concurrent
//! sends need no locking.
//!
//! The number of workers alive at once is capped by a semaphore. A datagram
//! that arrives while every permit is taken is dropped, exactly like a query
//! lost on the network.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dns::HEADER_LEN;
use crate::resolver::{QueryAction, Resolver};
use crate::upstream::{Forwarder, UpstreamReply};

use super::{MAX_DNS_PACKET_SIZE, QueryLogger};

/// UDP transport for the sinkhole.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    workers: Arc<Semaphore>,
}

impl UdpTransport {
    /// Bind the listening socket.
    ///
    /// `max_workers` bounds how many queries are processed concurrently.
    pub async fn bind(addr: SocketAddr, max_workers: usize) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self {
            socket,
            workers: Arc::new(Semaphore::new(max_workers)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the listener loop.
    pub fn start(self, forwarder: Forwarder, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, self.workers, forwarder, resolver))
    }
}

/// Everything a worker owns for the lifetime of one query.
struct QueryContext {
    packet: Vec<u8>,
    client: SocketAddr,
    socket: Arc<UdpSocket>,
    forwarder: Forwarder,
}

/// Listener loop: receive, admit, spawn, repeat.
async fn run(
    socket: Arc<UdpSocket>,
    workers: Arc<Semaphore>,
    forwarder: Forwarder,
    resolver: Arc<Resolver>,
) {
    // One spare byte so an oversize datagram shows up as len > MAX.
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE + 1];

    loop {
        let (len, client) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        if len < HEADER_LEN {
            debug!(bytes = len, client = %client, "dropped datagram shorter than a header");
            resolver.stats().record_dropped();
            continue;
        }

        if len > MAX_DNS_PACKET_SIZE {
            warn!(client = %client, limit = MAX_DNS_PACKET_SIZE, "dropped oversize datagram");
            resolver.stats().record_dropped();
            continue;
        }

        let permit = match Arc::clone(&workers).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(client = %client, "worker limit reached, dropping query");
                resolver.stats().record_dropped();
                continue;
            }
        };

        debug!(bytes = len, client = %client, "received query");

        let ctx = QueryContext {
            packet: buf[..len].to_vec(),
            client,
            socket: Arc::clone(&socket),
            forwarder,
        };
        tokio::spawn(handle_query(ctx, Arc::clone(&resolver), permit));
    }
}

/// Drive one query to completion. The permit is released when this returns.
async fn handle_query(
    mut ctx: QueryContext,
    resolver: Arc<Resolver>,
    _permit: OwnedSemaphorePermit,
) {
    let logger = QueryLogger::new(ctx.client);
    let stats = resolver.stats();

    match resolver.process_query(&mut ctx.packet) {
        QueryAction::Blocked { domain, qtype } => {
            if let Err(e) = ctx.socket.send_to(&ctx.packet, ctx.client).await {
                warn!(client = %ctx.client, error = %e, "failed to send refusal");
            }
            stats.record_blocked(logger.elapsed());
            logger.blocked(&domain, qtype);
        }
        QueryAction::Forward { domain, qtype } => {
            let upstream_start = Instant::now();
            match ctx.forwarder.forward(&ctx.packet).await {
                Ok(UpstreamReply::Answer(reply)) => {
                    let upstream = upstream_start.elapsed();
                    if let Err(e) = ctx.socket.send_to(&reply, ctx.client).await {
                        warn!(client = %ctx.client, error = %e, "failed to relay reply");
                    }
                    stats.record_forwarded(logger.elapsed());
                    logger.forwarded(&domain, qtype, upstream);
                }
                Ok(UpstreamReply::TimedOut) => {
                    stats.record_timed_out();
                    logger.timed_out(&domain, qtype, ctx.forwarder.timeout());
                }
                Err(e) => {
                    stats.record_dropped();
                    logger.upstream_failed(&domain, &e);
                }
            }
        }
        QueryAction::Drop { reason } => {
            stats.record_dropped();
            logger.dropped(&reason);
        }
    }
}
