//! Transport layer for the sinkhole.
//!
//! Receives DNS queries from clients over UDP and hands each one to its own
//! worker task.

pub mod udp;

/// Largest client query accepted. Longer datagrams are dropped.
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dns::WireError;
use crate::upstream::ForwardError;

/// Query type for log output, `-` when the packet carried none.
struct QType(Option<u16>);

impl fmt::Display for QType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(1) => f.write_str("A"),
            Some(28) => f.write_str("AAAA"),
            Some(5) => f.write_str("CNAME"),
            Some(15) => f.write_str("MX"),
            Some(16) => f.write_str("TXT"),
            Some(65) => f.write_str("HTTPS"),
            Some(other) => write!(f, "TYPE{}", other),
            None => f.write_str("-"),
        }
    }
}

/// Logger for the outcome of one query.
pub struct QueryLogger {
    client: SocketAddr,
    start: Instant,
}

impl QueryLogger {
    pub fn new(client: SocketAddr) -> Self {
        Self {
            client,
            start: Instant::now(),
        }
    }

    /// Time since the query was received.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    pub fn blocked(&self, domain: &str, qtype: Option<u16>) {
        info!(
            client = %self.client,
            qtype = %QType(qtype),
            total_ms = self.elapsed_ms(),
            "{} BLOCKED",
            domain
        );
    }

    pub fn forwarded(&self, domain: &str, qtype: Option<u16>, upstream: Duration) {
        info!(
            client = %self.client,
            qtype = %QType(qtype),
            total_ms = self.elapsed_ms(),
            upstream_ms = upstream.as_secs_f64() * 1000.0,
            "{} FORWARD",
            domain
        );
    }

    pub fn timed_out(&self, domain: &str, qtype: Option<u16>, timeout: Duration) {
        warn!(
            client = %self.client,
            qtype = %QType(qtype),
            timeout_ms = timeout.as_millis() as u64,
            "{} TIMEOUT",
            domain
        );
    }

    pub fn upstream_failed(&self, domain: &str, error: &ForwardError) {
        warn!(client = %self.client, error = %error, "{} UPSTREAM ERROR", domain);
    }

    pub fn dropped(&self, reason: &WireError) {
        debug!(client = %self.client, reason = %reason, "dropped malformed query");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qtype_display() {
        assert_eq!(QType(Some(1)).to_string(), "A");
        assert_eq!(QType(Some(28)).to_string(), "AAAA");
        assert_eq!(QType(Some(255)).to_string(), "TYPE255");
        assert_eq!(QType(None).to_string(), "-");
    }
}
