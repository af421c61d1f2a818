//! Sinkhole orchestration.
//!
//! Loads the blocklist, binds the listener and runs until Ctrl-C.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::filter::{Blocklist, BlocklistError};
use crate::resolver::Resolver;
use crate::transport::udp::UdpTransport;
use crate::upstream::Forwarder;

/// Startup failures. Once serving, nothing is fatal.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("could not load blocklist {}", path.display())]
    Blocklist {
        path: PathBuf,
        #[source]
        source: BlocklistError,
    },

    #[error("could not bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Configuration for the sinkhole.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to listen on (e.g., 0.0.0.0:53)
    pub bind_addr: SocketAddr,
    /// Upstream resolver for queries that are not blocked
    pub upstream: SocketAddr,
    /// How long a worker waits for the upstream before giving up
    pub upstream_timeout: Duration,
    /// Sorted blocklist file, one domain per line
    pub blocklist_path: PathBuf,
    /// Cap on concurrently running query workers
    pub max_workers: usize,
    /// Seconds between stats log lines, `None` to disable
    pub stats_interval: Option<Duration>,
}

/// Run the sinkhole with the given configuration.
///
/// Returns an error only for startup failures; afterwards it serves until
/// interrupted.
pub async fn run(config: ProxyConfig) -> Result<(), ProxyError> {
    info!(path = %config.blocklist_path.display(), "loading blocklist");
    let blocklist =
        Blocklist::load(&config.blocklist_path).map_err(|source| ProxyError::Blocklist {
            path: config.blocklist_path.clone(),
            source,
        })?;
    let resolver = Arc::new(Resolver::new(blocklist));
    info!(domains = resolver.blocked_count(), "blocklist loaded");
    let forwarder = Forwarder::new(config.upstream, config.upstream_timeout);

    let udp = UdpTransport::bind(config.bind_addr, config.max_workers)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    info!(
        listen = %config.bind_addr,
        upstream = %forwarder.addr(),
        timeout_ms = forwarder.timeout().as_millis() as u64,
        max_workers = config.max_workers,
        "sinkhole listening"
    );

    let listener = udp.start(forwarder, Arc::clone(&resolver));

    if let Some(period) = config.stats_interval {
        tokio::spawn(report_stats(Arc::clone(&resolver), period));
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => warn!(error = %e, "could not listen for shutdown signal, shutting down"),
    }
    listener.abort();

    Ok(())
}

/// Log and reset the counters every `period`.
async fn report_stats(resolver: Arc<Resolver>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let stats = resolver.stats_snapshot_and_reset();
        info!(
            uptime_secs = stats.uptime_secs,
            requests = stats.requests,
            blocked = stats.blocked,
            forwarded = stats.forwarded,
            timed_out = stats.timed_out,
            dropped = stats.dropped,
            avg_response_ms = stats.avg_response_ms,
            "stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(blocklist_path: PathBuf) -> ProxyConfig {
        ProxyConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            upstream: "127.0.0.1:53".parse().unwrap(),
            upstream_timeout: Duration::from_millis(2000),
            blocklist_path,
            max_workers: 4,
            stats_interval: None,
        }
    }

    #[tokio::test]
    async fn run_fails_on_missing_blocklist() {
        let err = run(config(PathBuf::from("/nonexistent/blocklist.txt")))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Blocklist { .. }));
    }

    #[tokio::test]
    async fn run_fails_on_unsorted_blocklist() {
        let path = std::env::temp_dir()
            .join(format!("sinkhole-unsorted-{}.txt", std::process::id()));
        std::fs::write(&path, "zeta.com\nalpha.com\n").unwrap();

        let err = run(config(path.clone())).await.unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            err,
            ProxyError::Blocklist {
                source: BlocklistError::Unsorted { line: 2, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn run_fails_when_address_in_use() {
        let path = std::env::temp_dir()
            .join(format!("sinkhole-bind-{}.txt", std::process::id()));
        std::fs::write(&path, "example.com\n").unwrap();
        let taken = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut config = config(path.clone());
        config.bind_addr = taken.local_addr().unwrap();
        let err = run(config).await.unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, ProxyError::Bind { .. }));
    }
}
