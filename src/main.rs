use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sinkhole::proxy::{self, ProxyConfig};
use sinkhole::upstream::DEFAULT_UPSTREAM_TIMEOUT;

#[derive(Parser)]
#[command(name = "sinkhole")]
#[command(about = "DNS sinkhole: refuses blocklisted domains, forwards the rest", long_about = None)]
struct Args {
    /// Upstream DNS resolver (IPv4 address)
    #[arg(default_value = "8.8.8.8")]
    upstream: Ipv4Addr,

    /// Upstream resolver port
    #[arg(long, default_value = "53")]
    upstream_port: u16,

    /// Local port to listen on
    #[arg(short, long, default_value = "53")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: Ipv4Addr,

    /// Sorted blocklist file, one domain per line
    #[arg(long, default_value = "hostnames/blocklist.txt")]
    blocklist: PathBuf,

    /// Milliseconds to wait for an upstream reply
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Maximum number of queries handled concurrently
    #[arg(long, default_value = "1024", value_parser = clap::value_parser!(u32).range(1..))]
    max_workers: u32,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval: u64,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            bind_addr: SocketAddr::from((self.bind, self.port)),
            upstream: SocketAddr::from((self.upstream, self.upstream_port)),
            upstream_timeout: Duration::from_millis(self.timeout_ms),
            blocklist_path: self.blocklist,
            max_workers: self.max_workers as usize,
            stats_interval: (self.stats_interval > 0)
                .then(|| Duration::from_secs(self.stats_interval)),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    rt.block_on(proxy::run(args.into_config()))
        .context("sinkhole failed to start")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Args::parse_from(["sinkhole"]).into_config();

        assert_eq!(config.upstream, "8.8.8.8:53".parse().unwrap());
        assert_eq!(config.bind_addr, "0.0.0.0:53".parse().unwrap());
        assert_eq!(config.upstream_timeout, Duration::from_millis(2000));
        assert_eq!(config.blocklist_path, PathBuf::from("hostnames/blocklist.txt"));
        assert_eq!(config.max_workers, 1024);
        assert_eq!(config.stats_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn positional_upstream() {
        let config =
            Args::parse_from(["sinkhole", "1.1.1.1", "--stats-interval", "0"]).into_config();

        assert_eq!(config.upstream, "1.1.1.1:53".parse().unwrap());
        assert_eq!(config.stats_interval, None);
    }

    #[test]
    fn rejects_invalid_upstream() {
        assert!(Args::try_parse_from(["sinkhole", "not-an-ip"]).is_err());
        assert!(Args::try_parse_from(["sinkhole", "::1"]).is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(Args::try_parse_from(["sinkhole", "--max-workers", "0"]).is_err());
    }
}
