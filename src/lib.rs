//! Sinkhole - a blocklisting DNS proxy.
//!
//! Queries for blocklisted domains (or their subdomains) are answered with
//! REFUSED; everything else is forwarded to an upstream resolver.

pub mod dns;
pub mod filter;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod upstream;
