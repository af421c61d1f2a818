//! DNS query filtering module.
//!
//! Decides whether a domain is blocked by checking it, and then each of its
//! parent domains, against a sorted blocklist.

mod blocklist;

pub use blocklist::{Blocklist, BlocklistError};

/// Check if a domain or any of its parent domains is blocklisted.
///
/// `domain` must be lowercase. The walk strips one leftmost label at a time
/// and stops before a bare single label, so a blocklisted "example.com"
/// blocks "ads.example.com" but "com" alone is never looked up.
pub fn is_blocked(blocklist: &Blocklist, domain: &str) -> bool {
    if blocklist.contains(domain) {
        return true;
    }

    let mut current = domain;
    while let Some(pos) = current.find('.') {
        current = &current[pos + 1..];
        if !current.contains('.') {
            return false;
        }
        if blocklist.contains(current) {
            return true;
        }
    }

    false
}
