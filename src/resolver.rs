//! DNS query resolution logic.
//!
//! Handles the per-query decision:
//! 1. Decode the first question name
//! 2. Match it (and its parents) against the blocklist
//! 3. Refuse in place, forward, or drop
//!
//! Transports handle the actual I/O, resolver handles decisions.

use crate::dns::{self, Question, WireError};
use crate::filter::{self, Blocklist};
use crate::stats::{Stats, StatsSnapshot};

/// Action to take for a DNS query.
#[derive(Debug, PartialEq, Eq)]
pub enum QueryAction {
    /// Query is blocked. The query buffer has been rewritten into a REFUSED
    /// reply and should be sent back as is.
    Blocked { domain: String, qtype: Option<u16> },
    /// Query should be forwarded to upstream unmodified.
    Forward { domain: String, qtype: Option<u16> },
    /// Query is malformed and gets no reply.
    Drop { reason: WireError },
}

/// Resolver handles DNS query processing decisions.
///
/// Shared read-only by every worker; the blocklist is never mutated after
/// construction and the stats are atomic.
pub struct Resolver {
    blocklist: Blocklist,
    stats: Stats,
}

impl Resolver {
    /// Create a new resolver with the given blocklist.
    pub fn new(blocklist: Blocklist) -> Self {
        Self {
            blocklist,
            stats: Stats::new(),
        }
    }

    /// Process a DNS query and decide what action to take.
    ///
    /// On [`QueryAction::Blocked`] the refusal has already been written into
    /// `query`; on every other action `query` is untouched.
    pub fn process_query(&self, query: &mut [u8]) -> QueryAction {
        let question = match Question::parse_first(query) {
            Ok(question) => question,
            Err(reason) => return QueryAction::Drop { reason },
        };

        let mut domain = question.name;
        domain.make_ascii_lowercase();

        if filter::is_blocked(&self.blocklist, &domain) {
            return match dns::refuse(query) {
                Ok(_) => QueryAction::Blocked {
                    domain,
                    qtype: question.qtype,
                },
                Err(reason) => QueryAction::Drop { reason },
            };
        }

        QueryAction::Forward {
            domain,
            qtype: question.qtype,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    /// Returns the number of domains in the blocklist.
    pub fn blocked_count(&self) -> usize {
        self.blocklist.len()
    }
}
