//! Sorted blocklist of domains.
//!
//! The list is loaded once at startup from a text file that is already
//! sorted, then only read. Lookups are a binary search over the sorted array.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// Errors raised while loading a blocklist.
#[derive(Debug, Error)]
pub enum BlocklistError {
    #[error("failed to read blocklist: {0}")]
    Io(#[from] io::Error),

    #[error("blocklist is not sorted at line {line}: {domain:?} sorts before the previous entry")]
    Unsorted { line: usize, domain: String },
}

/// An immutable, ascending array of lowercase domain names.
#[derive(Debug, Default)]
pub struct Blocklist {
    domains: Box<[String]>,
}

impl Blocklist {
    /// Load a blocklist file, one domain per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BlocklistError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let blocklist = Self::parse(&text)?;

        debug!(path = %path.display(), domains = blocklist.len(), "parsed blocklist file");
        Ok(blocklist)
    }

    /// Parse blocklist text.
    ///
    /// Blank lines and `#` comments are skipped and adjacent duplicates are
    /// collapsed. The remaining entries must already be in ascending byte
    /// order; the list is never re-sorted here.
    pub fn parse(text: &str) -> Result<Self, BlocklistError> {
        let mut domains: Vec<String> = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let domain = line.to_ascii_lowercase();
            if let Some(previous) = domains.last() {
                if *previous == domain {
                    continue;
                }
                if *previous > domain {
                    return Err(BlocklistError::Unsorted {
                        line: idx + 1,
                        domain,
                    });
                }
            }
            domains.push(domain);
        }

        Ok(Self {
            domains: domains.into_boxed_slice(),
        })
    }

    /// Exact-match lookup. `domain` must already be lowercase.
    pub fn contains(&self, domain: &str) -> bool {
        self.domains
            .binary_search_by(|probe| probe.as_str().cmp(domain))
            .is_ok()
    }

    /// Returns the number of domains in the blocklist.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Builds a blocklist from arbitrary domains, sorting and deduplicating them.
impl<S: Into<String>> FromIterator<S> for Blocklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut domains: Vec<String> = iter
            .into_iter()
            .map(|d| d.into().to_ascii_lowercase())
            .collect();
        domains.sort_unstable();
        domains.dedup();

        Self {
            domains: domains.into_boxed_slice(),
        }
    }
}
