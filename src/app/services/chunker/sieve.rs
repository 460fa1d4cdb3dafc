//! Record-shape predicates for the chunker
//!
//! A sieve inspects the currently buffered bytes and claims the ranges it
//! recognizes as complete candidate records. Sieves are pure: they carry
//! no per-stream state and may be re-run over the same window at any time.

use std::ops::Range;

use regex::bytes::Regex;

use crate::{Error, Result};

/// A record-shape predicate over a buffered byte window
///
/// `scan` must be total on any input length: a window too short to contain
/// a complete record simply produces no claims, never an error. State that
/// must survive across windows (timer rollover, header progress) belongs
/// in the parse state, not here.
pub trait Sieve: Send {
    /// Short predicate name, used in configuration error messages
    fn name(&self) -> &'static str;

    /// Claim the complete candidate records visible in `window`
    ///
    /// Ranges are relative to the window start and need not be sorted;
    /// the chunker sorts and overlap-checks the merged claims.
    fn scan(&self, window: &[u8]) -> Vec<Range<usize>>;
}

/// Sieve matching a byte-oriented regular expression
///
/// Suits line-delimited and marker-delimited text formats. An incomplete
/// record at the end of the window (a line without its terminator yet)
/// does not match, which is exactly the "wait for more bytes" behavior
/// the chunker contract requires.
pub struct RegexSieve {
    name: &'static str,
    pattern: Regex,
}

impl RegexSieve {
    /// Compile a new regex sieve
    pub fn new(name: &'static str, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::configuration(format!("Invalid sieve pattern for '{}': {}", name, e))
        })?;
        Ok(Self { name, pattern })
    }
}

impl Sieve for RegexSieve {
    fn name(&self) -> &'static str {
        self.name
    }

    fn scan(&self, window: &[u8]) -> Vec<Range<usize>> {
        self.pattern.find_iter(window).map(|m| m.range()).collect()
    }
}

impl std::fmt::Debug for RegexSieve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexSieve")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}
