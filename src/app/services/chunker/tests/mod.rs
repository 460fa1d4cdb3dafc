//! Test utilities for chunker testing
//!
//! Provides fixture sieves and arrival-time helpers shared across the
//! chunker test modules.

use std::ops::Range;

use chrono::{DateTime, TimeZone, Utc};

use super::{RegexSieve, Sieve};


/// Sieve claiming every complete newline-terminated line
pub fn line_sieve() -> Box<dyn Sieve> {
    Box::new(RegexSieve::new("line", r"(?s-u)[^\n]*\n").unwrap())
}

/// Sieve claiming every occurrence of a fixed literal
pub struct LiteralSieve {
    pub literal: &'static [u8],
}

impl Sieve for LiteralSieve {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn scan(&self, window: &[u8]) -> Vec<Range<usize>> {
        let mut claims = Vec::new();
        let mut from = 0;
        while from + self.literal.len() <= window.len() {
            if &window[from..from + self.literal.len()] == self.literal {
                claims.push(from..from + self.literal.len());
                from += self.literal.len();
            } else {
                from += 1;
            }
        }
        claims
    }
}

/// Fixed arrival stamp for deterministic tests
pub fn arrival(seconds: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, 2, 12, 0, seconds).unwrap()
}
