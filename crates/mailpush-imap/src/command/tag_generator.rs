//! IMAP command tag generator.
//!
//! Tags are used to match commands with their tagged completions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Tag generator for IMAP commands.
///
/// Generates unique sequential tags in the format "A1", "A2", etc.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU64::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{n}", self.prefix)
    }

    /// Returns the number of tags generated so far.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}
