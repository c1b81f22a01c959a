//! Splitting of commands whose id list would exceed the line-length budget.

use std::fmt;

use crate::error::{Error, Result};

use super::id_set::{ContiguousIdGroup, GroupEnd, IdSelection};

/// Default budget for a command line, excluding the tag.
///
/// Servers commonly reject lines longer than 1000 octets; the remaining
/// octets leave room for the tag and CRLF.
pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 980;

/// A command of the form `<prefix> <ids>[ <suffix>]`, e.g.
/// `UID STORE 1,5:9 +FLAGS.SILENT (\Seen)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCommand {
    prefix: String,
    selection: IdSelection,
    suffix: String,
}

impl SequenceCommand {
    /// Creates a command without suffix.
    #[must_use]
    pub fn new(prefix: impl Into<String>, selection: IdSelection) -> Self {
        Self {
            prefix: prefix.into(),
            selection,
            suffix: String::new(),
        }
    }

    /// Sets the text following the id list.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// The targeted ids.
    #[must_use]
    pub const fn selection(&self) -> &IdSelection {
        &self.selection
    }

    /// Renders the whole command as one line (without tag).
    #[must_use]
    pub fn render(&self) -> String {
        self.frame(&self.selection.to_string())
    }

    fn frame(&self, ids: &str) -> String {
        let mut line = format!("{} {ids}", self.prefix);
        if !self.suffix.is_empty() {
            line.push(' ');
            line.push_str(&self.suffix);
        }
        line
    }

    fn overhead(&self) -> usize {
        let suffix = if self.suffix.is_empty() {
            0
        } else {
            self.suffix.len() + 1
        };
        self.prefix.len() + 1 + suffix
    }

    /// Splits the command into lines of at most `max_length` characters.
    ///
    /// Discrete ids are distributed greedily in insertion order, the
    /// contiguous group goes last. The group is only cut into sub-ranges when
    /// it does not fit into an otherwise empty command. `1:*` and `*:*`
    /// selections are never split. An empty id set yields no commands.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandTooLong`] if a single id (or an open-ended
    /// group) cannot fit into a command on its own.
    pub fn split(&self, max_length: usize) -> Result<Vec<String>> {
        let IdSelection::Set(set) = &self.selection else {
            return Ok(vec![self.render()]);
        };
        if set.is_empty() {
            return Ok(Vec::new());
        }

        let too_long = || Error::CommandTooLong { max_length };
        let room = max_length
            .checked_sub(self.overhead())
            .filter(|room| *room > 0)
            .ok_or_else(too_long)?;

        let mut chunks = Chunks::new(room, max_length);
        for id in set.ids() {
            chunks.push(&id.to_string())?;
        }
        if let Some(group) = set.group() {
            chunks.push_group(*group)?;
        }

        Ok(chunks
            .finish()
            .iter()
            .map(|ids| self.frame(ids))
            .collect())
    }
}

impl fmt::Display for SequenceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Accumulates comma-separated id lists that each fit into `room`.
struct Chunks {
    room: usize,
    max_length: usize,
    done: Vec<String>,
    current: String,
}

impl Chunks {
    const fn new(room: usize, max_length: usize) -> Self {
        Self {
            room,
            max_length,
            done: Vec::new(),
            current: String::new(),
        }
    }

    fn push(&mut self, item: &str) -> Result<()> {
        if item.len() > self.room {
            return Err(Error::CommandTooLong {
                max_length: self.max_length,
            });
        }
        if !self.current.is_empty() && self.current.len() + 1 + item.len() > self.room {
            self.done.push(std::mem::take(&mut self.current));
        }
        if !self.current.is_empty() {
            self.current.push(',');
        }
        self.current.push_str(item);
        Ok(())
    }

    fn push_group(&mut self, group: ContiguousIdGroup) -> Result<()> {
        let text = group.to_string();
        if text.len() <= self.room {
            return self.push(&text);
        }
        let GroupEnd::Id(end) = group.end() else {
            return Err(Error::CommandTooLong {
                max_length: self.max_length,
            });
        };

        let mut start = group.start();
        loop {
            let start_width = digits(start);
            let available = self.room.saturating_sub(start_width + 1);
            let chunk_end = end.min(largest_with_digits(available));

            if chunk_end > start {
                self.push(&format!("{start}:{chunk_end}"))?;
            } else {
                self.push(&start.to_string())?;
            }

            let last = chunk_end.max(start);
            if last >= end {
                return Ok(());
            }
            start = last + 1;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.done.push(self.current);
        }
        self.done
    }
}

fn digits(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn largest_with_digits(width: usize) -> u64 {
    u32::try_from(width)
        .ok()
        .and_then(|width| 10u64.checked_pow(width))
        .map_or(u64::MAX, |limit| limit - 1)
}
