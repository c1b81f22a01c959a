//! Message id sets with one compacted contiguous range.

use std::fmt;

/// Upper end of a contiguous group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEnd {
    /// A concrete id.
    Id(u64),
    /// `*`, the highest id in the mailbox.
    Star,
}

impl GroupEnd {
    const fn covers(self, id: u64) -> bool {
        match self {
            Self::Id(end) => id <= end,
            Self::Star => true,
        }
    }
}

/// A run of consecutive ids rendered as `start:end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContiguousIdGroup {
    start: u64,
    end: GroupEnd,
}

impl ContiguousIdGroup {
    /// Creates the group `start:end`. The bounds are swapped if needed.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        if start <= end {
            Self {
                start,
                end: GroupEnd::Id(end),
            }
        } else {
            Self {
                start: end,
                end: GroupEnd::Id(start),
            }
        }
    }

    /// Creates the open-ended group `start:*`.
    #[must_use]
    pub const fn open_ended(start: u64) -> Self {
        Self {
            start,
            end: GroupEnd::Star,
        }
    }

    /// First id of the group.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Upper end of the group.
    #[must_use]
    pub const fn end(&self) -> GroupEnd {
        self.end
    }

    /// Returns true if `id` lies inside the group.
    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id >= self.start && self.end.covers(id)
    }

    /// Returns true if `id` is inside the group or directly next to it.
    const fn touches(&self, id: u64) -> bool {
        if self.contains(id) || id.saturating_add(1) == self.start {
            return true;
        }
        match self.end {
            GroupEnd::Id(end) => id == end.saturating_add(1),
            GroupEnd::Star => false,
        }
    }

    fn absorb(&mut self, id: u64) {
        if id < self.start {
            self.start = id;
        }
        if let GroupEnd::Id(end) = self.end {
            if id > end {
                self.end = GroupEnd::Id(id);
            }
        }
    }
}

impl fmt::Display for ContiguousIdGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            GroupEnd::Id(end) => write!(f, "{}:{end}", self.start),
            GroupEnd::Star => write!(f, "{}:*", self.start),
        }
    }
}

/// Discrete ids in insertion order plus at most one contiguous group.
///
/// The discrete ids and the group are kept disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<u64>,
    group: Option<ContiguousIdGroup>,
}

impl IdSet {
    /// Creates a set from ids, dropping duplicates but keeping the first-seen order.
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Adds an id unless it is already present.
    pub fn insert(&mut self, id: u64) {
        if !self.contains(id) {
            self.ids.push(id);
        }
    }

    /// Sets the contiguous group, removing discrete ids it covers.
    #[must_use]
    pub fn with_group(mut self, group: ContiguousIdGroup) -> Self {
        self.ids.retain(|&id| !group.contains(id));
        self.group = Some(group);
        self
    }

    /// Returns true if `id` is a discrete id or inside the group.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id) || self.group.is_some_and(|group| group.contains(id))
    }

    /// The discrete ids.
    #[must_use]
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// The contiguous group.
    #[must_use]
    pub const fn group(&self) -> Option<&ContiguousIdGroup> {
        self.group.as_ref()
    }

    /// Returns true if neither ids nor a group are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.group.is_none()
    }

    /// Compacts consecutive ids into the contiguous group.
    ///
    /// Ids adjacent to or inside an existing group are absorbed into it.
    /// Without a group, the longest run of at least two consecutive ids
    /// becomes the group (the lowest run wins ties). Only one group is kept,
    /// so other runs stay discrete.
    pub fn optimize_groupings(&mut self) {
        if self.group.is_none() {
            self.group = self.longest_run();
        }
        let Some(mut group) = self.group else {
            return;
        };

        let mut sorted = self.ids.clone();
        sorted.sort_unstable();

        // Absorbing can make further ids adjacent, so sweep outward from the
        // group in both directions.
        let mut absorbed = true;
        while absorbed {
            absorbed = false;
            for &id in &sorted {
                if !group.contains(id) && group.touches(id) {
                    group.absorb(id);
                    absorbed = true;
                }
            }
        }

        self.ids.retain(|&id| !group.contains(id));
        self.group = Some(group);
    }

    fn longest_run(&self) -> Option<ContiguousIdGroup> {
        let mut sorted = self.ids.clone();
        sorted.sort_unstable();

        let mut best: Option<(u64, u64)> = None;
        let mut index = 0;
        while index < sorted.len() {
            let start = sorted[index];
            let mut end = start;
            while index + 1 < sorted.len() && end.checked_add(1) == Some(sorted[index + 1]) {
                index += 1;
                end = sorted[index];
            }
            index += 1;

            let longer = best.is_none_or(|(s, e)| end - start > e - s);
            if end > start && longer {
                best = Some((start, end));
            }
        }
        best.map(|(start, end)| ContiguousIdGroup::new(start, end))
    }
}

impl fmt::Display for IdSet {
    /// Renders `a,b,c,start:end`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for id in &self.ids {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
            first = false;
        }
        if let Some(group) = &self.group {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{group}")?;
        }
        Ok(())
    }
}

/// Which messages a command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelection {
    /// Explicit ids.
    Set(IdSet),
    /// Every message, rendered as `1:*`.
    All,
    /// Only the highest message, rendered as `*:*`.
    HighestOnly,
}

impl fmt::Display for IdSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set(set) => write!(f, "{set}"),
            Self::All => f.write_str("1:*"),
            Self::HighestOnly => f.write_str("*:*"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::sequence;
    use proptest::prelude::*;

    #[test]
    fn dedups_in_insertion_order() {
        let set = IdSet::new([5, 3, 5, 9]);
        assert_eq!(set.ids(), &[5, 3, 9]);
        assert_eq!(set.to_string(), "5,3,9");
    }

    #[test]
    fn longest_run_becomes_group() {
        let mut set = IdSet::new([10, 1, 2, 3, 7, 8, 20]);
        set.optimize_groupings();
        assert_eq!(set.group(), Some(&ContiguousIdGroup::new(1, 3)));
        assert_eq!(set.ids(), &[10, 7, 8, 20]);
        assert_eq!(set.to_string(), "10,7,8,20,1:3");
    }

    #[test]
    fn run_ending_at_u64_max() {
        let mut set = IdSet::new([u64::MAX, 4, u64::MAX - 1]);
        set.optimize_groupings();
        assert_eq!(set.group(), Some(&ContiguousIdGroup::new(u64::MAX - 1, u64::MAX)));
        assert_eq!(set.ids(), &[4]);
    }

    #[test]
    fn tie_prefers_lowest_run() {
        let mut set = IdSet::new([8, 9, 2, 3]);
        set.optimize_groupings();
        assert_eq!(set.group(), Some(&ContiguousIdGroup::new(2, 3)));
        assert_eq!(set.ids(), &[8, 9]);
    }

    #[test]
    fn single_ids_are_not_grouped() {
        let mut set = IdSet::new([1, 3, 5]);
        set.optimize_groupings();
        assert!(set.group().is_none());
        assert_eq!(set.to_string(), "1,3,5");
    }

    #[test]
    fn absorbs_into_existing_group() {
        let mut set = IdSet::new([4, 11, 12, 2, 40]).with_group(ContiguousIdGroup::new(5, 10));
        set.optimize_groupings();
        assert_eq!(set.group(), Some(&ContiguousIdGroup::new(4, 12)));
        assert_eq!(set.ids(), &[2, 40]);
    }

    #[test]
    fn open_ended_group_absorbs_higher_ids() {
        let mut set = IdSet::new([99, 120, 3]).with_group(ContiguousIdGroup::open_ended(100));
        assert_eq!(set.ids(), &[99, 3]);
        set.optimize_groupings();
        assert_eq!(set.to_string(), "3,99:*");
    }

    #[test]
    fn sentinel_selections() {
        assert_eq!(IdSelection::All.to_string(), "1:*");
        assert_eq!(IdSelection::HighestOnly.to_string(), "*:*");
    }

    proptest! {
        #[test]
        fn optimize_keeps_every_id(ids in proptest::collection::vec(1u64..500, 0..80)) {
            let mut set = IdSet::new(ids.iter().copied());
            set.optimize_groupings();

            let mut expanded = sequence::expand(&set.to_string());
            expanded.sort_unstable();
            let mut expected = ids.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(expanded, expected);
        }
    }
}
