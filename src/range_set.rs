//! Set of row cursors stored as merged intervals.
//!
//! A [`ContiguousRangeSet`] keeps sorted, disjoint, non-adjacent closed
//! intervals in a `BTreeMap` keyed by interval start. Its size follows the
//! number of holes in the set, not its cardinality: recording that rows
//! `0..1_000_000` are done, in any order, ends as a single interval.
//!
//! Insertion finds the neighbouring intervals with two ordered lookups and
//! extends or merges them, so it runs in `O(log h)` for `h` intervals.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContiguousRangeSet {
    /// Interval start -> inclusive end.
    intervals: BTreeMap<usize, usize>,
    len: usize,
}

impl ContiguousRangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `point`. Returns `false` when it was already present.
    pub fn insert(&mut self, point: usize) -> bool {
        let left = self
            .intervals
            .range(..=point)
            .next_back()
            .map(|(&start, &end)| (start, end));

        if let Some((_, end)) = left
            && end >= point
        {
            return false;
        }

        let touches_left = left.filter(|&(_, end)| end + 1 == point);
        let right_end = point
            .checked_add(1)
            .and_then(|next| self.intervals.get(&next).copied());

        match (touches_left, right_end) {
            (Some((start, _)), Some(end)) => {
                self.intervals.remove(&(point + 1));
                self.intervals.insert(start, end);
            }
            (Some((start, _)), None) => {
                self.intervals.insert(start, point);
            }
            (None, Some(end)) => {
                self.intervals.remove(&(point + 1));
                self.intervals.insert(point, end);
            }
            (None, None) => {
                self.intervals.insert(point, point);
            }
        }
        self.len += 1;
        true
    }

    #[must_use]
    pub fn contains(&self, point: usize) -> bool {
        self.intervals
            .range(..=point)
            .next_back()
            .is_some_and(|(_, &end)| end >= point)
    }

    /// Length of the unbroken run starting at 0; 0 when 0 is absent.
    #[must_use]
    pub fn leading_count(&self) -> usize {
        match self.intervals.first_key_value() {
            Some((&0, &end)) => end + 1,
            _ => 0,
        }
    }

    /// Number of points in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of stored intervals.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.intervals.last_key_value().map(|(_, &end)| end)
    }

    /// Stored intervals in ascending order.
    pub fn intervals(&self) -> impl Iterator<Item = RangeInclusive<usize>> + '_ {
        self.intervals.iter().map(|(&start, &end)| start..=end)
    }

    /// Points absent from the set below `bound`, ascending.
    pub fn missing_below(&self, bound: usize) -> impl Iterator<Item = usize> + '_ {
        let mut next = 0;
        let mut gaps: Vec<std::ops::Range<usize>> = Vec::new();
        for (&start, &end) in &self.intervals {
            if start >= bound {
                break;
            }
            if start > next {
                gaps.push(next..start);
            }
            next = end + 1;
        }
        if next < bound {
            gaps.push(next..bound);
        }
        gaps.into_iter().flatten()
    }
}

impl Extend<usize> for ContiguousRangeSet {
    fn extend<T: IntoIterator<Item = usize>>(&mut self, iter: T) {
        for point in iter {
            self.insert(point);
        }
    }
}

impl FromIterator<usize> for ContiguousRangeSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariants(set: &ContiguousRangeSet) {
        let mut previous_end: Option<usize> = None;
        let mut total = 0;
        for range in set.intervals() {
            assert!(range.start() <= range.end());
            if let Some(prev) = previous_end {
                assert!(*range.start() > prev + 1, "intervals {prev} and {range:?} touch");
            }
            total += range.end() - range.start() + 1;
            previous_end = Some(*range.end());
        }
        assert_eq!(total, set.len());
    }

    #[test]
    fn merges_both_neighbours() {
        let mut set: ContiguousRangeSet = [0, 1, 3, 4].into_iter().collect();
        assert_eq!(set.interval_count(), 2);
        assert!(set.insert(2));
        assert_eq!(set.interval_count(), 1);
        assert_eq!(set.leading_count(), 5);
        check_invariants(&set);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut set = ContiguousRangeSet::new();
        assert!(set.insert(7));
        assert!(!set.insert(7));
        assert_eq!(set.len(), 1);
        assert_eq!(set.leading_count(), 0);
    }

    #[test]
    fn scrambled_inserts_keep_invariants() {
        let n = 500;
        let mut set = ContiguousRangeSet::new();
        // 7 is coprime with 500, so this visits every point once.
        for i in 0..n {
            set.insert((i * 7) % n);
            check_invariants(&set);
        }
        assert_eq!(set.interval_count(), 1);
        assert_eq!(set.leading_count(), n);
    }

    #[test]
    fn extends_left_and_right() {
        let mut set = ContiguousRangeSet::new();
        set.insert(10);
        set.insert(11);
        set.insert(9);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![9..=11]);
        check_invariants(&set);
    }
}
