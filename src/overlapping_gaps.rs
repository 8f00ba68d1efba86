//! Enumerates conflict-free subsets of a gap set for the gap realigner to try
//! (4.12 Overlapping-gaps filter).
//!
//! Two gaps conflict when: (a) their reference spans overlap and they are not both
//! insertions at the same reference point, (b) both are deletions and their spans
//! overlap, (c) one is an insertion and the other a deletion sharing a start position.
//! Precomputing a per-gap conflict mask lets the subset walk skip every superset that
//! repeats a known-bad pair instead of visiting all `2^N` choices.

use crate::gap::Gap;

fn reference_span(gap: &Gap) -> (i64, i64) {
    if gap.is_deletion() {
        (gap.position, gap.deletion_end())
    } else {
        (gap.position, gap.position)
    }
}

fn conflicts(a: &Gap, b: &Gap) -> bool {
    if a.is_insertion() && b.is_insertion() {
        return false;
    }
    if a.position == b.position && a.is_insertion() != b.is_insertion() {
        return true;
    }
    let (a_start, a_end) = reference_span(a);
    let (b_start, b_end) = reference_span(b);
    a_start < b_end && b_start < a_end
}

/// Precomputed conflict masks for a bin's gap set (`N <= MAX_GAPS_AT_A_TIME`).
pub struct OverlappingGapsFilter {
    masks: Vec<u32>,
    n: usize,
}

impl OverlappingGapsFilter {
    pub fn new(gaps: &[Gap]) -> Self {
        let n = gaps.len();
        assert!(n <= 32, "overlapping-gaps filter only supports up to 32 gaps at a time");
        let mut masks = vec![0u32; n];
        for i in 0..n {
            for j in 0..n {
                if i != j && conflicts(&gaps[i], &gaps[j]) {
                    masks[i] |= 1 << j;
                }
            }
        }
        Self { masks, n }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The highest bit set in `choice` that conflicts with some lower bit also set in
    /// `choice`, if any. Every choice sharing bits `0..=j` the same way is equally
    /// invalid, so this is the safe point to skip past.
    fn skip_point(&self, choice: u32) -> Option<usize> {
        for j in (0..self.n).rev() {
            if choice & (1 << j) == 0 {
                continue;
            }
            let lower_mask = (1u32 << j) - 1;
            if self.masks[j] & choice & lower_mask != 0 {
                return Some(j);
            }
        }
        None
    }

    /// Iterates every non-empty, conflict-free subset of the gap set, as a bitmask over
    /// gap indices, in increasing numeric order.
    pub fn subsets(&self) -> OverlappingGapsIter<'_> {
        OverlappingGapsIter { filter: self, choice: 1 }
    }
}

pub struct OverlappingGapsIter<'f> {
    filter: &'f OverlappingGapsFilter,
    choice: u64,
}

impl<'f> Iterator for OverlappingGapsIter<'f> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let limit: u64 = 1u64 << self.filter.n;
        while self.choice < limit {
            let choice = self.choice as u32;
            if let Some(j) = self.filter.skip_point(choice) {
                self.choice = (choice as u64 | ((1u64 << (j + 1)) - 1)) + 1;
                continue;
            }
            self.choice += 1;
            return Some(choice);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_overlapping_gaps_all_combine_freely() {
        let gaps = vec![Gap::new(10, 2), Gap::new(50, -1), Gap::new(100, 3)];
        let filter = OverlappingGapsFilter::new(&gaps);
        let subsets: Vec<u32> = filter.subsets().collect();
        // 2^3 - 1 non-empty subsets, none conflicting.
        assert_eq!(subsets.len(), 7);
        assert!(subsets.contains(&0b111));
    }

    #[test]
    fn overlapping_deletions_never_appear_together() {
        let gaps = vec![Gap::new(10, 5), Gap::new(12, 5)];
        let filter = OverlappingGapsFilter::new(&gaps);
        let subsets: Vec<u32> = filter.subsets().collect();
        assert_eq!(subsets, vec![0b01, 0b10]);
    }

    #[test]
    fn insertions_at_the_same_point_can_combine() {
        let gaps = vec![Gap::new(10, -2), Gap::new(10, -3)];
        let filter = OverlappingGapsFilter::new(&gaps);
        let subsets: Vec<u32> = filter.subsets().collect();
        assert_eq!(subsets, vec![0b01, 0b10, 0b11]);
    }

    #[test]
    fn insertion_and_deletion_sharing_a_start_conflict() {
        let gaps = vec![Gap::new(10, -2), Gap::new(10, 5)];
        let filter = OverlappingGapsFilter::new(&gaps);
        let subsets: Vec<u32> = filter.subsets().collect();
        assert_eq!(subsets, vec![0b01, 0b10]);
    }

    #[test]
    fn insertion_strictly_inside_a_deletion_span_conflicts() {
        let gaps = vec![Gap::new(10, 10), Gap::new(15, -2)];
        let filter = OverlappingGapsFilter::new(&gaps);
        let subsets: Vec<u32> = filter.subsets().collect();
        assert_eq!(subsets, vec![0b01, 0b10]);
    }

    #[test]
    fn empty_gap_set_has_no_subsets() {
        let filter = OverlappingGapsFilter::new(&[]);
        assert!(filter.is_empty());
        assert_eq!(filter.subsets().count(), 0);
    }
}
