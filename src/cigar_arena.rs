//! The CIGAR arena (3 DATA MODEL: CIGAR; 9 DESIGN NOTES: "arena + index"). Fragments never
//! own a CIGAR; they hold a `CigarRange` of indices into an arena owned by whichever
//! component is currently building or rewriting alignments (the fragment builder during
//! construction, the gap realigner during realignment -- 3 DATA MODEL: Ownership).
//!
//! Ops reuse `rust_htslib::bam::record::Cigar`, which is already the packed
//! (length, opcode) representation BAM expects downstream; this crate only ever produces
//! the four opcodes the spec names (Match/ALIGN, Ins, Del, SoftClip).

use rust_htslib::bam::record::{Cigar, CigarString};

use crate::reads::cigar_utils::CigarUtils;

/// A half-open range of op indices into a `CigarArena`. `(begin, end)` rather than a
/// direct slice so the arena can keep growing (and reallocating) after the range is
/// handed to a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarRange {
    pub begin: usize,
    pub end: usize,
}

impl CigarRange {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// Append-only buffer of CIGAR ops. One arena is owned per worker (per cluster during
/// fragment building, per bin during gap realignment) and `clear()`ed between units of
/// work rather than reallocated -- see 5 CONCURRENCY & RESOURCE MODEL.
#[derive(Debug, Clone, Default)]
pub struct CigarArena {
    ops: Vec<Cigar>,
}

impl CigarArena {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Appends `ops`, merging with the immediately preceding op if it's the same opcode,
    /// so the arena never accumulates `5M` followed by `3M`. Returns the range covering
    /// just the bytes this call contributed (post-merge, so it may alias the previous
    /// range's last element).
    pub fn push_all(&mut self, ops: &[Cigar]) -> CigarRange {
        let begin = self.ops.len();
        for op in ops {
            if op.len() == 0 {
                continue;
            }
            if let Some(last) = self.ops.last_mut() {
                if CigarUtils::cigar_elements_are_same_type(op, &Some(*last)) {
                    *last = CigarUtils::combine_cigar_operators(op, last).unwrap();
                    continue;
                }
            }
            self.ops.push(*op);
        }
        CigarRange::new(begin.min(self.ops.len()), self.ops.len())
    }

    pub fn push(&mut self, op: Cigar) -> CigarRange {
        self.push_all(&[op])
    }

    pub fn range(&self, range: CigarRange) -> &[Cigar] {
        &self.ops[range.begin..range.end]
    }

    pub fn to_cigar_string(&self, range: CigarRange) -> CigarString {
        CigarString(self.range(range).to_vec())
    }

    /// Appends a `CigarString` built elsewhere (e.g. the banded Smith-Waterman traceback,
    /// or a `CigarBuilder::make()` result) and returns its range in this arena.
    pub fn push_cigar_string(&mut self, cigar: &CigarString) -> CigarRange {
        self.push_all(&cigar.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_merges_adjacent_same_type_ops() {
        let mut arena = CigarArena::new();
        let r1 = arena.push(Cigar::Match(5));
        let r2 = arena.push(Cigar::Match(3));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.range(r2), &[Cigar::Match(8)]);
        assert_eq!(arena.range(r1), &[Cigar::Match(8)]);
    }

    #[test]
    fn ranges_from_separate_pushes_are_independent_once_distinct_opcode() {
        let mut arena = CigarArena::new();
        arena.push(Cigar::SoftClip(10));
        let r = arena.push(Cigar::Match(90));
        assert_eq!(arena.range(r), &[Cigar::Match(90)]);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn clear_resets_without_reallocating_the_vec_identity() {
        let mut arena = CigarArena::new();
        arena.push(Cigar::Match(100));
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.len(), 0);
    }
}
