//! Seed metadata and the upstream indexer's match stream (3 DATA MODEL: SeedMetadata, Match).

use crate::read::ReadIndex;

/// One seed the upstream indexer hashed: where in the read it starts, how long it is,
/// which read it belongs to, and its index within the seed list (used to dedup fragments
/// and to anchor the simple-indel aligner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedMetadata {
    pub seed_id: usize,
    pub offset: u32,
    pub length: u32,
    pub read_index: ReadIndex,
}

impl SeedMetadata {
    pub fn new(seed_id: usize, offset: u32, length: u32, read_index: ReadIndex) -> Self {
        Self {
            seed_id,
            offset,
            length,
            read_index,
        }
    }

    pub fn end_offset(&self) -> u32 {
        self.offset + self.length
    }
}

/// A (contigId, offset) reference position; `Match` keeps this flat so a too-many/no-match
/// sentinel can be represented without an enum allocation, matching the source's packed
/// match stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// A genuine hit: reference position implied by `seed_id` at the given strand.
    Hit {
        seed_id: usize,
        contig_id: usize,
        position: i64,
        reverse: bool,
    },
    /// This seed's hit count reached the repeat threshold; it still counts toward that
    /// seed's tally but contributes no fragment.
    TooManyMatch { seed_id: usize },
    /// Terminates the match list for a cluster.
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match(pub MatchKind);

impl Match {
    pub fn hit(seed_id: usize, contig_id: usize, position: i64, reverse: bool) -> Self {
        Match(MatchKind::Hit {
            seed_id,
            contig_id,
            position,
            reverse,
        })
    }

    pub fn too_many_match(seed_id: usize) -> Self {
        Match(MatchKind::TooManyMatch { seed_id })
    }

    pub fn no_match() -> Self {
        Match(MatchKind::NoMatch)
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self.0, MatchKind::NoMatch)
    }

    pub fn is_too_many_match(&self) -> bool {
        matches!(self.0, MatchKind::TooManyMatch { .. })
    }

    pub fn seed_id(&self) -> Option<usize> {
        match self.0 {
            MatchKind::Hit { seed_id, .. } | MatchKind::TooManyMatch { seed_id } => Some(seed_id),
            MatchKind::NoMatch => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_terminates() {
        assert!(Match::no_match().is_no_match());
        assert!(!Match::hit(0, 0, 0, false).is_no_match());
    }

    #[test]
    fn too_many_match_carries_no_fragment_but_keeps_seed_id() {
        let m = Match::too_many_match(3);
        assert!(m.is_too_many_match());
        assert_eq!(m.seed_id(), Some(3));
    }

    #[test]
    fn seed_end_offset_adds_length() {
        let seed = SeedMetadata::new(0, 10, 19, 0);
        assert_eq!(seed.end_offset(), 29);
    }
}
