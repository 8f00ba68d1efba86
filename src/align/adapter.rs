//! Adapter contamination detection and soft-clip decision (4.4 Adapter clipper).

use std::collections::HashMap;

use crate::read::reverse_complement;

const KMER: usize = 5;

/// A known adapter sequence. Bounded adapters are a fixed-length read-through artifact
/// (may appear on either strand when `either_strand` is set); unbounded adapters
/// (`clip_length == 0`) must appear in their declared orientation and everything past
/// them is adapter.
#[derive(Debug, Clone)]
pub struct Adapter {
    pub sequence: Vec<u8>,
    pub reverse: bool,
    pub clip_length: u32,
    pub either_strand: bool,
}

impl Adapter {
    pub fn bounded(sequence: impl Into<Vec<u8>>, reverse: bool, clip_length: u32, either_strand: bool) -> Self {
        Self {
            sequence: sequence.into(),
            reverse,
            clip_length,
            either_strand,
        }
    }

    pub fn unbounded(sequence: impl Into<Vec<u8>>, reverse: bool) -> Self {
        Self {
            sequence: sequence.into(),
            reverse,
            clip_length: 0,
            either_strand: false,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.clip_length == 0
    }
}

/// A 5-mer index over one adapter's sequence (and, for bounded either-strand adapters,
/// its reverse complement too). Repeated 5-mers are non-unique and never used to anchor
/// a probe.
struct FiveMerIndex {
    /// Sequence actually indexed (the adapter's own sequence, or its revcomp variant).
    sequence: Vec<u8>,
    positions: HashMap<[u8; KMER], Option<usize>>,
}

impl FiveMerIndex {
    fn build(sequence: Vec<u8>) -> Self {
        let mut positions: HashMap<[u8; KMER], Option<usize>> = HashMap::new();
        if sequence.len() >= KMER {
            for p in 0..=sequence.len() - KMER {
                let mut kmer = [0u8; KMER];
                kmer.copy_from_slice(&sequence[p..p + KMER]);
                positions
                    .entry(kmer)
                    .and_modify(|e| *e = None)
                    .or_insert(Some(p));
            }
        }
        Self { sequence, positions }
    }

    fn lookup(&self, kmer: &[u8]) -> Option<usize> {
        if kmer.len() != KMER {
            return None;
        }
        let mut key = [0u8; KMER];
        key.copy_from_slice(kmer);
        self.positions.get(&key).copied().flatten()
    }
}

/// The clipper's precomputed index over the whole adapter list; built once and reused for
/// every read.
pub struct AdapterClipper {
    adapters: Vec<Adapter>,
    indices: Vec<Vec<FiveMerIndex>>,
    max_mismatch_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterMatch {
    pub read_begin: usize,
    pub read_end: usize,
    pub touches_read_start: bool,
    pub touches_read_end: bool,
}

impl AdapterClipper {
    pub fn new(adapters: Vec<Adapter>) -> Self {
        let indices = adapters
            .iter()
            .map(|a| {
                let mut variants = vec![FiveMerIndex::build(a.sequence.clone())];
                if a.either_strand {
                    variants.push(FiveMerIndex::build(reverse_complement(&a.sequence)));
                }
                variants
            })
            .collect();
        Self {
            adapters,
            indices,
            max_mismatch_fraction: 0.2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Strand initialization + extension (4.4): for every reference/read mismatch
    /// position, probe its 5-mer against every adapter's index; on a hit, extend to a
    /// full adapter-length window and accept it if the mismatch rate within the read's
    /// bounds is low enough. Returns the union of all accepted intervals.
    pub fn find_matches(&self, read: &[u8], reference_aligned: &[u8]) -> Option<AdapterMatch> {
        let len = read.len();
        if len < KMER {
            return None;
        }
        let mismatch_positions: Vec<usize> = (0..len.min(reference_aligned.len()))
            .filter(|&i| !bases_match(read[i], reference_aligned[i]))
            .collect();

        let mut intervals: Vec<(usize, usize)> = Vec::new();
        for &p in &mismatch_positions {
            if p + KMER > len {
                continue;
            }
            let kmer = &read[p..p + KMER];
            for variants in &self.indices {
                for index in variants {
                    if let Some(adapter_pos) = index.lookup(kmer) {
                        if let Some((b, e)) = self.extend_match(read, &index.sequence, p, adapter_pos) {
                            intervals.push((b, e));
                        }
                    }
                }
            }
        }

        if intervals.is_empty() {
            return None;
        }
        let (b, e) = union_interval(&intervals);
        Some(AdapterMatch {
            read_begin: b,
            read_end: e,
            touches_read_start: b == 0,
            touches_read_end: e == len,
        })
    }

    fn extend_match(&self, read: &[u8], adapter: &[u8], read_kmer_pos: usize, adapter_pos: usize) -> Option<(usize, usize)> {
        let shift = read_kmer_pos as isize - adapter_pos as isize;
        let read_lo = shift.max(0) as usize;
        let read_hi = ((adapter.len() as isize + shift).max(0) as usize).min(read.len());
        if read_hi <= read_lo {
            return None;
        }

        let mut compared = 0usize;
        let mut mismatches = 0usize;
        for r in read_lo..read_hi {
            let a = r as isize - shift;
            if a < 0 || a as usize >= adapter.len() {
                continue;
            }
            compared += 1;
            if !bases_match(read[r], adapter[a as usize]) {
                mismatches += 1;
            }
        }
        if compared == 0 || (mismatches as f64 / compared as f64) > self.max_mismatch_fraction {
            return None;
        }
        Some((read_lo, read_hi))
    }

    /// The clipping decision (4.4): given the match interval, decide which side to
    /// soft-clip. Returns `(left_clip, right_clip)` bases to add.
    pub fn decide_clip(&self, read_len: usize, reference_aligned: &[u8], read: &[u8], m: AdapterMatch) -> (u32, u32) {
        let remaining_prefix = m.read_begin; // option B: keep [0, b)
        let remaining_suffix = read_len - m.read_end; // option A: keep [e, len)

        let matches_in = |range: std::ops::Range<usize>| -> usize {
            range
                .filter(|&i| i < read.len() && i < reference_aligned.len())
                .filter(|&i| bases_match(read[i], reference_aligned[i]))
                .count()
        };

        let keep_suffix_matches = matches_in(m.read_end..read_len);
        let keep_prefix_matches = matches_in(0..m.read_begin);

        let clip_prefix = if remaining_suffix != remaining_prefix {
            remaining_suffix > remaining_prefix
        } else if keep_suffix_matches != keep_prefix_matches {
            keep_suffix_matches > keep_prefix_matches
        } else {
            remaining_suffix >= remaining_prefix
        };

        // Adapter at the very end of the read: require the clipped side to be mostly
        // mismatching against the reference, else it's probably a coincidental sequence.
        if (m.touches_read_start && !clip_prefix) || (m.touches_read_end && clip_prefix) {
            let (clipped_range, clipped_len) = if clip_prefix {
                (0..m.read_end, m.read_end)
            } else {
                (m.read_begin..read_len, read_len - m.read_begin)
            };
            if clipped_len == 0 {
                return (0, 0);
            }
            let clipped_mismatches = clipped_len - matches_in(clipped_range);
            if (clipped_mismatches as f64 / clipped_len as f64) <= 0.4 {
                return (0, 0);
            }
        }

        if clip_prefix {
            (m.read_end as u32, 0)
        } else {
            (0, (read_len - m.read_begin) as u32)
        }
    }
}

fn bases_match(a: u8, b: u8) -> bool {
    a.to_ascii_uppercase() == b.to_ascii_uppercase()
}

fn union_interval(intervals: &[(usize, usize)]) -> (usize, usize) {
    let b = intervals.iter().map(|i| i.0).min().unwrap();
    let e = intervals.iter().map(|i| i.1).max().unwrap();
    (b, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_present_at_tail_is_detected_and_clipped() {
        let adapter_seq = b"CTGTCTCTTATACACATCT".to_vec();
        let clipper = AdapterClipper::new(vec![Adapter::bounded(adapter_seq.clone(), false, 19, false)]);

        let mut read = b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_vec();
        let at = 30;
        read[at..at + adapter_seq.len()].copy_from_slice(&adapter_seq);
        let reference = vec![b'G'; read.len()]; // reference disagrees with the adapter region

        let m = clipper.find_matches(&read, &reference).expect("adapter should be found");
        assert!(m.read_begin <= at);
        assert!(m.read_end >= at + adapter_seq.len());
    }

    #[test]
    fn no_adapter_list_never_matches() {
        let clipper = AdapterClipper::new(vec![]);
        assert!(clipper.find_matches(b"ACGTACGTAC", b"ACGTACGTAC").is_none());
    }

    #[test]
    fn clip_decision_prefers_the_shorter_clip_side() {
        let adapter_seq = b"CTGTCTCTTATACACATCT".to_vec();
        let clipper = AdapterClipper::new(vec![Adapter::bounded(adapter_seq, false, 19, false)]);
        let m = AdapterMatch {
            read_begin: 80,
            read_end: 99,
            touches_read_start: false,
            touches_read_end: true,
        };
        let read = vec![b'A'; 100];
        let reference = vec![b'A'; 100];
        let (left, right) = clipper.decide_clip(100, &reference, &read, m);
        assert_eq!(left, 0);
        assert!(right == 0 || right == 20);
    }
}
