//! Smith-Waterman wrapper that replaces a fragment's ALIGN region with a banded SW
//! alignment when doing so demonstrably helps (4.5 Gapped aligner).

use std::collections::HashMap;

use crate::align::aligner_base::{reference_clip, update_fragment_cigar};
use crate::align::banded_sw::banded_smith_waterman;
use crate::cigar_arena::{CigarArena, CigarRange};
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::reference::{Contig, Reference};

const COST_GATE_KMER: usize = 7;
const COST_GATE_MIN_VOTES: u32 = 8;
const COST_GATE_MIN_DISTINCT_OFFSETS: usize = 2;

/// A restorable snapshot of everything `align_gapped` might overwrite, so a rejected SW
/// attempt leaves the fragment exactly as it found it.
struct Snapshot {
    position: i64,
    cigar: CigarRange,
    observed_length: u32,
    mismatch_count: u32,
    edit_distance: u32,
    gap_count: u32,
    sw_score: f64,
    log_probability: f64,
    longest_match_run: u32,
    left_soft_clip: u32,
    right_soft_clip: u32,
    mapped: bool,
}

impl Snapshot {
    fn capture(fragment: &FragmentMetadata) -> Self {
        Self {
            position: fragment.position,
            cigar: fragment.cigar,
            observed_length: fragment.observed_length,
            mismatch_count: fragment.mismatch_count,
            edit_distance: fragment.edit_distance,
            gap_count: fragment.gap_count,
            sw_score: fragment.sw_score,
            log_probability: fragment.log_probability,
            longest_match_run: fragment.longest_match_run,
            left_soft_clip: fragment.left_soft_clip,
            right_soft_clip: fragment.right_soft_clip,
            mapped: fragment.mapped,
        }
    }

    fn restore(self, fragment: &mut FragmentMetadata) {
        fragment.position = self.position;
        fragment.cigar = self.cigar;
        fragment.observed_length = self.observed_length;
        fragment.mismatch_count = self.mismatch_count;
        fragment.edit_distance = self.edit_distance;
        fragment.gap_count = self.gap_count;
        fragment.sw_score = self.sw_score;
        fragment.log_probability = self.log_probability;
        fragment.longest_match_run = self.longest_match_run;
        fragment.left_soft_clip = self.left_soft_clip;
        fragment.right_soft_clip = self.right_soft_clip;
        fragment.mapped = self.mapped;
    }
}

/// Attempts to improve `fragment` with a banded SW realignment. Returns `true` if the new
/// alignment was accepted and the fragment was rewritten in place; `false` leaves the
/// fragment untouched.
pub fn align_gapped(reference: &Reference, fragment: &mut FragmentMetadata, arena: &mut CigarArena, config: &AlignerConfig) -> bool {
    let w = config.band_width;
    let read_bases = fragment.read().bases(fragment.reverse).to_vec();
    let read_len = read_bases.len();
    if read_len == 0 {
        return false;
    }
    let contig = reference.contig(fragment.contig_id);
    let window_len = read_len + w - 1;
    if contig.len() < window_len {
        return false;
    }

    let half = (w as i64 - 1) / 2;
    let max_start = contig.len() as i64 - window_len as i64;
    let start = (fragment.position - half).clamp(0, max_start);

    if config.avoid_smith_waterman && anchor_is_single_valued(&read_bases, contig, start, window_len) {
        return false;
    }

    let database: Vec<u8> = (0..window_len)
        .map(|i| {
            let rp = start + i as i64;
            if rp >= 0 && (rp as usize) < contig.len() {
                contig.forward[rp as usize]
            } else {
                b'N'
            }
        })
        .collect();

    let snapshot = Snapshot::capture(fragment);

    let sw = match banded_smith_waterman(&read_bases, &database, config, arena) {
        Some(r) => r,
        None => return false,
    };
    let new_position = start + sw.db_offset as i64;
    let (new_position, ops) = reference_clip(new_position, contig.len(), arena.range(sw.cigar));
    let range = arena.push_all(&ops);

    let matches = update_fragment_cigar(reference, fragment, new_position, arena, range, config);
    fragment.position = new_position;
    fragment.cigar = range;
    let ops = arena.range(range);
    fragment.left_soft_clip = match ops.first() {
        Some(rust_htslib::bam::record::Cigar::SoftClip(len)) => *len,
        _ => 0,
    };
    fragment.right_soft_clip = match ops.last() {
        Some(rust_htslib::bam::record::Cigar::SoftClip(len)) if ops.len() > 1 => *len,
        _ => 0,
    };

    let accept = matches as i64 + w as i64 >= snapshot.observed_length as i64
        && fragment.mismatch_count <= config.gapped_mismatches_max
        && fragment.mismatch_count < snapshot.mismatch_count
        && fragment.log_probability > snapshot.log_probability;

    if !accept {
        snapshot.restore(fragment);
        return false;
    }
    true
}

/// The cost gate (4.5): if the query's 7-mers vote for fewer than two distinct,
/// well-supported read-start offsets within the window, the read's best placement in the
/// database is already single-valued and SW cannot find a gap worth taking.
fn anchor_is_single_valued(query: &[u8], contig: &Contig, start: i64, window_len: usize) -> bool {
    if query.len() < COST_GATE_KMER || window_len < COST_GATE_KMER {
        return false;
    }

    let mut query_index: HashMap<[u8; COST_GATE_KMER], Option<usize>> = HashMap::new();
    for p in 0..=query.len() - COST_GATE_KMER {
        let mut kmer = [0u8; COST_GATE_KMER];
        kmer.copy_from_slice(&query[p..p + COST_GATE_KMER]);
        query_index.entry(kmer).and_modify(|e| *e = None).or_insert(Some(p));
    }

    let mut votes: HashMap<i64, u32> = HashMap::new();
    for j in 0..=window_len - COST_GATE_KMER {
        let rp = start + j as i64;
        let mut kmer = [0u8; COST_GATE_KMER];
        let mut in_bounds = true;
        for t in 0..COST_GATE_KMER {
            let idx = rp + t as i64;
            if idx < 0 || idx as usize >= contig.len() {
                in_bounds = false;
                break;
            }
            kmer[t] = contig.forward[idx as usize];
        }
        if !in_bounds {
            continue;
        }
        if let Some(Some(offset)) = query_index.get(&kmer) {
            let implied_offset = j as i64 - *offset as i64;
            *votes.entry(implied_offset).or_insert(0) += 1;
        }
    }

    let distinct_strong = votes.values().filter(|&&v| v >= COST_GATE_MIN_VOTES).count();
    distinct_strong < COST_GATE_MIN_DISTINCT_OFFSETS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{Cluster, ClusterId, Read};
    use rust_htslib::bam::record::Cigar;

    fn setup(read_bases: &[u8], ref_bases: &[u8]) -> (Reference, Cluster) {
        let reference = Reference::new(vec![Contig::new(0, "chr1", ref_bases.to_vec())]);
        let cluster = Cluster::single(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, read_bases.to_vec(), vec![40; read_bases.len()]),
        );
        (reference, cluster)
    }

    #[test]
    fn recovers_a_deletion_the_ungapped_placement_missed() {
        // The read is missing 4 bases relative to the reference at its placed position.
        let read = b"AAAAAAAACCCCCCCCGGGGGGGG";
        let mut reference_bases = vec![b'T'; 40];
        reference_bases.extend_from_slice(b"AAAAAAAAGGGGCCCCCCCCGGGGGGGG");
        reference_bases.extend_from_slice(&vec![b'T'; 40]);
        let (reference, cluster) = setup(read, &reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 40, false);
        let mut arena = CigarArena::new();
        // Seed with a naive (wrong, high-mismatch) placement so SW has room to improve.
        let seed_range = arena.push(Cigar::Match(read.len() as u32));
        update_fragment_cigar(&reference, &mut fragment, 40, &arena, seed_range, &config);
        fragment.cigar = seed_range;

        let improved = align_gapped(&reference, &mut fragment, &mut arena, &config);
        assert!(improved);
        assert!(fragment.gap_count >= 1);
    }

    #[test]
    fn refuses_a_window_too_small_for_the_contig() {
        let read = b"ACGTACGTAC";
        let reference_bases = read.to_vec();
        let (reference, cluster) = setup(read, &reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        assert!(!align_gapped(&reference, &mut fragment, &mut arena, &config));
    }
}
