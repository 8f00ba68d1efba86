//! Swaps the catalog's observed indels into an already-aligned fragment's CIGAR when doing
//! so lowers its normalized score without raising its mismatch rate (4.11 Gap realigner).
//!
//! Every non-conflicting subset the overlapping-gaps filter (4.12) offers is built into a
//! candidate CIGAR anchored at the fragment's existing, unclipped read start -- this
//! implementation does not also search the "anchor past the pivot" placement the source
//! considers, trading some of its repositioning freedom for a single, bounded walk per
//! candidate. Only fragments whose CIGAR is soft-clip/match only going in are realigned;
//! a fragment that already carries its own indel is left alone rather than trying to
//! recombine it with the catalog.

use rust_htslib::bam::record::Cigar;

use crate::align::aligner_base::update_fragment_cigar;
use crate::cigar_arena::{CigarArena, CigarRange};
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::gap::{Gap, RealignerGaps};
use crate::overlapping_gaps::OverlappingGapsFilter;
use crate::reference::Reference;

/// Why a fragment was left untouched; used by tests and worth keeping around for the
/// eventual per-bin realignment summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unmapped,
    PerfectAlignment,
    MateInOtherBin,
    Dodgy,
    NegativePosition,
    NoOverlappingGaps,
    AlreadyGapped,
    NoImprovement,
}

/// Builds the ALIGN-only ops (soft-clips at either end, Match everywhere else) a fragment
/// would have if its current CIGAR really is soft-clip/match only. Returns `None` if it
/// carries any INS/DEL of its own -- out of scope for this pass (see module docs).
fn ungapped_ops(arena: &CigarArena, range: CigarRange) -> Option<(u32, u32, u32)> {
    let mut left_clip = 0u32;
    let mut right_clip = 0u32;
    let mut mapped_len = 0u32;
    let mut seen_match = false;
    for op in arena.range(range) {
        match op {
            Cigar::SoftClip(len) => {
                if !seen_match {
                    left_clip += len;
                } else {
                    right_clip += len;
                }
            }
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                seen_match = true;
                mapped_len += len;
            }
            _ => return None,
        }
    }
    Some((left_clip, right_clip, mapped_len))
}

/// Lays a chosen, position-sorted subset of gaps into the fragment's mapped span, keeping
/// the read's unclipped start fixed (`findStartPos`'s "anchor before the read" case).
/// Returns `None` if the subset can't be realized without running past the end of the
/// read's mapped bases (a gap wholly outside the span the caller already intersected).
fn build_candidate_ops(position: i64, left_clip: u32, right_clip: u32, mapped_len: u32, gaps: &[Gap]) -> Option<Vec<Cigar>> {
    let mut ops = Vec::with_capacity(gaps.len() * 2 + 3);
    if left_clip > 0 {
        ops.push(Cigar::SoftClip(left_clip));
    }

    let mut ref_pos = position;
    let mut read_consumed = 0u32;
    for gap in gaps {
        if gap.position < ref_pos {
            // Overlaps a gap already placed earlier in the subset; the overlapping-gaps
            // filter should have excluded this combination.
            return None;
        }
        let lead = (gap.position - ref_pos) as u32;
        if read_consumed + lead > mapped_len {
            return None;
        }
        if lead > 0 {
            ops.push(Cigar::Match(lead));
        }
        read_consumed += lead;
        ref_pos = gap.position;

        if gap.is_deletion() {
            ops.push(Cigar::Del(gap.length as u32));
            ref_pos += gap.length;
        } else if gap.is_insertion() {
            let len = (-gap.length) as u32;
            if read_consumed + len > mapped_len {
                return None;
            }
            ops.push(Cigar::Ins(len));
            read_consumed += len;
        }
    }

    if read_consumed > mapped_len {
        return None;
    }
    let tail = mapped_len - read_consumed;
    if tail > 0 {
        ops.push(Cigar::Match(tail));
    }
    if right_clip > 0 {
        ops.push(Cigar::SoftClip(right_clip));
    }
    Some(ops)
}

/// Scores a candidate CIGAR by actually walking it against the reference, the same way the
/// fragment's own CIGAR was scored originally; returns the evaluated clone so the caller
/// can commit it without redoing the walk.
fn evaluate<'c>(reference: &Reference, fragment: &FragmentMetadata<'c>, position: i64, ops: &[Cigar], config: &AlignerConfig) -> FragmentMetadata<'c> {
    let mut candidate = fragment.clone();
    candidate.position = position;
    let mut scratch = CigarArena::new();
    let range = scratch.push_all(ops);
    update_fragment_cigar(reference, &mut candidate, position, &scratch, range, config);
    candidate.cigar = range;
    // `range` indexes `scratch`, which is about to be dropped; the caller only reads
    // the scored fields off `candidate` and rebuilds `ops` itself before committing.
    candidate
}

#[allow(clippy::too_many_arguments)]
fn try_realign<'c>(
    reference: &Reference,
    gaps: &RealignerGaps,
    bin_start: i64,
    bin_end: i64,
    fragment: &mut FragmentMetadata<'c>,
    source_arena: &CigarArena,
    realigned_arena: &mut CigarArena,
    config: &AlignerConfig,
    mate_in_other_bin: bool,
    is_dodgy: bool,
) -> Result<bool, SkipReason> {
    if !fragment.mapped {
        return Err(SkipReason::Unmapped);
    }
    if fragment.edit_distance == 0 {
        return Err(SkipReason::PerfectAlignment);
    }
    if mate_in_other_bin {
        return Err(SkipReason::MateInOtherBin);
    }
    if is_dodgy && !config.realign_dodgy_alignments {
        return Err(SkipReason::Dodgy);
    }
    if fragment.unclipped_position() < 0 {
        return Err(SkipReason::NegativePosition);
    }

    let overlapping = gaps.overlapping(fragment.position, fragment.end_position());
    if overlapping.is_empty() {
        return Err(SkipReason::NoOverlappingGaps);
    }

    let Some((left_clip, right_clip, mapped_len)) = ungapped_ops(source_arena, fragment.cigar) else {
        return Err(SkipReason::AlreadyGapped);
    };

    let contig_len = reference.contig(fragment.contig_id).len();
    let baseline = evaluate(reference, fragment, fragment.position, source_arena.range(fragment.cigar), config);
    let baseline_ratio = baseline.mismatch_count as f64 / mapped_len.max(1) as f64;

    let filter = OverlappingGapsFilter::new(&overlapping);
    let mut best: Option<(FragmentMetadata<'c>, Vec<Cigar>, f64, u32)> = None;

    for choice in filter.subsets() {
        let mut subset: Vec<Gap> = (0..overlapping.len()).filter(|i| choice & (1 << i) != 0).map(|i| overlapping[i]).collect();
        subset.sort_by_key(|g| (g.position, g.length));

        let Some(ops) = build_candidate_ops(fragment.position, left_clip, right_clip, mapped_len, &subset) else {
            continue;
        };
        let candidate = evaluate(reference, fragment, fragment.position, &ops, config);
        if candidate.position + candidate.observed_length as i64 > contig_len as i64 {
            continue;
        }
        if candidate.position < bin_start || candidate.position >= bin_end {
            continue;
        }
        let ratio = candidate.mismatch_count as f64 / mapped_len.max(1) as f64;
        if ratio > baseline_ratio + 1e-9 {
            continue;
        }
        let cost = candidate.sw_score;

        let better = match &best {
            None => true,
            Some((best_frag, _, best_cost, _)) => cost < *best_cost - 1e-9 || ((cost - *best_cost).abs() <= 1e-9 && candidate.edit_distance < best_frag.edit_distance),
        };
        if better {
            best = Some((candidate, ops, cost, subset.len() as u32));
        }
    }

    let Some((candidate, ops, cost, _)) = best else {
        return Err(SkipReason::NoImprovement);
    };
    if cost >= baseline.sw_score - 1e-9 {
        return Err(SkipReason::NoImprovement);
    }

    let range = realigned_arena.push_all(&ops);
    *fragment = candidate;
    fragment.cigar = range;
    Ok(true)
}

/// Attempts one realignment pass on `fragment` against the catalog `gaps` covering
/// `[bin_start, bin_end)`. `mate_in_other_bin` and `is_dodgy` are supplied by the caller,
/// which already knows the fragment's pairing and the template's dodgy flag. Returns
/// whether the fragment's CIGAR changed; on success `fragment.cigar` indexes
/// `realigned_arena` rather than `source_arena`.
#[allow(clippy::too_many_arguments)]
pub fn realign_fragment<'c>(
    reference: &Reference,
    gaps: &RealignerGaps,
    bin_start: i64,
    bin_end: i64,
    fragment: &mut FragmentMetadata<'c>,
    source_arena: &CigarArena,
    realigned_arena: &mut CigarArena,
    config: &AlignerConfig,
    mate_in_other_bin: bool,
    is_dodgy: bool,
) -> bool {
    try_realign(reference, gaps, bin_start, bin_end, fragment, source_arena, realigned_arena, config, mate_in_other_bin, is_dodgy).unwrap_or(false)
}

/// Repeats `realign_fragment` until it stops improving the fragment, when `config.vigorous`
/// is set; a single pass otherwise. Each pass's output CIGAR lives in `realigned_arena` and
/// becomes the next pass's `source_arena`, so the fragment's CIGAR range stays valid
/// between calls without the caller having to track which arena currently backs it.
pub fn realign_fragment_to_fixed_point<'c>(
    reference: &Reference,
    gaps: &RealignerGaps,
    bin_start: i64,
    bin_end: i64,
    fragment: &mut FragmentMetadata<'c>,
    source_arena: &CigarArena,
    realigned_arena: &mut CigarArena,
    config: &AlignerConfig,
    mate_in_other_bin: bool,
    is_dodgy: bool,
) -> bool {
    let mut changed = realign_fragment(reference, gaps, bin_start, bin_end, fragment, source_arena, realigned_arena, config, mate_in_other_bin, is_dodgy);
    if changed && config.vigorous {
        loop {
            let snapshot = realigned_arena.clone();
            if !realign_fragment(reference, gaps, bin_start, bin_end, fragment, &snapshot, realigned_arena, config, mate_in_other_bin, is_dodgy) {
                break;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{Cluster, ClusterId, Read};
    use crate::reference::Contig;

    fn setup(read_bases: &[u8], ref_bases: &[u8]) -> (Reference, Cluster) {
        let reference = Reference::new(vec![Contig::new(0, "chr1", ref_bases.to_vec())]);
        let cluster = Cluster::single(ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 }, Read::new(0, read_bases.to_vec(), vec![40; read_bases.len()]));
        (reference, cluster)
    }

    /// A read that matches the reference perfectly once a 3-base deletion at offset 40 is
    /// accounted for; forced into an ungapped `100M` CIGAR it shows 3 mismatches, and the
    /// catalog carries exactly that deletion.
    fn deletion_scenario() -> (Reference, Cluster, RealignerGaps) {
        // Read is all 'A'; the reference has 3 extra 'G' bases spliced in at offset 40 that
        // the read simply doesn't have. Forced into `100M`, those 3 reference bases eat
        // into the read's own tail, producing 3 mismatches that a `3D` at that point would
        // explain away entirely.
        let read = vec![b'A'; 100];
        let mut reference_bases = vec![b'A'; 40];
        reference_bases.extend(std::iter::repeat(b'G').take(3));
        reference_bases.extend(std::iter::repeat(b'A').take(60));
        let (reference, cluster) = setup(&read, &reference_bases);
        let gaps = RealignerGaps::new(vec![Gap::new(40, 3)]);
        (reference, cluster, gaps)
    }

    #[test]
    fn realigns_a_cataloged_deletion_and_drops_the_mismatches() {
        let (reference, cluster, gaps) = deletion_scenario();
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut source_arena = CigarArena::new();
        fragment.cigar = source_arena.push(Cigar::Match(100));
        update_fragment_cigar(&reference, &mut fragment, 0, &source_arena, fragment.cigar, &config);
        assert_eq!(fragment.mismatch_count, 3);

        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, false);

        assert!(changed);
        assert_eq!(fragment.mismatch_count, 0);
        assert_eq!(realigned_arena.range(fragment.cigar), &[Cigar::Match(40), Cigar::Del(3), Cigar::Match(60)]);
    }

    #[test]
    fn zero_edit_distance_fragment_is_left_alone() {
        let bases = vec![b'A'; 50];
        let (reference, cluster) = setup(&bases, &bases);
        let gaps = RealignerGaps::new(vec![Gap::new(10, 3)]);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut source_arena = CigarArena::new();
        fragment.cigar = source_arena.push(Cigar::Match(50));
        update_fragment_cigar(&reference, &mut fragment, 0, &source_arena, fragment.cigar, &config);
        assert_eq!(fragment.edit_distance, 0);

        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, false);
        assert!(!changed);
    }

    #[test]
    fn dodgy_alignment_is_skipped_unless_configured() {
        let (reference, cluster, gaps) = deletion_scenario();
        let mut config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut source_arena = CigarArena::new();
        fragment.cigar = source_arena.push(Cigar::Match(100));
        update_fragment_cigar(&reference, &mut fragment, 0, &source_arena, fragment.cigar, &config);

        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, true);
        assert!(!changed);

        config.realign_dodgy_alignments = true;
        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, true);
        assert!(changed);
    }

    #[test]
    fn candidate_that_would_overrun_the_contig_is_rejected() {
        // 250bp read, heavily right-clipped down to a 30bp mapped span that sits right at
        // the end of a short contig; the catalog deletion would push its reference span
        // past the contig end, so the realigner must leave the soft clip as-is.
        let read = vec![b'A'; 250];
        let contig_len = 32usize;
        let mut reference_bases = vec![b'A'; 10];
        reference_bases.extend(std::iter::repeat(b'G').take(3));
        reference_bases.extend(std::iter::repeat(b'A').take(contig_len - 13));
        let (reference, cluster) = setup(&read, &reference_bases);
        let gaps = RealignerGaps::new(vec![Gap::new(10, 3)]);
        let config = AlignerConfig::default();

        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut source_arena = CigarArena::new();
        fragment.cigar = source_arena.push_all(&[Cigar::Match(30), Cigar::SoftClip(220)]);
        update_fragment_cigar(&reference, &mut fragment, 0, &source_arena, fragment.cigar, &config);
        let original_cigar = source_arena.range(fragment.cigar).to_vec();

        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, false);

        assert!(!changed);
        assert_eq!(source_arena.range(fragment.cigar), original_cigar.as_slice());
    }

    #[test]
    fn fragment_with_its_own_indel_is_not_recombined() {
        let bases = vec![b'A'; 50];
        let (reference, cluster) = setup(&bases, &bases);
        let gaps = RealignerGaps::new(vec![Gap::new(10, 3)]);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut source_arena = CigarArena::new();
        fragment.cigar = source_arena.push_all(&[Cigar::Match(20), Cigar::Ins(2), Cigar::Match(28)]);
        update_fragment_cigar(&reference, &mut fragment, 0, &source_arena, fragment.cigar, &config);

        let mut realigned_arena = CigarArena::new();
        let changed = realign_fragment(&reference, &gaps, 0, 1_000, &mut fragment, &source_arena, &mut realigned_arena, &config, false, false);
        assert!(!changed);
    }
}
