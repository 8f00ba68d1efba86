//! Reconciles two seed-anchored placements of the same read that disagree on position by
//! inserting a single indel between their anchoring seeds (4.6 Simple-indel aligner).

use rust_htslib::bam::record::Cigar;

use crate::align::aligner_base::{reference_clip, update_fragment_cigar};
use crate::cigar_arena::CigarArena;
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::reference::{Contig, Reference};
use crate::seed::SeedMetadata;

/// Attempts to explain the position disagreement between `head` (anchored by
/// `head_seed`) and `tail` (anchored by `tail_seed`, the same read, the same strand) with
/// a single insertion or deletion. Returns the merged, scored fragment if one is found
/// that strictly improves on the better of the two inputs.
pub fn try_simple_indel<'c>(
    reference: &Reference,
    head: &FragmentMetadata<'c>,
    head_seed: &SeedMetadata,
    tail: &FragmentMetadata<'c>,
    tail_seed: &SeedMetadata,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> Option<FragmentMetadata<'c>> {
    if config.semialigned_gap_limit <= 0 {
        return None;
    }
    if head.reverse != tail.reverse || head.contig_id != tail.contig_id {
        return None;
    }

    let delta = tail.unclipped_position() - head.unclipped_position();
    if delta == 0 || delta.abs() > config.semialigned_gap_limit {
        return None;
    }
    let tail_downstream = tail_seed.offset > head_seed.offset;
    if delta > 0 && !tail_downstream {
        return None;
    }

    let read_len = head.read_length() as i64;
    let mag = delta.abs();
    let window_start = (head_seed.end_offset() as i64).max(0);
    let window_end = (tail_seed.offset as i64).min(read_len);
    if window_start > window_end {
        return None;
    }
    if delta < 0 && window_end - window_start < mag {
        // Not enough room between the seeds to fit the insertion.
        return None;
    }

    let read_bases = head.read().bases(head.reverse);
    let contig = reference.contig(head.contig_id);
    let base_ref_pos = head.unclipped_position();
    let flank = config.gap_flank_bases as i64;
    let flank_max = config.gap_flank_mismatches_max;

    let mut best: Option<(i64, u32)> = None;
    let mut gap_pos = window_start;
    while gap_pos <= window_end {
        if delta < 0 && gap_pos + mag > read_len {
            gap_pos += 1;
            continue;
        }
        let (before, after) = flank_mismatches(read_bases, contig, base_ref_pos, gap_pos, delta, mag, flank, read_len);
        if before <= flank_max && after <= flank_max {
            let total = before + after;
            if best.map_or(true, |(_, b)| total < b) {
                best = Some((gap_pos, total));
            }
        }
        gap_pos += 1;
    }
    let (gap_pos, _) = best?;

    let mut ops = Vec::new();
    if gap_pos > 0 {
        ops.push(Cigar::Match(gap_pos as u32));
    }
    if delta > 0 {
        ops.push(Cigar::Del(mag as u32));
        let tail_len = read_len - gap_pos;
        if tail_len > 0 {
            ops.push(Cigar::Match(tail_len as u32));
        }
    } else {
        ops.push(Cigar::Ins(mag as u32));
        let tail_len = read_len - gap_pos - mag;
        if tail_len > 0 {
            ops.push(Cigar::Match(tail_len as u32));
        }
    }

    let (new_position, ops) = reference_clip(base_ref_pos, contig.len(), &ops);
    let range = arena.push_all(&ops);

    let mut candidate = head.clone();
    candidate.position = new_position;
    let matches = update_fragment_cigar(reference, &mut candidate, new_position, arena, range, config);
    candidate.cigar = range;
    let placed_ops = arena.range(range);
    candidate.left_soft_clip = match placed_ops.first() {
        Some(Cigar::SoftClip(len)) => *len,
        _ => 0,
    };
    candidate.right_soft_clip = match placed_ops.last() {
        Some(Cigar::SoftClip(len)) if placed_ops.len() > 1 => *len,
        _ => 0,
    };
    if matches == 0 {
        return None;
    }

    let baseline_sw_score = head.sw_score.min(tail.sw_score);
    let baseline_mismatches = head.mismatch_count.min(tail.mismatch_count);
    let improves =
        candidate.sw_score < baseline_sw_score || (candidate.sw_score == baseline_sw_score && candidate.mismatch_count < baseline_mismatches);
    if !improves {
        return None;
    }

    Some(candidate)
}

/// Reference coordinate implied by a read index under the candidate gap placement, or
/// `None` if the read index falls inside an insertion (no reference base to compare).
fn implied_ref_pos(read_index: i64, gap_pos: i64, delta: i64, mag: i64, base_ref_pos: i64) -> Option<i64> {
    if read_index < gap_pos {
        Some(base_ref_pos + read_index)
    } else if delta > 0 {
        Some(base_ref_pos + read_index + delta)
    } else if read_index < gap_pos + mag {
        None
    } else {
        Some(base_ref_pos + read_index - mag)
    }
}

#[allow(clippy::too_many_arguments)]
fn flank_mismatches(
    read: &[u8],
    contig: &Contig,
    base_ref_pos: i64,
    gap_pos: i64,
    delta: i64,
    mag: i64,
    flank: i64,
    read_len: i64,
) -> (u32, u32) {
    let before_range = (gap_pos - flank).max(0)..gap_pos;
    let after_range = gap_pos..(gap_pos + flank).min(read_len);

    let count = |range: std::ops::Range<i64>| -> u32 {
        let mut mismatches = 0u32;
        for r in range {
            let Some(rp) = implied_ref_pos(r, gap_pos, delta, mag, base_ref_pos) else {
                continue;
            };
            let ref_base = if rp >= 0 && (rp as usize) < contig.len() {
                contig.forward[rp as usize]
            } else {
                b'N'
            };
            let read_base = read[r as usize];
            if ref_base == b'N' || ref_base.to_ascii_uppercase() != read_base.to_ascii_uppercase() {
                mismatches += 1;
            }
        }
        mismatches
    };

    (count(before_range), count(after_range))
}
