//! CIGAR evaluation: walk a CIGAR against reference and read, (re)computing everything a
//! fragment reports about the quality of its alignment (4.2 Aligner base).

use rust_htslib::bam::record::Cigar;

use crate::cigar_arena::{CigarArena, CigarRange};
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::reference::Reference;
use crate::utils::quality_utils::Quality;

/// `updateFragmentCigar`: walks the ops in `range`, scoring them against `reference`
/// starting at `strand_position` and the fragment's read on its chosen strand. Recomputes
/// mismatch count, edit distance, gap count, normalized SW score, observed length,
/// log-probability and longest match run on `fragment`, and returns the number of
/// matching bases. A zero return means the caller should mark the fragment unmapped.
pub fn update_fragment_cigar(
    reference: &Reference,
    fragment: &mut FragmentMetadata,
    strand_position: i64,
    arena: &CigarArena,
    range: CigarRange,
    config: &AlignerConfig,
) -> u32 {
    let contig = reference.contig(fragment.contig_id);
    let read_bases = fragment.read().bases(fragment.reverse).to_vec();
    let read_quals = fragment.read().qualities(fragment.reverse).to_vec();

    let mut ref_pos = strand_position;
    let mut read_pos: usize = 0;

    let mut mismatches = 0u32;
    let mut matches = 0u32;
    let mut edit_distance = 0u32;
    let mut gap_count = 0u32;
    let mut gap_lengths = 0u32;
    let mut observed_length = 0u32;
    let mut log_probability = 0.0f64;
    let mut longest_run = 0u32;
    let mut current_run = 0u32;

    for op in arena.range(range) {
        match op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                let len = *len;
                for i in 0..len {
                    let rp = ref_pos + i as i64;
                    let ref_base = if rp >= 0 && (rp as usize) < contig.len() {
                        contig.forward[rp as usize]
                    } else {
                        b'N'
                    };
                    let read_base = read_bases[read_pos + i as usize];
                    let q = read_quals[read_pos + i as usize];
                    if ref_base == b'N' || !bases_match(ref_base, read_base) {
                        mismatches += 1;
                        log_probability += Quality::get_log_mismatch(q);
                        current_run = 0;
                    } else {
                        matches += 1;
                        log_probability += Quality::get_log_match(q);
                        current_run += 1;
                        longest_run = longest_run.max(current_run);
                    }
                }
                ref_pos += len as i64;
                read_pos += len as usize;
                observed_length += len;
            }
            Cigar::Ins(len) => {
                edit_distance += len;
                gap_count += 1;
                gap_lengths += len;
                read_pos += *len as usize;
                current_run = 0;
            }
            Cigar::Del(len) => {
                edit_distance += len;
                gap_count += 1;
                gap_lengths += len;
                ref_pos += *len as i64;
                observed_length += len;
                current_run = 0;
            }
            Cigar::SoftClip(len) => {
                // Unobserved, not wrong: contributes the match term (4.2).
                for i in 0..*len {
                    let q = read_quals[read_pos + i as usize];
                    log_probability += Quality::get_log_match(q);
                }
                read_pos += *len as usize;
                current_run = 0;
            }
            Cigar::HardClip(_) | Cigar::RefSkip(_) | Cigar::Pad(_) => {
                current_run = 0;
            }
        }
    }

    edit_distance += mismatches;

    fragment.mismatch_count = mismatches;
    fragment.edit_distance = edit_distance;
    fragment.gap_count = gap_count;
    fragment.observed_length = observed_length;
    fragment.log_probability = log_probability;
    fragment.longest_match_run = longest_run;
    fragment.sw_score = normalized_sw_score(mismatches, gap_count, gap_lengths, config);
    fragment.mapped = matches > 0;

    matches
}

fn bases_match(a: u8, b: u8) -> bool {
    a.to_ascii_uppercase() == b.to_ascii_uppercase()
}

/// Normalized Smith-Waterman score (higher is worse), per 4.2:
/// `(match - mismatch) * mismatches + (match - open) * gaps + (match - extend) * (gapLengths - gaps)`,
/// with the per-gap extension contribution capped at `min_gap_extend_score` per gap so a
/// single very long indel cannot dominate the score (9 DESIGN NOTES flags this acceptance
/// test as source-ambiguous; we make the cap explicit here).
pub fn normalized_sw_score(mismatches: u32, gaps: u32, gap_lengths: u32, config: &AlignerConfig) -> f64 {
    let mismatch_term = (config.match_score - config.mismatch_score) as f64 * mismatches as f64;
    let open_term = (config.match_score - config.gap_open_score) as f64 * gaps as f64;
    let uncapped_extend_term =
        (config.match_score - config.gap_extend_score) as f64 * (gap_lengths.saturating_sub(gaps)) as f64;
    let capped_extend_term = uncapped_extend_term.min((-config.min_gap_extend_score) as f64 * gaps as f64);
    mismatch_term + open_term + capped_extend_term
}

/// Reference clipping (4.2): if `position < 0`, the leading `-position` bases become
/// soft-clip and position advances to 0; if the read runs past the contig end, the
/// trailing bases become soft-clip, with a one-base rollback if the read is entirely
/// beyond the contig. Returns the adjusted `(position, cigar)`.
pub fn reference_clip(position: i64, contig_length: usize, cigar: &[Cigar]) -> (i64, Vec<Cigar>) {
    use crate::reads::cigar_utils::CigarUtils;

    let mut position = position;
    let mut ops = cigar.to_vec();

    if position < 0 {
        let overhang = (-position) as u32;
        let read_len = CigarUtils::read_length(&ops);
        let clip = overhang.min(read_len);
        ops = clip_read_prefix(&ops, clip);
        position = 0;
    }

    let ref_len = CigarUtils::reference_length(&ops);
    let end = position + ref_len as i64;
    if end > contig_length as i64 {
        let mut overhang = (end - contig_length as i64) as u32;
        if position >= contig_length as i64 {
            // Entirely beyond the contig: roll back one base so at least one reference
            // base is covered, matching the source's one-base-rollback edge case.
            overhang = overhang.saturating_sub(1).max(ref_len.saturating_sub(1));
        }
        ops = clip_read_suffix(&ops, overhang);
    }

    (position, ops)
}

fn clip_read_prefix(cigar: &[Cigar], clip_len: u32) -> Vec<Cigar> {
    use crate::reads::cigar_builder::CigarBuilder;
    use crate::reads::cigar_utils::CigarUtils;

    let mut builder = CigarBuilder::new(true);
    let mut remaining = clip_len;
    for op in cigar {
        if remaining == 0 {
            builder.add(*op).expect("valid cigar element");
            continue;
        }
        if CigarUtils::cigar_consumes_read_bases(op) {
            let len = op.len();
            if len <= remaining {
                remaining -= len;
                builder
                    .add(CigarUtils::cigar_from_element_and_length(&Cigar::SoftClip(0), len))
                    .expect("valid cigar element");
            } else {
                builder.add(Cigar::SoftClip(remaining)).expect("valid cigar element");
                builder
                    .add(CigarUtils::cigar_from_element_and_length(op, len - remaining))
                    .expect("valid cigar element");
                remaining = 0;
            }
        } else {
            // Reference-only ops (deletions) inside the clipped region are dropped.
        }
    }
    builder.make(true).expect("reference clip produces a valid cigar").0
}

fn clip_read_suffix(cigar: &[Cigar], clip_len: u32) -> Vec<Cigar> {
    use crate::reads::cigar_builder::CigarBuilder;
    use crate::reads::cigar_utils::CigarUtils;

    let read_len = CigarUtils::read_length(cigar);
    let clip_len = clip_len.min(read_len);
    let keep = read_len - clip_len;

    let mut builder = CigarBuilder::new(true);
    let mut consumed = 0u32;
    for op in cigar {
        if CigarUtils::cigar_consumes_read_bases(op) {
            let len = op.len();
            if consumed >= keep {
                builder.add(Cigar::SoftClip(len)).expect("valid cigar element");
            } else if consumed + len <= keep {
                builder.add(*op).expect("valid cigar element");
            } else {
                let keep_here = keep - consumed;
                builder
                    .add(CigarUtils::cigar_from_element_and_length(op, keep_here))
                    .expect("valid cigar element");
                builder.add(Cigar::SoftClip(len - keep_here)).expect("valid cigar element");
            }
            consumed += len;
        } else {
            if consumed >= keep {
                // Deletion entirely within the clipped tail: drop it.
            } else {
                builder.add(*op).expect("valid cigar element");
            }
        }
    }
    builder.make(true).expect("reference clip produces a valid cigar").0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{Cluster, ClusterId, Read};
    use crate::reference::{Contig, Reference};

    fn setup(read_bases: &[u8], ref_bases: &[u8]) -> (Reference, Cluster) {
        let reference = Reference::new(vec![Contig::new(0, "chr1", ref_bases.to_vec())]);
        let cluster = Cluster::single(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, read_bases.to_vec(), vec![40; read_bases.len()]),
        );
        (reference, cluster)
    }

    #[test]
    fn perfect_match_has_zero_mismatches_and_full_match_count() {
        let bases = b"ACGTACGTAC";
        let (reference, cluster) = setup(bases, bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        let range = arena.push(Cigar::Match(bases.len() as u32));

        let matches = update_fragment_cigar(&reference, &mut fragment, 0, &arena, range, &config);

        assert_eq!(matches, bases.len() as u32);
        assert_eq!(fragment.mismatch_count, 0);
        assert_eq!(fragment.edit_distance, 0);
        assert!(fragment.mapped);
        assert!(fragment.log_probability <= 0.0);
    }

    #[test]
    fn single_mismatch_increments_edit_distance_and_mismatch_count() {
        let read = b"ACGTTCGTAC";
        let reference_bases = b"ACGTACGTAC";
        let (reference, cluster) = setup(read, reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        let range = arena.push(Cigar::Match(read.len() as u32));

        update_fragment_cigar(&reference, &mut fragment, 0, &arena, range, &config);

        assert_eq!(fragment.mismatch_count, 1);
        assert_eq!(fragment.edit_distance, 1);
    }

    #[test]
    fn zero_matches_marks_fragment_unmapped() {
        let read = b"TTTTT";
        let reference_bases = b"AAAAA";
        let (reference, cluster) = setup(read, reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        let range = arena.push(Cigar::Match(5));

        let matches = update_fragment_cigar(&reference, &mut fragment, 0, &arena, range, &config);

        assert_eq!(matches, 0);
        assert!(!fragment.mapped);
    }

    #[test]
    fn soft_clip_contributes_match_term_not_mismatch() {
        let read = b"ACGTACGTAC";
        let reference_bases = b"ACGTACGTAC";
        let (reference, cluster) = setup(read, reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        let range = arena.push_all(&[Cigar::SoftClip(3), Cigar::Match(7)]);

        update_fragment_cigar(&reference, &mut fragment, 0, &arena, range, &config);

        assert_eq!(fragment.mismatch_count, 0);
        assert_eq!(fragment.observed_length, 7);
    }

    #[test]
    fn deletion_increases_edit_distance_and_observed_length_not_log_probability() {
        let read = b"ACGTACGT";
        let reference_bases = b"ACGTNNACGT";
        let (reference, cluster) = setup(read, reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();
        let range = arena.push_all(&[Cigar::Match(4), Cigar::Del(2), Cigar::Match(4)]);

        update_fragment_cigar(&reference, &mut fragment, 0, &arena, range, &config);

        assert_eq!(fragment.edit_distance, 2);
        assert_eq!(fragment.gap_count, 1);
        assert_eq!(fragment.observed_length, 10);
    }

    #[test]
    fn negative_position_soft_clips_the_overhanging_prefix() {
        let (position, cigar) = reference_clip(-3, 100, &[Cigar::Match(10)]);
        assert_eq!(position, 0);
        assert_eq!(cigar, vec![Cigar::SoftClip(3), Cigar::Match(7)]);
    }

    #[test]
    fn read_running_past_contig_end_soft_clips_the_tail() {
        let (position, cigar) = reference_clip(95, 100, &[Cigar::Match(10)]);
        assert_eq!(position, 95);
        assert_eq!(cigar, vec![Cigar::Match(5), Cigar::SoftClip(5)]);
    }

    #[test]
    fn fully_matching_read_within_contig_is_unaffected() {
        let (position, cigar) = reference_clip(10, 100, &[Cigar::Match(10)]);
        assert_eq!(position, 10);
        assert_eq!(cigar, vec![Cigar::Match(10)]);
    }
}
