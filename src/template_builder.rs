//! Combines one cluster's per-read candidate fragments into the best template: the best
//! pair for paired-end clusters, a rescued or disjoint template when no pair is found, or
//! the single best candidate for single-end clusters (4.10 Template builder).

use crate::align::adapter::AdapterClipper;
use crate::cigar_arena::CigarArena;
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::read::Cluster;
use crate::reference::Reference;
use crate::shadow::find_shadows;
use crate::template::BamTemplate;
use crate::template_length::{CheckModelResult, TemplateLengthStatistics};
use crate::utils::math_utils::MathUtils;

/// `round(-10 * log10(1 - bestP / totalP))`, clamped to `[0, ceiling]`, with a
/// rest-of-genome correction folded into the denominator (4.10 Mapping-quality formula).
fn mapping_quality(best_log_p: f64, total_log_p: f64, config: &AlignerConfig) -> i16 {
    if best_log_p == f64::NEG_INFINITY {
        return 0;
    }
    let corrected_total = MathUtils::log_sum_exp_two(total_log_p, config.rest_of_genome_correction);
    let ratio = (best_log_p - corrected_total).exp().min(1.0);
    let error_prob = (1.0 - ratio).max(10f64.powi(-(config.mapq_ceiling as i32) - 1));
    let mapq = (-10.0 * error_prob.log10()).round();
    mapq.clamp(0.0, config.mapq_ceiling as f64) as i16
}

/// Signed BAM template length for each mate, per the BAM convention: the leftmost mate's
/// tlen is positive, the other's is its negation.
fn template_length(f1: &FragmentMetadata, f2: &FragmentMetadata) -> (i64, i64) {
    let start = f1.position.min(f2.position);
    let end = f1.end_position().max(f2.end_position());
    let len = end - start;
    let f1_is_leftmost = f1.position < f2.position || (f1.position == f2.position && f1.read_index <= f2.read_index);
    if f1_is_leftmost {
        (len, -len)
    } else {
        (-len, len)
    }
}

/// Forces mapping quality to the configured dodgy sentinel unless the best candidate is a
/// perfect (zero-mismatch) alignment, in which case it gets `DODGY_BUT_CLEAN_ALIGNMENT_SCORE`
/// (4.10 Dodgy flag).
fn apply_dodgy_override(template: &mut BamTemplate, config: &AlignerConfig) {
    if !template.dodgy {
        return;
    }
    for (idx, fragment) in template.fragments.iter().enumerate() {
        if let Some(fragment) = fragment {
            template.mapq[idx] = if fragment.mismatch_count == 0 {
                config.dodgy_but_clean_alignment_score as i16
            } else {
                config.dodgy_alignment_score.resolve()
            };
        }
    }
}

fn best_by_log_probability<'a, 'c>(list: &'a [FragmentMetadata<'c>]) -> Option<&'a FragmentMetadata<'c>> {
    list.iter().max_by(|a, b| a.log_probability.partial_cmp(&b.log_probability).unwrap_or(std::cmp::Ordering::Equal))
}

fn total_log_probability<'c>(list: &[FragmentMetadata<'c>]) -> f64 {
    MathUtils::log_sum_exp(&list.iter().map(|f| f.log_probability).collect::<Vec<_>>())
}

fn build_single_end<'c>(list: Vec<FragmentMetadata<'c>>, config: &AlignerConfig) -> BamTemplate<'c> {
    let Some(best) = best_by_log_probability(&list).cloned() else {
        return BamTemplate::unmapped();
    };
    let total = total_log_probability(&list);
    let dodgy = !best.has_strong_anchor();
    let mapq = mapping_quality(best.log_probability, total, config);
    let mut template = BamTemplate {
        fragments: [Some(best), None],
        total_log_probability: total,
        mapq: [mapq, 0],
        tlen: [0, 0],
        proper_pair: false,
        dodgy,
    };
    apply_dodgy_override(&mut template, config);
    template
}

struct PairSearch {
    best: Option<(usize, usize, f64)>,
    total_log_p: f64,
}

/// `locateBestPair`: the best-scoring (f1, f2) pair on the same contig whose orientation
/// and length the template-length model accepts, plus the summed log-probability over
/// every passing pair (used as the mapping-quality denominator). Candidates more than
/// `orphanLogProbabilitySlack` worse than their read's own best are skipped, and at most
/// `trackedRepeatsMaxOneRead` candidates per read are considered.
fn locate_best_pair(list0: &[FragmentMetadata], list1: &[FragmentMetadata], stats: &TemplateLengthStatistics, config: &AlignerConfig) -> PairSearch {
    let best_f1 = list0.iter().map(|f| f.log_probability).fold(f64::NEG_INFINITY, f64::max);
    let best_f2 = list1.iter().map(|f| f.log_probability).fold(f64::NEG_INFINITY, f64::max);

    let mut best: Option<(usize, usize, f64)> = None;
    let mut total_log_p = f64::NEG_INFINITY;

    for (i, f1) in list0.iter().take(config.tracked_repeats_max_one_read).enumerate() {
        if best_f1 - f1.log_probability > config.orphan_log_probability_slack {
            continue;
        }
        for (j, f2) in list1.iter().take(config.tracked_repeats_max_one_read).enumerate() {
            if best_f2 - f2.log_probability > config.orphan_log_probability_slack {
                continue;
            }
            if f1.contig_id != f2.contig_id {
                continue;
            }
            if stats.check_model(f1, f2) == CheckModelResult::NoMatch {
                continue;
            }

            let joint = f1.log_probability + f2.log_probability;
            total_log_p = MathUtils::log_sum_exp_two(total_log_p, joint);

            let better = match best {
                None => true,
                Some((bi, bj, bjoint)) => {
                    joint > bjoint
                        || (joint == bjoint
                            && (f1.contig_id, f1.position, f2.contig_id, f2.position)
                                < (list0[bi].contig_id, list0[bi].position, list1[bj].contig_id, list1[bj].position))
                }
            };
            if better {
                best = Some((i, j, joint));
            }
        }
    }

    PairSearch { best, total_log_p }
}

fn build_paired_end_template<'c>(f1: FragmentMetadata<'c>, f2: FragmentMetadata<'c>, total_log_p: f64, stats: &TemplateLengthStatistics, config: &AlignerConfig) -> BamTemplate<'c> {
    let joint = f1.log_probability + f2.log_probability;
    let proper_pair = stats.check_model(&f1, &f2) == CheckModelResult::Nominal;
    let (tlen0, tlen1) = template_length(&f1, &f2);
    let dodgy = !f1.has_strong_anchor() && !f2.has_strong_anchor();
    let mapq = mapping_quality(joint, total_log_p, config);

    let mut template = BamTemplate {
        fragments: [Some(f1), Some(f2)],
        total_log_probability: total_log_p,
        mapq: [mapq, mapq],
        tlen: [tlen0, tlen1],
        proper_pair,
        dodgy,
    };
    apply_dodgy_override(&mut template, config);
    template
}

/// `buildDisjoinedTemplate`: rescues a missing mate via the shadow aligner from every
/// orphan candidate within slack of its read's best; if the rescued pair beats the best
/// pair already known, it is promoted to a paired template, otherwise the template
/// reports one mapped mate and the other absent.
#[allow(clippy::too_many_arguments)]
fn build_disjoined_template<'c>(
    reference: &Reference,
    cluster: &'c Cluster,
    list0: Vec<FragmentMetadata<'c>>,
    list1: Vec<FragmentMetadata<'c>>,
    stats: &TemplateLengthStatistics,
    adapters: Option<&AdapterClipper>,
    arena: &mut CigarArena,
    config: &AlignerConfig,
    known_pair: PairSearch,
) -> BamTemplate<'c> {
    let mut best_rescue: Option<(FragmentMetadata<'c>, FragmentMetadata<'c>, f64)> = None;

    let mut try_rescue = |orphans: &[FragmentMetadata<'c>], orphan_read_index: usize, shadow_read_index: usize| {
        let Some(best_orphan_logp) = orphans.iter().map(|f| f.log_probability).fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))) else {
            return;
        };
        for orphan in orphans.iter().filter(|f| best_orphan_logp - f.log_probability <= config.orphan_log_probability_slack) {
            let mate_read_len = cluster.read(shadow_read_index).map(|r| r.len() as u32).unwrap_or(0);
            let (_, mate_max) = stats.mate_min_max_position(mate_read_len);
            let shadow_reverse = !orphan.reverse;
            let shadows = find_shadows(reference, cluster, orphan, shadow_read_index, shadow_reverse, mate_max.max(1), adapters, &mut *arena, config);
            for shadow in shadows {
                let joint = orphan.log_probability + shadow.log_probability;
                let better = best_rescue.as_ref().map_or(true, |(_, _, best_joint)| joint > *best_joint);
                if better {
                    let (orphan_frag, shadow_frag) = if orphan_read_index == 0 {
                        (orphan.clone(), shadow)
                    } else {
                        (shadow, orphan.clone())
                    };
                    best_rescue = Some((orphan_frag, shadow_frag, joint));
                }
            }
        }
    };

    try_rescue(&list0, 0, 1);
    try_rescue(&list1, 1, 0);

    if let Some((f0, f1, joint)) = best_rescue {
        let known_best_joint = known_pair.best.map(|(_, _, j)| j).unwrap_or(f64::NEG_INFINITY);
        if joint > known_best_joint {
            let total = MathUtils::log_sum_exp_two(known_pair.total_log_p, joint);
            return build_paired_end_template(f0, f1, total, stats, config);
        }
    }

    let best0 = best_by_log_probability(&list0).cloned();
    let best1 = best_by_log_probability(&list1).cloned();
    let (winner_index, winner) = match (&best0, &best1) {
        (Some(a), Some(b)) if b.log_probability > a.log_probability => (1usize, b.clone()),
        (Some(a), _) => (0usize, a.clone()),
        (None, Some(b)) => (1usize, b.clone()),
        (None, None) => return BamTemplate::unmapped(),
    };

    let total = MathUtils::log_sum_exp_two(total_log_probability(&list0), total_log_probability(&list1));
    let dodgy = !winner.has_strong_anchor();
    let mapq = mapping_quality(winner.log_probability, total, config);

    let mut fragments = [None, None];
    let mut mapq_slots = [0i16, 0i16];
    fragments[winner_index] = Some(winner);
    mapq_slots[winner_index] = mapq;

    let mut template = BamTemplate {
        fragments,
        total_log_probability: total,
        mapq: mapq_slots,
        tlen: [0, 0],
        proper_pair: false,
        dodgy,
    };
    apply_dodgy_override(&mut template, config);
    template
}

/// `buildTemplate`: dispatches to the single-end or paired-end path per the cluster's
/// shape, given the per-read candidate lists `fragment_builder::build` already produced.
#[allow(clippy::too_many_arguments)]
pub fn build_template<'c>(
    reference: &Reference,
    cluster: &'c Cluster,
    fragments: [Vec<FragmentMetadata<'c>>; 2],
    stats: &TemplateLengthStatistics,
    adapters: Option<&AdapterClipper>,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> BamTemplate<'c> {
    let [list0, list1] = fragments;
    if !cluster.is_paired() {
        return build_single_end(list0, config);
    }
    if list0.is_empty() && list1.is_empty() {
        return BamTemplate::unmapped();
    }

    let pair_search = locate_best_pair(&list0, &list1, stats, config);
    if let Some((i, j, joint)) = pair_search.best {
        let _ = joint;
        return build_paired_end_template(list0[i].clone(), list1[j].clone(), pair_search.total_log_p, stats, config);
    }
    build_disjoined_template(reference, cluster, list0, list1, stats, adapters, arena, config, pair_search)
}
