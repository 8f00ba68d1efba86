//! Turns one cluster's seed-match stream into deduplicated, scored candidate alignments
//! per read (4.7 Fragment builder).

use std::collections::{HashMap, HashSet};

use crate::align::adapter::AdapterClipper;
use crate::align::gapped::align_gapped;
use crate::align::simple_indel::try_simple_indel;
use crate::align::ungapped::align_ungapped;
use crate::cigar_arena::CigarArena;
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::read::Cluster;
use crate::reference::Reference;
use crate::seed::{Match, MatchKind, SeedMetadata};

/// `build(contigs, readMetadata, seedMetadata, adapters, matches, cluster, withGaps)`:
/// runs the full seed-to-fragment pipeline for one cluster and returns, per read index, a
/// vector of unique, scored candidates.
pub fn build<'c>(
    reference: &Reference,
    cluster: &'c Cluster,
    seeds: &[SeedMetadata],
    adapters: Option<&AdapterClipper>,
    matches: &[Match],
    with_gaps: bool,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> [Vec<FragmentMetadata<'c>>; 2] {
    let seed_by_id: HashMap<usize, SeedMetadata> = seeds.iter().map(|s| (s.seed_id, *s)).collect();
    let repeat_exceeded = tally_repeat_exceeded_seeds(matches, config.repeat_threshold);

    let mut lists: [Vec<FragmentMetadata<'c>>; 2] = [Vec::new(), Vec::new()];
    for m in matches {
        if m.is_no_match() {
            break;
        }
        let MatchKind::Hit { seed_id, contig_id, position, reverse } = m.0 else {
            continue;
        };
        if repeat_exceeded.contains(&seed_id) {
            continue;
        }
        let Some(seed) = seed_by_id.get(&seed_id) else {
            continue;
        };
        let Some(read) = cluster.read(seed.read_index) else {
            continue;
        };
        let read_len = read.len() as u32;
        let frag_position = if !reverse {
            position - seed.offset as i64
        } else {
            position + seed.length as i64 + seed.offset as i64 - read_len as i64
        };

        let mut fragment = FragmentMetadata::new(cluster, seed.read_index, contig_id, frag_position, reverse);
        fragment.first_seed_index = Some(seed_id);
        fragment.unique_seed_count = 1;
        lists[seed.read_index].push(fragment);
    }

    for list in lists.iter_mut() {
        *list = dedup_sorted(std::mem::take(list));

        for fragment in list.iter_mut() {
            align_ungapped(reference, fragment, adapters, arena, config);
        }
        *list = dedup_sorted(std::mem::take(list));

        if config.semialigned_gap_limit > 0 {
            let merged = find_simple_indel_merges(reference, list, &seed_by_id, arena, config);
            list.extend(merged);
            *list = dedup_sorted(std::mem::take(list));
        }

        if with_gaps {
            for fragment in list.iter_mut() {
                if fragment.mismatch_count > config.gapped_cutoff {
                    align_gapped(reference, fragment, arena, config);
                }
            }
            *list = dedup_sorted(std::mem::take(list));
        }
    }

    lists
}

fn tally_repeat_exceeded_seeds(matches: &[Match], repeat_threshold: u32) -> HashSet<usize> {
    let mut counts: HashMap<usize, u32> = HashMap::new();
    for m in matches {
        if m.is_no_match() {
            break;
        }
        if let Some(seed_id) = m.seed_id() {
            *counts.entry(seed_id).or_insert(0) += 1;
        }
    }
    counts.into_iter().filter(|&(_, c)| c >= repeat_threshold).map(|(id, _)| id).collect()
}

/// Sorts by `(contigId, position, reverse)` and merges exact duplicates, keeping whichever
/// duplicate scores better (simple-indel and gapped candidates reuse their head fragment's
/// position, so they routinely collide here with the plain ungapped candidate they were
/// built to improve on) and summing the seeds that agree on this placement.
fn dedup_sorted<'c>(mut list: Vec<FragmentMetadata<'c>>) -> Vec<FragmentMetadata<'c>> {
    list.sort_by(|a, b| a.dedup_key().cmp(&b.dedup_key()));
    let mut out: Vec<FragmentMetadata<'c>> = Vec::with_capacity(list.len());
    for fragment in list {
        if let Some(last) = out.last_mut() {
            if last.dedup_key() == fragment.dedup_key() {
                let seed_count = last.unique_seed_count + fragment.unique_seed_count;
                let first_seed_index = last.first_seed_index.or(fragment.first_seed_index);
                if fragment.log_probability > last.log_probability {
                    *last = fragment;
                }
                last.unique_seed_count = seed_count;
                last.first_seed_index = first_seed_index;
                continue;
            }
        }
        out.push(fragment);
    }
    out
}

fn find_simple_indel_merges<'c>(
    reference: &Reference,
    list: &[FragmentMetadata<'c>],
    seed_by_id: &HashMap<usize, SeedMetadata>,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> Vec<FragmentMetadata<'c>> {
    let mut merged = Vec::new();
    for i in 0..list.len() {
        for j in 0..list.len() {
            if i == j {
                continue;
            }
            let (head, tail) = (&list[i], &list[j]);
            let (Some(hs), Some(ts)) = (head.first_seed_index, tail.first_seed_index) else {
                continue;
            };
            if hs == ts {
                continue;
            }
            let (Some(head_seed), Some(tail_seed)) = (seed_by_id.get(&hs), seed_by_id.get(&ts)) else {
                continue;
            };
            if let Some(candidate) = try_simple_indel(reference, head, head_seed, tail, tail_seed, arena, config) {
                merged.push(candidate);
            }
        }
    }
    merged
}
