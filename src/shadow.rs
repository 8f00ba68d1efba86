//! Finds a mate ("shadow") for one mapped read ("orphan") by scanning the reference
//! window the template-length model says the mate should fall within (4.8 Shadow aligner).

use std::collections::HashSet;

use crate::align::adapter::AdapterClipper;
use crate::align::ungapped::align_ungapped;
use crate::cigar_arena::CigarArena;
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::read::{Cluster, ReadIndex};
use crate::reference::{Contig, Reference};

const KMER: usize = 7;
const TABLE_SIZE: usize = 1 << (2 * KMER);

fn encode_base(b: u8) -> Option<u32> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn kmer_index(seq: &[u8], pos: usize) -> Option<usize> {
    let mut idx = 0u32;
    for &b in seq.get(pos..pos + KMER)? {
        idx = (idx << 2) | encode_base(b)?;
    }
    Some(idx as usize)
}

fn kmer_index_at_contig(contig: &Contig, pos: i64) -> Option<usize> {
    if pos < 0 || pos as usize + KMER > contig.len() {
        return None;
    }
    kmer_index(&contig.forward, pos as usize)
}

/// First-seen position table over the shadow sequence's 7-mers; entries past the first
/// occurrence of a repeated 7-mer are never overwritten (4.8 step 1).
fn build_shadow_table(shadow: &[u8]) -> Vec<i32> {
    let mut table = vec![-1i32; TABLE_SIZE];
    if shadow.len() >= KMER {
        for p in 0..=shadow.len() - KMER {
            if let Some(idx) = kmer_index(shadow, p) {
                if table[idx] < 0 {
                    table[idx] = p as i32;
                }
            }
        }
    }
    table
}

/// Candidate shadow start positions (forward reference coordinates) implied by scanning
/// the window `[orphan.position - mate_max, orphan.position + mate_max]` against the
/// shadow's 7-mer table. Returns an empty list if the window exceeds the configured cap.
fn candidate_positions(reference: &Reference, contig_id: usize, orphan_position: i64, mate_max: i64, shadow: &[u8], config: &AlignerConfig) -> Vec<i64> {
    let contig = reference.contig(contig_id);
    let window_start = (orphan_position - mate_max).max(0);
    let window_end = (orphan_position + mate_max).min(contig.len() as i64);
    if window_end <= window_start {
        return Vec::new();
    }
    if window_end - window_start > config.unreasonably_high_insert_size_plus_flanks {
        return Vec::new();
    }

    let table = build_shadow_table(shadow);
    let mut candidates: HashSet<i64> = HashSet::new();
    let mut pos = window_start;
    while pos + KMER as i64 <= window_end {
        if let Some(idx) = kmer_index_at_contig(contig, pos) {
            let offset = table[idx];
            if offset >= 0 {
                candidates.insert(pos - offset as i64);
            }
        }
        pos += 1;
    }
    candidates.into_iter().collect()
}

/// Searches for `shadow_read_index`'s placement near `orphan`, returning every candidate
/// that ungapped-aligns successfully (4.8 step 3).
pub fn find_shadows<'c>(
    reference: &Reference,
    cluster: &'c Cluster,
    orphan: &FragmentMetadata<'c>,
    shadow_read_index: ReadIndex,
    shadow_reverse: bool,
    mate_max: i64,
    adapters: Option<&AdapterClipper>,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> Vec<FragmentMetadata<'c>> {
    let Some(shadow_read) = cluster.read(shadow_read_index) else {
        return Vec::new();
    };
    let shadow_bases = shadow_read.bases(shadow_reverse);
    let positions = candidate_positions(reference, orphan.contig_id, orphan.position, mate_max, shadow_bases, config);

    let mut results = Vec::new();
    for position in positions {
        let mut fragment = FragmentMetadata::new(cluster, shadow_read_index, orphan.contig_id, position, shadow_reverse);
        if align_ungapped(reference, &mut fragment, adapters, arena, config) {
            results.push(fragment);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{ClusterId, Read};
    use crate::reference::Contig;

    #[test]
    fn finds_a_mate_placed_within_the_search_window() {
        let orphan_bases = b"ACGTACGTAC".to_vec();
        let mate_bases = b"TTGGCCAATT".to_vec();
        let mut reference_bases = vec![b'N'; 50];
        reference_bases[10..20].copy_from_slice(&orphan_bases);
        reference_bases[35..45].copy_from_slice(&mate_bases);
        let reference = Reference::new(vec![Contig::new(0, "chr1", reference_bases)]);

        let cluster = Cluster::paired(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, orphan_bases.clone(), vec![40; 10]),
            Read::new(1, mate_bases.clone(), vec![40; 10]),
        );
        let mut orphan = FragmentMetadata::new(&cluster, 0, 0, 10, false);
        orphan.position = 10;
        let config = AlignerConfig::default();
        let mut arena = CigarArena::new();

        let found = find_shadows(&reference, &cluster, &orphan, 1, false, 40, None, &mut arena, &config);
        assert!(found.iter().any(|f| f.position == 35));
    }

    #[test]
    fn oversized_window_is_skipped() {
        let cluster = Cluster::single(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, b"ACGTACGTAC".to_vec(), vec![40; 10]),
        );
        let reference = Reference::new(vec![Contig::new(0, "chr1", vec![b'A'; 100_000])]);
        let mut config = AlignerConfig::default();
        config.unreasonably_high_insert_size_plus_flanks = 100;
        let orphan = FragmentMetadata::new(&cluster, 0, 0, 50_000, false);
        let mut arena = CigarArena::new();

        let found = find_shadows(&reference, &cluster, &orphan, 0, false, 50_000, None, &mut arena, &config);
        assert!(found.is_empty());
    }
}
