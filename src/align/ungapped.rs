//! Placement without alignment search: score a read exactly where a seed (or the template
//! builder) says it sits, after clipping away anything that isn't genuine sequence
//! (4.3 Ungapped aligner).

use rust_htslib::bam::record::Cigar;

use crate::align::adapter::AdapterClipper;
use crate::align::aligner_base::{reference_clip, update_fragment_cigar};
use crate::cigar_arena::CigarArena;
use crate::config::AlignerConfig;
use crate::fragment::FragmentMetadata;
use crate::reference::Reference;

/// Places `fragment` at its current `(contig_id, position, reverse)`, clips it, scores it
/// and rewrites its CIGAR in `arena`. Returns `true` if the fragment ended up mapped
/// (4.3: "If the resulting match count is 0, mark unmapped").
pub fn align_ungapped(
    reference: &Reference,
    fragment: &mut FragmentMetadata,
    adapters: Option<&AdapterClipper>,
    arena: &mut CigarArena,
    config: &AlignerConfig,
) -> bool {
    let contig = reference.contig(fragment.contig_id);
    let read_bases = fragment.read().bases(fragment.reverse).to_vec();
    let read = fragment.read();
    let read_len = read_bases.len() as u32;

    let reference_aligned: Vec<u8> = (0..read_len)
        .map(|i| {
            let rp = fragment.position + i as i64;
            if rp >= 0 && (rp as usize) < contig.len() {
                contig.forward[rp as usize]
            } else {
                b'N'
            }
        })
        .collect();

    let mut left_clip = read.left_clipped;
    let mut right_clip = read.right_clipped;

    if let Some(clipper) = adapters {
        if !clipper.is_empty() {
            if let Some(m) = clipper.find_matches(&read_bases, &reference_aligned) {
                let (adapter_left, adapter_right) =
                    clipper.decide_clip(read_bases.len(), &reference_aligned, &read_bases, m);
                left_clip = left_clip.max(adapter_left);
                right_clip = right_clip.max(adapter_right);
            }
        }
    }

    if left_clip + right_clip >= read_len {
        fragment.mapped = false;
        return false;
    }

    let mapped_len = read_len - left_clip - right_clip;
    let mut ops = Vec::with_capacity(3);
    if left_clip > 0 {
        ops.push(Cigar::SoftClip(left_clip));
    }
    ops.push(Cigar::Match(mapped_len));
    if right_clip > 0 {
        ops.push(Cigar::SoftClip(right_clip));
    }

    let position = fragment.position + left_clip as i64;
    let (position, ops) = reference_clip(position, contig.len(), &ops);

    let range = arena.push_all(&ops);
    let ops = arena.range(range);
    fragment.left_soft_clip = match ops.first() {
        Some(Cigar::SoftClip(len)) => *len,
        _ => 0,
    };
    fragment.right_soft_clip = match ops.last() {
        Some(Cigar::SoftClip(len)) if ops.len() > 1 => *len,
        _ => 0,
    };
    fragment.cigar = range;
    fragment.position = position;

    let matches = update_fragment_cigar(reference, fragment, position, arena, range, config);
    matches > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::{Cluster, ClusterId, Read};
    use crate::reference::Contig;

    fn setup(read_bases: &[u8], ref_bases: &[u8]) -> (Reference, Cluster) {
        let reference = Reference::new(vec![Contig::new(0, "chr1", ref_bases.to_vec())]);
        let cluster = Cluster::single(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, read_bases.to_vec(), vec![40; read_bases.len()]),
        );
        (reference, cluster)
    }

    #[test]
    fn perfectly_placed_read_maps_with_no_clipping() {
        let bases = b"ACGTACGTAC";
        let (reference, cluster) = setup(bases, bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();

        let mapped = align_ungapped(&reference, &mut fragment, None, &mut arena, &config);

        assert!(mapped);
        assert_eq!(fragment.left_soft_clip, 0);
        assert_eq!(fragment.right_soft_clip, 0);
        assert_eq!(fragment.mismatch_count, 0);
    }

    #[test]
    fn read_masking_clip_is_carried_into_the_cigar() {
        let bases = b"ACGTACGTAC";
        let (reference, mut cluster) = setup(bases, bases);
        cluster.reads[0].as_mut().unwrap().set_alignment_independent_clipping(2, 0);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();

        align_ungapped(&reference, &mut fragment, None, &mut arena, &config);

        assert_eq!(fragment.left_soft_clip, 2);
    }

    #[test]
    fn fully_mismatching_placement_is_unmapped() {
        let read = b"TTTTT";
        let reference_bases = b"AAAAA";
        let (reference, cluster) = setup(read, reference_bases);
        let config = AlignerConfig::default();
        let mut fragment = FragmentMetadata::new(&cluster, 0, 0, 0, false);
        let mut arena = CigarArena::new();

        let mapped = align_ungapped(&reference, &mut fragment, None, &mut arena, &config);
        assert!(!mapped);
    }
}
