//! All tunable constants the spec calls out as "configuration" in one place, grouped the
//! way the component design document groups them. Every aligner component borrows an
//! `&AlignerConfig` rather than hard-coding a constant, so a caller can reproduce the
//! upstream indexer's tuning without patching this crate.

use serde_derive::{Deserialize, Serialize};

/// How a "dodgy" alignment (one with no strong, non-repeat seed anchor) reports mapping
/// quality. Three-way per the source: an explicit sentinel meaning "don't know", a
/// sentinel meaning "definitely wrong", or a fixed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DodgyAlignmentScore {
    Unknown,
    Unaligned,
    Fixed(u8),
}

impl DodgyAlignmentScore {
    pub const UNKNOWN_SENTINEL: u8 = 255;
    pub const UNALIGNED_SENTINEL: i16 = -1;

    /// The score a dodgy, non-clean alignment should report.
    pub fn resolve(&self) -> i16 {
        match self {
            DodgyAlignmentScore::Unknown => Self::UNKNOWN_SENTINEL as i16,
            DodgyAlignmentScore::Unaligned => Self::UNALIGNED_SENTINEL,
            DodgyAlignmentScore::Fixed(v) => *v as i16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    // --- Banded Smith-Waterman (4.1) ---
    /// Band width; the source hard-wires this to 16 (+-7 plus an anchor column).
    pub band_width: usize,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open_score: i32,
    pub gap_extend_score: i32,
    /// Cap on the per-gap extension contribution to the normalized SW score (4.2).
    pub min_gap_extend_score: i32,
    pub max_read_length: usize,

    // --- Fragment builder (4.7) ---
    /// Per-seed hit cap; seeds at or above this are "repeat-exceeded" and contribute no
    /// fragment.
    pub repeat_threshold: u32,
    pub max_seeds_per_read: usize,
    /// Mismatch count above which a fragment is a gapped-SW candidate (4.7 step 4; fixed
    /// at 5 in the source).
    pub gapped_cutoff: u32,
    /// Accept gapped SW only if the new mismatch count is at or below this (4.5/6).
    pub gapped_mismatches_max: u32,
    /// Enable the k-mer SW gate that skips SW on reads unlikely to gain from it (4.5).
    pub avoid_smith_waterman: bool,
    /// Max |delta| the simple-indel aligner (4.6) will place; 0 disables it.
    pub semialigned_gap_limit: i64,

    // --- Template builder (4.10) ---
    pub orphan_log_probability_slack: f64,
    pub tracked_repeats_max_one_read: usize,
    pub dodgy_alignment_score: DodgyAlignmentScore,
    pub dodgy_but_clean_alignment_score: u8,
    pub mapq_ceiling: u8,
    /// Log-space prior that the read actually came from elsewhere in the genome, folded
    /// into the mapping-quality denominator (4.10 "rest-of-genome correction").
    pub rest_of_genome_correction: f64,

    // --- Shadow aligner (4.8) ---
    pub unreasonably_high_insert_size_plus_flanks: i64,

    // --- Template-length estimator (4.9) ---
    pub template_length_sigma: f64,
    pub template_length_max_template: i64,
    pub template_length_stability_batch: usize,

    // --- Gap realigner (4.11) ---
    pub max_gaps_at_a_time: usize,
    pub gap_flank_bases: usize,
    pub gap_flank_mismatches_max: u32,
    pub realign_dodgy_alignments: bool,
    pub vigorous: bool,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            band_width: 16,
            match_score: 2,
            mismatch_score: -4,
            gap_open_score: -6,
            gap_extend_score: -1,
            min_gap_extend_score: -15,
            max_read_length: 512,

            repeat_threshold: 16,
            max_seeds_per_read: 32,
            gapped_cutoff: 5,
            gapped_mismatches_max: 8,
            avoid_smith_waterman: true,
            semialigned_gap_limit: 16,

            orphan_log_probability_slack: 100.0,
            tracked_repeats_max_one_read: 1000,
            dodgy_alignment_score: DodgyAlignmentScore::Unknown,
            dodgy_but_clean_alignment_score: 10,
            mapq_ceiling: 60,
            rest_of_genome_correction: -9.0,

            unreasonably_high_insert_size_plus_flanks: 10_000,

            template_length_sigma: 3.0,
            template_length_max_template: 50_000,
            template_length_stability_batch: 10_000,

            max_gaps_at_a_time: 30,
            gap_flank_bases: 32,
            gap_flank_mismatches_max: 8,
            realign_dodgy_alignments: false,
            vigorous: false,
        }
    }
}

pub const GAP_FLANK_BASES: usize = 32;
pub const GAP_FLANK_MISMATCHES_MAX: u32 = 8;
pub const TRACKED_REPEATS_MAX_ONE_READ: usize = 1000;
pub const MAX_GAPS_AT_A_TIME: usize = 30;
pub const DODGY_BUT_CLEAN_ALIGNMENT_SCORE: u8 = 10;
