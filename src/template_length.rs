//! Online insert-size model: buckets accepted templates by relative orientation, then
//! periodically finalizes a three-sigma (min, median, max) window per the dominant
//! orientation(s) (4.9 Template-length estimator; 3 DATA MODEL: TemplateLengthStatistics).

use crate::fragment::FragmentMetadata;
use crate::utils::math_utils::MathUtils;

/// The 8 (relative order x read-1 strand x read-2 strand) combinations a paired template
/// can fall into, packed into 3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentModel(u8);

impl AlignmentModel {
    pub const COUNT: usize = 8;

    pub fn classify(read1_position: i64, read1_reverse: bool, read2_position: i64, read2_reverse: bool) -> Self {
        let read2_is_first = read2_position < read1_position;
        let bits = (read1_reverse as u8) | ((read2_reverse as u8) << 1) | ((read2_is_first as u8) << 2);
        AlignmentModel(bits)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckModelResult {
    Nominal,
    Oversized,
    Undersized,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FinalizedModel {
    best_models: [usize; 2],
    min: i64,
    median: i64,
    max: i64,
    low_std_dev: i64,
    high_std_dev: i64,
}

pub struct TemplateLengthStatistics {
    buckets: [Vec<i64>; AlignmentModel::COUNT],
    total: usize,
    stability_batch: usize,
    sigma: f64,
    max_template: i64,
    finalized: Option<FinalizedModel>,
    stable: bool,
}

impl TemplateLengthStatistics {
    pub fn new(sigma: f64, max_template: i64, stability_batch: usize) -> Self {
        Self {
            buckets: Default::default(),
            total: 0,
            stability_batch: stability_batch.max(1),
            sigma,
            max_template,
            finalized: None,
            stable: false,
        }
    }

    /// Accepts a template into the online accumulator: both mates uniquely aligned, same
    /// contig, fully contained, total length within the configured cap. Callers are
    /// expected to have already checked uniqueness and contig agreement; this only
    /// enforces containment and the length cap.
    pub fn add_template(&mut self, contig_len: usize, read1_position: i64, read1_reverse: bool, read1_len: u32, read2_position: i64, read2_reverse: bool, read2_len: u32) {
        let start = read1_position.min(read2_position);
        let end = (read1_position + read1_len as i64).max(read2_position + read2_len as i64);
        if start < 0 || end as usize > contig_len {
            return;
        }
        let length = end - start;
        if length <= 0 || length > self.max_template {
            return;
        }

        let model = AlignmentModel::classify(read1_position, read1_reverse, read2_position, read2_reverse);
        self.buckets[model.index()].push(length);
        self.total += 1;

        if self.total % self.stability_batch == 0 {
            let new_model = self.finalize();
            self.stable = self.finalized.as_ref() == Some(&new_model);
            self.finalized = Some(new_model);
        }
    }

    /// Picks the two most-populated orientation buckets, concatenates their lengths, and
    /// derives a three-sigma (min, median, max) window plus one-sigma spread either side
    /// of the median.
    fn finalize(&self) -> FinalizedModel {
        let mut order: [usize; AlignmentModel::COUNT] = std::array::from_fn(|i| i);
        order.sort_by_key(|&i| std::cmp::Reverse(self.buckets[i].len()));
        let best_models = [order[0], order[1]];

        let mut combined: Vec<i64> = Vec::new();
        combined.extend_from_slice(&self.buckets[best_models[0]]);
        combined.extend_from_slice(&self.buckets[best_models[1]]);
        combined.sort_unstable();
        let n = combined.len();

        if n == 0 {
            return FinalizedModel {
                best_models,
                min: 0,
                median: 0,
                max: self.max_template,
                low_std_dev: 0,
                high_std_dev: 0,
            };
        }

        let alpha = MathUtils::alpha_for_sigma(self.sigma);
        let alpha_one_sigma = MathUtils::alpha_for_sigma(1.0);
        let min = combined[MathUtils::quantile_index(n, alpha)];
        let median = combined[MathUtils::quantile_index(n, 0.5)];
        let max = combined[MathUtils::quantile_index(n, 1.0 - alpha)];
        let low_std_dev = median - combined[MathUtils::quantile_index(n, alpha_one_sigma)];
        let high_std_dev = combined[MathUtils::quantile_index(n, 1.0 - alpha_one_sigma)] - median;

        FinalizedModel {
            best_models,
            min,
            median,
            max,
            low_std_dev,
            high_std_dev,
        }
    }

    /// `true` once consecutive re-finalizations (every `stability_batch` samples) return
    /// identical values.
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn check_model(&self, f1: &FragmentMetadata, f2: &FragmentMetadata) -> CheckModelResult {
        if f1.contig_id != f2.contig_id {
            return CheckModelResult::NoMatch;
        }
        let Some(finalized) = &self.finalized else {
            return CheckModelResult::NoMatch;
        };
        let model = AlignmentModel::classify(f1.position, f1.reverse, f2.position, f2.reverse);
        if !finalized.best_models.contains(&model.index()) {
            return CheckModelResult::NoMatch;
        }

        let start = f1.position.min(f2.position);
        let end = f1.end_position().max(f2.end_position());
        let length = end - start;
        if length > finalized.max {
            CheckModelResult::Oversized
        } else if length < finalized.min {
            CheckModelResult::Undersized
        } else {
            CheckModelResult::Nominal
        }
    }

    /// The expected `[min, max]` reference window (relative to `position`) in which a mate
    /// of length `mate_read_len` should be searched, per the finalized model; a wide
    /// default window before the model has finalized.
    pub fn mate_min_max_position(&self, mate_read_len: u32) -> (i64, i64) {
        match &self.finalized {
            Some(f) => ((f.min - mate_read_len as i64).max(0), f.max),
            None => (0, self.max_template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_model_distinguishes_orientation_and_order() {
        let a = AlignmentModel::classify(100, false, 300, true);
        let b = AlignmentModel::classify(100, true, 300, true);
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn finalize_reports_stable_after_repeated_identical_batches() {
        let mut stats = TemplateLengthStatistics::new(3.0, 10_000, 20);
        for _ in 0..40 {
            stats.add_template(1_000_000, 1000, false, 100, 1300, true, 100);
        }
        assert!(stats.is_stable());
    }

    #[test]
    fn template_exceeding_cap_is_rejected() {
        let mut stats = TemplateLengthStatistics::new(3.0, 500, 20);
        stats.add_template(1_000_000, 0, false, 100, 10_000, true, 100);
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn check_model_reports_no_match_across_contigs() {
        let stats = TemplateLengthStatistics::new(3.0, 10_000, 20);
        use crate::read::{Cluster, ClusterId, Read};
        let cluster = Cluster::paired(
            ClusterId { tile: 0, cluster_id: 0, x: 0, y: 0 },
            Read::new(0, b"ACGT".to_vec(), vec![30; 4]),
            Read::new(1, b"ACGT".to_vec(), vec![30; 4]),
        );
        let f1 = FragmentMetadata::new(&cluster, 0, 0, 100, false);
        let f2 = FragmentMetadata::new(&cluster, 1, 1, 300, true);
        assert_eq!(stats.check_model(&f1, &f2), CheckModelResult::NoMatch);
    }
}
