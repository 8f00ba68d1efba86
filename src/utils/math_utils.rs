//! Small numeric helpers shared across the aligner: log-space summation for combining
//! independent alignment probabilities, and the percentile machinery the template-length
//! estimator uses to turn an insert-size histogram into (min, median, max, sigma) bounds.

use statrs::function::erf::erf;

pub struct MathUtils;

impl MathUtils {
    /// Numerically stable `ln(exp(a) + exp(b))`.
    pub fn log_sum_exp_two(a: f64, b: f64) -> f64 {
        if a == f64::NEG_INFINITY {
            return b;
        }
        if b == f64::NEG_INFINITY {
            return a;
        }
        let max = a.max(b);
        max + ((a - max).exp() + (b - max).exp()).ln()
    }

    /// Numerically stable `ln(sum(exp(values)))`. Returns `f64::NEG_INFINITY` for an empty slice.
    pub fn log_sum_exp(values: &[f64]) -> f64 {
        match values.iter().cloned().fold(f64::NEG_INFINITY, f64::max) {
            max if max == f64::NEG_INFINITY => f64::NEG_INFINITY,
            max => max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln(),
        }
    }

    /// The two-sided tail fraction outside `sigma` standard deviations of a normal
    /// distribution, i.e. `alpha` such that `[alpha, 1 - alpha]` captures `sigma` sigmas.
    /// Used by the template-length estimator to turn its three-sigma insert-size window
    /// into percentile indices: `alpha_for_sigma(3.0)` is the three-sigma two-sided tail.
    pub fn alpha_for_sigma(sigma: f64) -> f64 {
        (1.0 - erf(sigma / std::f64::consts::SQRT_2)) / 2.0
    }

    /// Index into a sorted slice of length `n` for the given quantile in `[0, 1]`, clamped
    /// to valid bounds. Matches the estimator's `lengths[N * quantile]` convention.
    pub fn quantile_index(n: usize, quantile: f64) -> usize {
        if n == 0 {
            return 0;
        }
        let idx = (n as f64 * quantile).floor() as isize;
        idx.clamp(0, n as isize - 1) as usize
    }

    pub fn median<T: Copy + PartialOrd>(sorted: &[T]) -> T {
        sorted[Self::quantile_index(sorted.len(), 0.5)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_sum_exp_two_matches_naive_in_probability_space() {
        let a = (0.3f64).ln();
        let b = (0.4f64).ln();
        let combined = MathUtils::log_sum_exp_two(a, b).exp();
        assert_relative_eq!(combined, 0.7, epsilon = 1e-9);
    }

    #[test]
    fn log_sum_exp_handles_neg_infinity() {
        assert_eq!(MathUtils::log_sum_exp_two(f64::NEG_INFINITY, -1.0), -1.0);
        assert_eq!(MathUtils::log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn alpha_for_three_sigma_is_small() {
        let alpha = MathUtils::alpha_for_sigma(3.0);
        assert!(alpha > 0.0 && alpha < 0.002);
    }

    #[test]
    fn quantile_index_clamped_to_bounds() {
        assert_eq!(MathUtils::quantile_index(10, 0.0), 0);
        assert_eq!(MathUtils::quantile_index(10, 1.0), 9);
        assert_eq!(MathUtils::quantile_index(0, 0.5), 0);
    }
}
