use lazy_static::lazy_static;

/// Maximum phred quality value this crate will ever see from a cluster's quality byte array.
pub const MAX_QUALITY: usize = 93;

lazy_static! {
    /// log P(base is correct | phred quality Q) for Q in [0, MAX_QUALITY].
    static ref LOG_MATCH: Vec<f64> = (0..=MAX_QUALITY)
        .map(|q| {
            let error_prob = 10f64.powf(-(q as f64) / 10.0);
            (1.0 - error_prob).max(f64::MIN_POSITIVE).ln()
        })
        .collect();

    /// log P(base is a particular wrong base | phred quality Q), assuming the 3 non-reference
    /// bases are equally likely, for Q in [0, MAX_QUALITY].
    static ref LOG_MISMATCH: Vec<f64> = (0..=MAX_QUALITY)
        .map(|q| {
            let error_prob = 10f64.powf(-(q as f64) / 10.0);
            (error_prob / 3.0).max(f64::MIN_POSITIVE).ln()
        })
        .collect();
}

pub struct Quality;

impl Quality {
    fn clamp(quality: u8) -> usize {
        (quality as usize).min(MAX_QUALITY)
    }

    /// log P(match | Q). SOFT_CLIP bases contribute this term too (unobserved, not wrong).
    pub fn get_log_match(quality: u8) -> f64 {
        LOG_MATCH[Self::clamp(quality)]
    }

    /// log P(mismatch | Q).
    pub fn get_log_mismatch(quality: u8) -> f64 {
        LOG_MISMATCH[Self::clamp(quality)]
    }

    /// Same as `get_log_mismatch` -- kept as a distinct name because the aligner base
    /// evaluates this per base in the hottest loop of the crate and the table lookup is
    /// already as fast as it gets; the separate name matches call sites that care about
    /// being explicit that no approximation is taken.
    pub fn get_log_mismatch_fast(quality: u8) -> f64 {
        Self::get_log_mismatch(quality)
    }
}

/// Epsilon-tolerant comparisons for log-probabilities and other small floating point values
/// accumulated across many bases. Never compare log-probabilities for bit equality.
pub const LP_EPSILON: f64 = 1e-9;

pub fn lp_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < LP_EPSILON
}

pub fn lp_less(a: f64, b: f64) -> bool {
    b - a > LP_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_match_increases_with_quality() {
        assert!(Quality::get_log_match(40) > Quality::get_log_match(2));
        assert!(Quality::get_log_match(0) < 0.0);
    }

    #[test]
    fn log_mismatch_decreases_with_quality() {
        assert!(Quality::get_log_mismatch(40) < Quality::get_log_mismatch(2));
    }

    #[test]
    fn lp_comparators_respect_epsilon() {
        assert!(lp_equals(-1.0, -1.0 + 1e-12));
        assert!(lp_less(-2.0, -1.0));
        assert!(!lp_less(-1.0, -2.0));
    }

    #[test]
    fn quality_clamped_to_table_bounds() {
        assert_eq!(Quality::get_log_match(255), Quality::get_log_match(MAX_QUALITY as u8));
    }
}
