/// Trailing price momentum in percent.
///
/// Compares the newest close with the first close of the trailing
/// `window`-bar slice: `(closes[n-1] / closes[n-window] - 1) * 100`.
///
/// Returns 0.0 when fewer than `window` closes exist or the base close is
/// not positive.
pub fn compute_momentum(closes: &[f64], window: usize) -> f64 {
    if window == 0 || closes.len() < window {
        return 0.0;
    }

    let latest = closes[closes.len() - 1];
    let base = closes[closes.len() - window];
    if base <= 0.0 || !base.is_finite() || !latest.is_finite() {
        return 0.0;
    }

    (latest / base - 1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_calculation() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        // window of 20 starts at 105, ends at 124
        let momentum = compute_momentum(&closes, 20);
        assert!((momentum - (124.0 / 105.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_insufficient_data() {
        let closes = vec![10.0; 19];
        assert_eq!(compute_momentum(&closes, 20), 0.0);
        assert_eq!(compute_momentum(&[], 20), 0.0);
    }

    #[test]
    fn test_momentum_exact_window() {
        let mut closes = vec![10.0; 20];
        closes[19] = 12.0;
        assert!((compute_momentum(&closes, 20) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_negative_and_bad_base() {
        let closes = vec![20.0, 15.0];
        assert!((compute_momentum(&closes, 2) + 25.0).abs() < 1e-9);
        assert_eq!(compute_momentum(&[0.0, 15.0], 2), 0.0);
    }
}
