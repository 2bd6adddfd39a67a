//! Trailing simple moving average.
//!
//! SMA(n)[i] = sum(x[i-j] for j in 0..n) / n
//! Warmup: first (n-1) points are undefined.

/// Trailing mean over `window` values, aligned with `values`.
///
/// A zero window or a series shorter than the window yields all `None`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}
