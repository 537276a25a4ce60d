//! Running sums over curves with gaps.

/// Running sum of `values`, treating `None` entries as NaN.
///
/// NaN propagates: once an entry is missing, every later partial sum is NaN.
/// Recorded curves stop reporting cost once a run stops, so everything after
/// the first gap is not a real observation.
pub fn running_sum(values: &[Option<f64>]) -> Vec<f64> {
    let mut acc = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let v = v.unwrap_or(f64::NAN);
            acc = if i == 0 { v } else { acc + v };
            acc
        })
        .collect()
}

/// Length of the defined prefix of a running sum.
pub fn defined_prefix_len(sums: &[f64]) -> usize {
    sums.iter().take_while(|v| !v.is_nan()).count()
}

/// Check that the defined entries of `values` never decrease.
pub fn is_non_decreasing(values: &[f64]) -> bool {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .collect::<Vec<_>>()
        .windows(2)
        .all(|w| w[0] <= w[1])
}
