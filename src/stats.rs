//! Windowed statistics
//!
//! Small numeric helpers shared by the simulator and analyzer.

/// Arithmetic mean, or `None` for an empty input
pub fn mean<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Population standard deviation.
///
/// Returns 0 for fewer than two samples. Uses two passes (mean, then squared
/// deviations) so large offsets such as raw millisecond intervals do not
/// cancel catastrophically.
pub fn standard_deviation<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let count = iter.clone().count();
    if count < 2 {
        return 0.0;
    }

    let avg = match mean(iter.clone()) {
        Some(avg) => avg,
        None => return 0.0,
    };
    let sum_sq: f64 = iter.map(|v| (v - avg) * (v - avg)).sum();

    (sum_sq / count as f64).sqrt()
}
