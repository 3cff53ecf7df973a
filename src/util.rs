//! Utility functions

use std::cmp::Ordering;

/// Mean of the non-NaN values, NaN if there are none.
pub fn nan_mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Median of the non-NaN values, NaN if there are none. With an even number
/// of values, the two central values are averaged.
///
/// `scratch` is cleared and reused to avoid an allocation per call.
pub fn nan_median<I>(values: I, scratch: &mut Vec<f64>) -> f64
where
    I: IntoIterator<Item = f64>,
{
    scratch.clear();
    scratch.extend(values.into_iter().filter(|v| !v.is_nan()));
    let n = scratch.len();
    if n == 0 {
        return f64::NAN;
    }
    scratch.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    if n % 2 == 1 {
        scratch[n / 2]
    } else {
        (scratch[n / 2 - 1] + scratch[n / 2]) / 2.0
    }
}

/// Round to the nearest integer, with halves going to the even neighbour.
pub fn round_half_even(value: f64) -> f64 {
    if (value - value.trunc()).abs() == 0.5 {
        2.0 * (value / 2.0).round()
    } else {
        value.round()
    }
}
