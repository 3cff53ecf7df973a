//! Background removal and clean-up of flare spectrograms.
//!
//! The quiet-Sun background is estimated from one or two time windows
//! outside of the flare. With a single window the background is constant in
//! time; with two windows it is interpolated linearly between them.
//!
//! Also home to the clean-up steps applied before plotting: masking known
//! interference channels, repairing duplicated timestamps and blanking data
//! gaps.

use log::{debug, trace, warn};

use crate::{
    constants::SECONDS_PER_DAY,
    ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis},
    types::TimeWindow,
    util::{nan_mean, round_half_even},
};

/// A background estimate, shaped to broadcast against a `[frequency][time]`
/// spectrogram.
#[derive(Debug, Clone)]
pub enum BackgroundModel {
    /// The same background for every time sample, one value per frequency.
    Constant(Array1<f64>),
    /// A separate background for every cell.
    Interpolated(Array2<f64>),
}

/// Per-frequency NaN-ignoring mean of `spec` over the time samples in
/// `window`. A window with no samples gives NaN.
pub fn window_mean(spec: ArrayView2<f64>, window: TimeWindow) -> Array1<f64> {
    let num_times = spec.len_of(Axis(1));
    let range = window.clip(num_times);
    if range.is_empty() {
        warn!(
            "background window {} is empty for {} time samples",
            window, num_times
        );
    }
    spec.slice(s![.., range])
        .outer_iter()
        .map(|chan| nan_mean(chan.iter().copied()))
        .collect()
}

/// Estimate the background of `spec` from `bg_window` (and optionally
/// `bg_window2`). Returns `None` when no window is given.
///
/// With two windows, the fraction along the time axis is measured from the
/// start of `bg_window` to the end of `bg_window2`, and is not clipped, so
/// samples outside the windows are extrapolated.
pub fn estimate_background(
    spec: ArrayView2<f64>,
    times: ArrayView1<f64>,
    bg_window: Option<TimeWindow>,
    bg_window2: Option<TimeWindow>,
) -> Option<BackgroundModel> {
    let bg_window = bg_window?;
    let bg1 = window_mean(spec, bg_window);
    let bg_window2 = match bg_window2 {
        Some(bg_window2) => bg_window2,
        None => return Some(BackgroundModel::Constant(bg1)),
    };
    let bg2 = window_mean(spec, bg_window2);

    let num_times = spec.len_of(Axis(1));
    if times.len() != num_times || num_times == 0 {
        warn!(
            "{} times for {} spectrogram samples, can't interpolate the background",
            times.len(),
            num_times
        );
        return Some(BackgroundModel::Interpolated(Array2::from_elem(
            spec.dim(),
            f64::NAN,
        )));
    }
    let first = bg_window.start.min(num_times - 1);
    let last = bg_window2.end.min(num_times - 1);
    let span = times[last] - times[first];
    trace!(
        "interpolating background between samples {} and {} ({} days)",
        first,
        last,
        span
    );
    let fraction = times.mapv(|t| (t - times[first]) / span);

    let mut model = Array2::zeros(spec.dim());
    for ((f, t), cell) in model.indexed_iter_mut() {
        *cell = bg1[f] + (bg2[f] - bg1[f]) * fraction[t];
    }
    Some(BackgroundModel::Interpolated(model))
}

/// Subtract a background estimated from `bg_window` (and optionally
/// `bg_window2`) from `spec`. Without a window, a copy of `spec` is
/// returned.
///
/// See [`estimate_background`] for how the two-window background is built.
pub fn subtract_background(
    spec: ArrayView2<f64>,
    times: ArrayView1<f64>,
    bg_window: Option<TimeWindow>,
    bg_window2: Option<TimeWindow>,
) -> Array2<f64> {
    let mut result = spec.to_owned();
    match estimate_background(spec, times, bg_window, bg_window2) {
        None => {
            debug!("no background window, leaving spectrogram as is");
        }
        Some(BackgroundModel::Constant(bg)) => {
            for (mut chan, bg) in result.outer_iter_mut().zip(bg.iter()) {
                chan.mapv_inplace(|v| v - bg);
            }
        }
        Some(BackgroundModel::Interpolated(bg)) => {
            result -= &bg;
        }
    }
    result
}

/// Set every channel within `tolerance` GHz of one of `notches` to NaN.
///
/// Returns the indices of the masked channels.
pub fn mask_notches(
    spec: &mut Array2<f64>,
    fghz: ArrayView1<f64>,
    notches: &[f64],
    tolerance: f64,
) -> Vec<usize> {
    let masked = fghz
        .iter()
        .enumerate()
        .filter(|(_, &f)| notches.iter().any(|&notch| (f - notch).abs() < tolerance))
        .map(|(chan, _)| chan)
        .filter(|&chan| chan < spec.len_of(Axis(0)))
        .collect::<Vec<_>>();
    for &chan in &masked {
        spec.index_axis_mut(Axis(0), chan).fill(f64::NAN);
    }
    if !masked.is_empty() {
        debug!("masked notch channels {:?}", masked);
    }
    masked
}

/// Spacing in seconds between two Julian dates, rounded half to even.
fn step_seconds(jd0: f64, jd1: f64) -> f64 {
    round_half_even((jd1 - jd0) * SECONDS_PER_DAY)
}

/// Repair timestamps that repeat (spacing under a second after rounding).
///
/// For each such pair `(k, k + 1)`, sample `k + 1` is moved to the midpoint
/// of its neighbours `k` and `k + 2`. If the pair is at the very end, sample
/// `k + 1` is placed one previous cadence after sample `k`. Returns the
/// indices of the repaired samples.
pub fn fix_times(jd: &mut Array1<f64>) -> Vec<usize> {
    let n = jd.len();
    let mut fixed = vec![];
    for k in 0..n.saturating_sub(1) {
        if step_seconds(jd[k], jd[k + 1]) >= 1.0 {
            continue;
        }
        let repaired = if k + 2 < n {
            (jd[k] + jd[k + 2]) / 2.0
        } else if k >= 1 {
            jd[k] + (jd[k] - jd[k - 1])
        } else {
            warn!("only two samples with a repeated timestamp, can't repair");
            continue;
        };
        trace!("repeated timestamp at sample {}, repairing", k + 1);
        jd[k + 1] = repaired;
        fixed.push(k + 1);
    }
    if !fixed.is_empty() {
        debug!("repaired {} repeated timestamps", fixed.len());
    }
    fixed
}

/// Blank columns of `spec` that are followed by a gap in `jd`.
///
/// Wherever the rounded spacing between samples `k` and `k + 1` exceeds
/// `max_cadence_s` seconds, column `k` is set to NaN so that a plot doesn't
/// bridge the gap. Returns the blanked column indices.
pub fn blank_time_gaps(spec: &mut Array2<f64>, jd: ArrayView1<f64>, max_cadence_s: f64) -> Vec<usize> {
    let num_times = spec.len_of(Axis(1)).min(jd.len());
    let gaps = (0..num_times.saturating_sub(1))
        .filter(|&k| step_seconds(jd[k], jd[k + 1]) > max_cadence_s)
        .collect::<Vec<_>>();
    for &k in &gaps {
        spec.index_axis_mut(Axis(1), k).fill(f64::NAN);
    }
    if !gaps.is_empty() {
        debug!("blanked {} samples before time gaps", gaps.len());
    }
    gaps
}
