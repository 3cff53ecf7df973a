//! Light curves: the time profile of a band of channels.

use log::warn;

use crate::{
    constants::DEFAULT_LC_HALF_WIDTH,
    ndarray::{s, Array1, ArrayView1, ArrayView2, Axis},
    util::nan_mean,
};

/// A labelled light curve.
#[derive(Debug, Clone)]
pub struct LightCurve {
    /// Central channel index.
    pub channel: usize,
    /// Legend label, the central frequency as `"{:.4} GHz"`.
    pub label: String,
    /// NaN-ignoring mean over the channel band for each time sample.
    pub values: Array1<f64>,
}

/// NaN-ignoring mean of `spec` over channels `[channel - half_width,
/// channel + half_width)`, clipped to the frequency axis, for every time
/// sample.
pub fn extract_light_curve(spec: ArrayView2<f64>, channel: usize, half_width: usize) -> Array1<f64> {
    let num_chans = spec.len_of(Axis(0));
    let lo = channel.saturating_sub(half_width).min(num_chans);
    let hi = (channel + half_width).min(num_chans);
    spec.slice(s![lo..hi, ..])
        .axis_iter(Axis(1))
        .map(|column| nan_mean(column.iter().copied()))
        .collect()
}

/// Light curves at each of `channels`, labelled with their frequency.
/// Channels outside the frequency axis are skipped.
pub fn light_curves(
    spec: ArrayView2<f64>,
    fghz: ArrayView1<f64>,
    channels: &[usize],
    half_width: usize,
) -> Vec<LightCurve> {
    let num_chans = spec.len_of(Axis(0)).min(fghz.len());
    channels
        .iter()
        .filter_map(|&channel| {
            if channel >= num_chans {
                warn!(
                    "light curve channel {} is out of range ({} channels), skipping",
                    channel, num_chans
                );
                return None;
            }
            Some(LightCurve {
                channel,
                label: format!("{:.4} GHz", fghz[channel]),
                values: extract_light_curve(spec, channel, half_width),
            })
        })
        .collect()
}

/// [`light_curves`] with the default band half width.
pub fn default_light_curves(
    spec: ArrayView2<f64>,
    fghz: ArrayView1<f64>,
    channels: &[usize],
) -> Vec<LightCurve> {
    light_curves(spec, fghz, channels, DEFAULT_LC_HALF_WIDTH)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ndarray::{Array1, Array2};

    #[test]
    fn test_extract_light_curve_band_mean() {
        // value = channel index everywhere
        let spec = Array2::from_shape_fn((20, 3), |(f, _)| f as f64);
        let lc = extract_light_curve(spec.view(), 10, 5);
        // channels 5..15, mean 9.5
        assert_eq!(lc.len(), 3);
        for v in lc.iter() {
            assert_abs_diff_eq!(*v, 9.5);
        }
    }

    #[test]
    fn test_extract_light_curve_clipped_edges() {
        let spec = Array2::from_shape_fn((20, 2), |(f, _)| f as f64);
        // channels 0..7
        assert_abs_diff_eq!(extract_light_curve(spec.view(), 2, 5)[0], 3.0);
        // channels 14..20
        assert_abs_diff_eq!(extract_light_curve(spec.view(), 19, 5)[1], 16.5);
    }

    #[test]
    fn test_extract_light_curve_ignores_nan() {
        let mut spec = Array2::from_elem((10, 2), 2.0);
        spec[(4, 0)] = f64::NAN;
        spec.column_mut(1).fill(f64::NAN);
        let lc = extract_light_curve(spec.view(), 5, 5);
        assert_abs_diff_eq!(lc[0], 2.0);
        assert!(lc[1].is_nan());
    }

    #[test]
    fn test_light_curves_labels() {
        let spec = Array2::from_elem((4, 2), 1.0);
        let fghz = Array1::from(vec![1.0, 1.23456, 2.5, 3.0]);
        let lcs = default_light_curves(spec.view(), fghz.view(), &[1, 7, 3]);
        assert_eq!(lcs.len(), 2);
        assert_eq!(lcs[0].label, "1.2346 GHz");
        assert_eq!(lcs[0].channel, 1);
        assert_eq!(lcs[1].label, "3.0000 GHz");
    }
}
