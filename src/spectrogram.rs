//! Collapsing cross-correlation amplitudes over baselines into a single
//! dynamic spectrum.

use log::{debug, warn};

use crate::{
    constants::{DEFAULT_POLARIZATION, MAX_BASELINE_LEN, MIN_BASELINE_LEN},
    ndarray::{s, Array2, ArrayView2, ArrayView4, Axis},
    selection::{select_baselines, UpperTriangleOrder},
    types::{TimeWindow, VisDataset},
    util::{nan_mean, nan_median},
    Complex,
};

/// How amplitudes from several baselines are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    /// Element-wise median of the amplitudes, ignoring NaN.
    Median,
    /// Subtract each baseline's own per-frequency mean over `bg_window`,
    /// then take the element-wise mean across baselines, ignoring NaN.
    MeanSubtracted {
        /// Background window in time samples.
        bg_window: TimeWindow,
    },
}

/// Combine `|x[bl, pol, f, t]|` over `baseline_idxs` into a `[frequency][time]`
/// spectrogram.
///
/// Degenerate input (no baselines, an unknown polarization or baseline
/// index) produces a spectrogram full of NaN rather than an error.
pub fn aggregate(
    x: ArrayView4<Complex<f32>>,
    baseline_idxs: &[usize],
    pol: usize,
    mode: AggregateMode,
) -> Array2<f64> {
    let (num_bls, num_pols, num_chans, num_times) = x.dim();
    let mut spec = Array2::from_elem((num_chans, num_times), f64::NAN);

    if baseline_idxs.is_empty() {
        warn!("no baselines selected, spectrogram is empty");
        return spec;
    }
    if pol >= num_pols {
        warn!("polarization {} out of range ({} available)", pol, num_pols);
        return spec;
    }
    if let Some(bad) = baseline_idxs.iter().find(|&&bl| bl >= num_bls) {
        warn!("baseline {} out of range ({} available)", bad, num_bls);
        return spec;
    }

    let pol_view = x.index_axis(Axis(1), pol);
    let amps = baseline_idxs
        .iter()
        .map(|&bl| pol_view.index_axis(Axis(0), bl).mapv(|v| v.norm() as f64))
        .collect::<Vec<_>>();

    match mode {
        AggregateMode::Median => {
            let mut scratch = Vec::with_capacity(amps.len());
            for ((f, t), cell) in spec.indexed_iter_mut() {
                *cell = nan_median(amps.iter().map(|a| a[(f, t)]), &mut scratch);
            }
        }
        AggregateMode::MeanSubtracted { bg_window } => {
            let window = bg_window.clip(num_times);
            if window.is_empty() {
                warn!(
                    "background window {} is empty for {} time samples",
                    bg_window, num_times
                );
            }
            debug!("subtracting per-baseline background over {:?}", window);
            let subtracted = amps
                .iter()
                .map(|amp| {
                    let mut amp = amp.to_owned();
                    for mut chan in amp.outer_iter_mut() {
                        let bg = nan_mean(chan.slice(s![window.start..window.end]).iter().copied());
                        chan.mapv_inplace(|v| v - bg);
                    }
                    amp
                })
                .collect::<Vec<_>>();
            for ((f, t), cell) in spec.indexed_iter_mut() {
                *cell = nan_mean(subtracted.iter().map(|a| a[(f, t)]));
            }
        }
    }
    spec
}

/// Quick-look median spectrogram of the medium-length baselines between
/// `ant_list`, using the default length limits and polarization.
pub fn inspect(dataset: &VisDataset, ant_list: &[usize]) -> Array2<f64> {
    let baseline_idxs = default_baselines(dataset, ant_list);
    aggregate(
        dataset.x.view(),
        &baseline_idxs,
        DEFAULT_POLARIZATION,
        AggregateMode::Median,
    )
}

/// Quick-look spectrogram where each baseline has its own background
/// (mean over `bg_window`) removed before averaging.
pub fn combine_subtracted(
    dataset: &VisDataset,
    bg_window: TimeWindow,
    ant_list: &[usize],
) -> Array2<f64> {
    let baseline_idxs = default_baselines(dataset, ant_list);
    aggregate(
        dataset.x.view(),
        &baseline_idxs,
        DEFAULT_POLARIZATION,
        AggregateMode::MeanSubtracted { bg_window },
    )
}

fn default_baselines(dataset: &VisDataset, ant_list: &[usize]) -> Vec<usize> {
    let order = UpperTriangleOrder::default();
    select_baselines(
        dataset.uvw.view(),
        ant_list,
        dataset.mid_time_index(),
        MIN_BASELINE_LEN,
        MAX_BASELINE_LEN,
        &order,
    )
}

/// Largest finite value of a spectrogram, if any.
pub fn nan_max(spec: ArrayView2<f64>) -> Option<f64> {
    spec.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ndarray::{Array1, Array3, Array4};

    /// amplitude of baseline `bl` at `(f, t)` is `(f + 1) * (bl + 1) + t`
    fn synthetic_x(num_bls: usize, num_chans: usize, num_times: usize) -> Array4<Complex<f32>> {
        Array4::from_shape_fn((num_bls, 2, num_chans, num_times), |(bl, _, f, t)| {
            let amp = ((f + 1) * (bl + 1) + t) as f32;
            // split the amplitude between re and im with a 3-4-5 triangle
            Complex::new(amp * 0.6, amp * 0.8)
        })
    }

    #[test]
    fn test_aggregate_median_odd() {
        let x = synthetic_x(3, 2, 4);
        let spec = aggregate(x.view(), &[0, 1, 2], 0, AggregateMode::Median);
        assert_eq!(spec.dim(), (2, 4));
        // median over bl of (f+1)(bl+1)+t is (f+1)*2+t
        for f in 0..2 {
            for t in 0..4 {
                assert_abs_diff_eq!(spec[(f, t)], ((f + 1) * 2 + t) as f64, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_aggregate_median_even_and_nan() {
        let mut x = synthetic_x(4, 1, 2);
        // a NaN on baseline 3 drops it from the median at (0, 0)
        x[(3, 0, 0, 0)] = Complex::new(f32::NAN, 0.0);
        let spec = aggregate(x.view(), &[0, 1, 2, 3], 0, AggregateMode::Median);
        // (0, 0): values 1, 2, 3 -> 2
        assert_abs_diff_eq!(spec[(0, 0)], 2.0, epsilon = 1e-4);
        // (0, 1): values 2, 3, 4, 5 -> 3.5
        assert_abs_diff_eq!(spec[(0, 1)], 3.5, epsilon = 1e-4);
    }

    #[test]
    fn test_aggregate_median_all_nan_cell() {
        let mut x = synthetic_x(2, 1, 2);
        x[(0, 0, 0, 1)] = Complex::new(f32::NAN, f32::NAN);
        x[(1, 0, 0, 1)] = Complex::new(f32::NAN, f32::NAN);
        let spec = aggregate(x.view(), &[0, 1], 0, AggregateMode::Median);
        assert!(spec[(0, 1)].is_nan());
        assert!(!spec[(0, 0)].is_nan());
    }

    #[test]
    fn test_aggregate_mean_subtracted() {
        let x = synthetic_x(3, 2, 6);
        let mode = AggregateMode::MeanSubtracted {
            bg_window: TimeWindow::new(0, 2),
        };
        let spec = aggregate(x.view(), &[0, 2], 0, mode);
        // per baseline, bg = (f+1)(bl+1) + 0.5, so every baseline leaves t - 0.5
        for f in 0..2 {
            for t in 0..6 {
                assert_abs_diff_eq!(spec[(f, t)], t as f64 - 0.5, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_aggregate_degenerate_inputs() {
        let x = synthetic_x(3, 2, 4);
        for spec in [
            aggregate(x.view(), &[], 0, AggregateMode::Median),
            aggregate(x.view(), &[0, 1], 5, AggregateMode::Median),
            aggregate(x.view(), &[0, 7], 0, AggregateMode::Median),
        ] {
            assert_eq!(spec.dim(), (2, 4));
            assert!(spec.iter().all(|v| v.is_nan()));
        }
    }

    #[test]
    fn test_inspect_uses_medium_baselines() {
        // 16 antennas worth of baselines, only (0,1) and (0,2) are medium
        let num_bls = UpperTriangleOrder::default().num_baselines();
        let num_times = 4;
        let mut uvw = Array3::<f64>::zeros((num_bls, num_times, 3));
        uvw.index_axis_mut(Axis(2), 0).fill(2000.0);
        uvw.slice_mut(s![0..2, .., 0]).fill(500.0);
        let x = Array4::from_shape_fn((num_bls, 1, 1, num_times), |(bl, _, _, _)| {
            Complex::new(bl as f32 + 1.0, 0.0)
        });
        let dataset = VisDataset::new(
            Array1::linspace(2_459_580.5, 2_459_580.5 + 3.0 / 86400.0, num_times),
            Array1::from_elem(1, 1.5),
            uvw,
            x,
        )
        .unwrap();

        let spec = inspect(&dataset, &[0, 1, 2]);
        // baselines 0 and 1 have amplitudes 1 and 2
        assert_abs_diff_eq!(spec[(0, 0)], 1.5, epsilon = 1e-6);

        let spec = combine_subtracted(&dataset, TimeWindow::new(0, 2), &[0, 1, 2]);
        assert_abs_diff_eq!(spec[(0, 3)], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nan_max() {
        let spec = crate::ndarray::array![[1.0, f64::NAN], [f64::INFINITY, 3.0]];
        assert_eq!(nan_max(spec.view()), Some(3.0));
        let spec = Array2::<f64>::from_elem((2, 2), f64::NAN);
        assert_eq!(nan_max(spec.view()), None);
    }
}
