//! Turning a raw flare spectrogram into the one that gets plotted and saved.
use crate::{
    background::{blank_time_gaps, fix_times, mask_notches, subtract_background},
    constants::{
        DEFAULT_BG_WINDOW, DEFAULT_LC_CHANS, DEFAULT_LC_HALF_WIDTH, DEFAULT_VMAX, DEFAULT_VMIN,
        MAX_CADENCE_SECONDS, NOTCH_FREQS_GHZ, NOTCH_TOLERANCE_GHZ,
    },
    lightcurve::{light_curves, LightCurve},
    ndarray::{Array1, Array2, ArrayView1, ArrayView2},
    spectrogram::inspect,
    types::{TimeWindow, VisDataset},
};
use derive_builder::Builder;
use itertools::Itertools;
use log::{debug, trace};
use std::fmt::Display;

/// Options for cleaning up a flare spectrogram
#[derive(Builder, Debug, Clone)]
#[builder(default)]
pub struct SpecContext {
    /// Window of quiet samples before the flare
    pub bg_window: Option<TimeWindow>,
    /// Optional window of quiet samples after the flare. With both windows the
    /// background is interpolated between them.
    pub bg2_window: Option<TimeWindow>,

    /// Frequencies of interference to mask (GHz)
    pub notches_ghz: Vec<f64>,
    /// How close to a notch a channel must be to get masked (GHz)
    pub notch_tolerance_ghz: f64,
    /// Spacings longer than this (rounded seconds) are data gaps
    pub max_cadence_s: f64,

    /// Lower limit of the plotted spectrogram
    pub vmin: f64,
    /// Upper limit of the plotted spectrogram and the light curves
    pub vmax: f64,

    /// Channels to extract light curves at
    pub lc_chans: Vec<usize>,
    /// Half width of each light curve band, in channels
    pub lc_half_width: usize,

    /// Whether to draw progress bars
    pub draw_progress: bool,
}

impl Default for SpecContext {
    fn default() -> Self {
        Self {
            bg_window: Some(TimeWindow::from(DEFAULT_BG_WINDOW)),
            bg2_window: None,
            notches_ghz: NOTCH_FREQS_GHZ.to_vec(),
            notch_tolerance_ghz: NOTCH_TOLERANCE_GHZ,
            max_cadence_s: MAX_CADENCE_SECONDS,
            vmin: DEFAULT_VMIN,
            vmax: DEFAULT_VMAX,
            lc_chans: DEFAULT_LC_CHANS.to_vec(),
            lc_half_width: DEFAULT_LC_HALF_WIDTH,
            draw_progress: true,
        }
    }
}

impl Display for SpecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.bg_window, self.bg2_window) {
            (Some(bg), Some(bg2)) => writeln!(
                f,
                "Will subtract a background interpolated between samples {} and {}.",
                bg, bg2
            )?,
            (Some(bg), None) => writeln!(f, "Will subtract the background in samples {}.", bg)?,
            (None, _) => writeln!(f, "Will not subtract a background.")?,
        }
        if self.notches_ghz.is_empty() {
            writeln!(f, "Will not mask notch frequencies.")?;
        } else {
            writeln!(
                f,
                "Will mask channels within {} GHz of {} GHz.",
                self.notch_tolerance_ghz,
                self.notches_ghz.iter().join(", ")
            )?;
        }
        writeln!(
            f,
            "Will blank samples before gaps longer than {}s.",
            self.max_cadence_s
        )?;
        if self.lc_chans.is_empty() {
            writeln!(f, "Will not extract light curves.")?;
        } else {
            writeln!(
                f,
                "Will extract light curves at channels {} (+/- {} channels).",
                self.lc_chans.iter().join(", "),
                self.lc_half_width
            )?;
        }
        writeln!(f, "Will scale plots from {} to {}.", self.vmin, self.vmax)?;
        Ok(())
    }
}

/// A cleaned up spectrogram, ready to plot and save.
#[derive(Debug, Clone)]
pub struct ProcessedSpec {
    /// Background subtracted `[frequency][time]` spectrogram, with notch
    /// channels and samples before gaps set to NaN.
    pub spec: Array2<f64>,
    /// Julian dates, with repeated timestamps repaired.
    pub time: Array1<f64>,
    /// Light curves extracted from `spec`.
    pub light_curves: Vec<LightCurve>,
    /// Channels that were masked.
    pub masked_chans: Vec<usize>,
    /// Samples whose timestamps were repaired.
    pub fixed_times: Vec<usize>,
    /// Samples that were blanked before a gap.
    pub gap_times: Vec<usize>,
}

impl SpecContext {
    /// Clean up `spec` with its frequency axis `fghz` and time axis `jd`:
    /// subtract the background, mask notches, repair repeated timestamps and
    /// blank gaps, in that order, then extract light curves.
    pub fn process(
        &self,
        spec: ArrayView2<f64>,
        fghz: ArrayView1<f64>,
        jd: ArrayView1<f64>,
    ) -> ProcessedSpec {
        trace!("start process");
        let mut spec = subtract_background(spec, jd, self.bg_window, self.bg2_window);
        let masked_chans = mask_notches(&mut spec, fghz, &self.notches_ghz, self.notch_tolerance_ghz);
        let mut time = jd.to_owned();
        let fixed_times = fix_times(&mut time);
        let gap_times = blank_time_gaps(&mut spec, time.view(), self.max_cadence_s);
        let light_curves = light_curves(spec.view(), fghz, &self.lc_chans, self.lc_half_width);
        debug!(
            "processed spectrogram {:?}: {} masked channels, {} repaired times, {} gaps",
            spec.dim(),
            masked_chans.len(),
            fixed_times.len(),
            gap_times.len()
        );
        ProcessedSpec {
            spec,
            time,
            light_curves,
            masked_chans,
            fixed_times,
            gap_times,
        }
    }

    /// Build the median spectrogram of `dataset` over `ant_list` and
    /// [`SpecContext::process`] it.
    pub fn process_dataset(&self, dataset: &VisDataset, ant_list: &[usize]) -> ProcessedSpec {
        let spec = inspect(dataset, ant_list);
        self.process(spec.view(), dataset.fghz.view(), dataset.time.view())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::constants::SECONDS_PER_DAY;

    #[test]
    fn test_builder_defaults() {
        let ctx = SpecContextBuilder::default()
            .bg2_window(Some(TimeWindow::new(200, 210)))
            .lc_chans(vec![3])
            .build()
            .unwrap();
        assert_eq!(ctx.bg_window, Some(TimeWindow::new(100, 110)));
        assert_eq!(ctx.bg2_window, Some(TimeWindow::new(200, 210)));
        assert_eq!(ctx.notches_ghz, vec![1.742]);
        assert_abs_diff_eq!(ctx.vmax, 10.0);
        assert_eq!(ctx.lc_chans, vec![3]);
        assert_eq!(ctx.lc_half_width, 5);
    }

    #[test]
    fn test_display() {
        let ctx = SpecContext {
            bg_window: None,
            notches_ghz: vec![],
            ..SpecContext::default()
        };
        let display = format!("{}", ctx);
        assert!(display.contains("Will not subtract a background."));
        assert!(display.contains("Will not mask notch frequencies."));

        let display = format!("{}", SpecContext::default());
        assert!(display.contains("Will subtract the background in samples [100, 110)."));
        assert!(display.contains("Will extract light curves at channels 25, 235 "));
        assert!(display.contains("of 1.742 GHz."));
    }

    #[test]
    fn test_process_pipeline() {
        let num_times = 8;
        // a gap after sample 5, and a repeated timestamp at sample 2
        let mut offsets = (0..num_times).map(|t| t as f64).collect::<Vec<_>>();
        offsets[2] = 1.0;
        for o in offsets.iter_mut().skip(6) {
            *o += 10.0;
        }
        let jd = Array1::from_shape_fn(num_times, |t| 2_459_580.5 + offsets[t] / SECONDS_PER_DAY);
        let fghz = Array1::from(vec![1.0, 1.742, 2.0]);
        let spec = Array2::from_shape_fn((3, num_times), |(f, t)| {
            (f + 1) as f64 + if t == 4 { 5.0 } else { 0.0 }
        });

        let ctx = SpecContext {
            bg_window: Some(TimeWindow::new(0, 2)),
            lc_chans: vec![0],
            lc_half_width: 1,
            ..SpecContext::default()
        };
        let processed = ctx.process(spec.view(), fghz.view(), jd.view());

        assert_eq!(processed.masked_chans, vec![1]);
        assert_eq!(processed.fixed_times, vec![2]);
        assert_eq!(processed.gap_times, vec![5]);
        assert!(processed.spec.row(1).iter().all(|v| v.is_nan()));
        assert!(processed.spec[(0, 5)].is_nan());
        assert_abs_diff_eq!(processed.spec[(0, 3)], 0.0);
        assert_abs_diff_eq!(processed.spec[(2, 4)], 5.0);
        // repaired to the midpoint of samples 1 and 3
        assert_abs_diff_eq!(
            (processed.time[2] - jd[0]) * SECONDS_PER_DAY,
            2.0,
            epsilon = 1e-3
        );

        assert_eq!(processed.light_curves.len(), 1);
        // channels 0..1
        assert_abs_diff_eq!(processed.light_curves[0].values[4], 5.0);
        assert!(processed.light_curves[0].values[5].is_nan());
    }
}
