//! Two-panel flare plot: the dynamic spectrum on top, light curves below.
//!
//! Rendering needs the `plotting` feature; without it [`plot_spectrogram`]
//! returns [`PlotError::NoPlottingFeature`].

use std::path::Path;

use cfg_if::cfg_if;
use thiserror::Error;

use crate::{
    constants::RENDERED_PLOT_EXTENSIONS,
    lightcurve::LightCurve,
    ndarray::{ArrayView1, ArrayView2},
};

/// Errors while rendering a plot.
#[derive(Error, Debug)]
pub enum PlotError {
    /// The crate was built without plotting support.
    #[error("flarespec was compiled without the \"plotting\" feature; rebuild with --features plotting")]
    NoPlottingFeature,

    /// Nothing to draw.
    #[error("Can't plot an empty spectrogram (shape {shape:?})")]
    EmptySpectrum {
        /// `[frequency, time]` shape that was given
        shape: (usize, usize),
    },

    /// The file extension isn't an image format the renderer can encode.
    #[error("Can't render a plot to {path}; use one of {}", RENDERED_PLOT_EXTENSIONS.join(", "))]
    UnsupportedFormat {
        /// The requested plot path
        path: String,
    },

    /// Error from the plotters library.
    #[error("Error from the plotters library: {0}")]
    Plotters(Box<dyn std::error::Error>),
}

/// Lower and upper edge of each channel, halfway (geometrically) between
/// neighbouring frequencies. The outermost edges mirror the inner ones.
pub fn channel_edges(fghz: ArrayView1<f64>) -> Vec<(f64, f64)> {
    let n = fghz.len();
    if n == 1 {
        return vec![(fghz[0] * 0.95, fghz[0] * 1.05)];
    }
    let mid = |a: f64, b: f64| (a * b).sqrt();
    (0..n)
        .map(|i| {
            let lo = if i == 0 {
                fghz[0] * fghz[0] / mid(fghz[0], fghz[1])
            } else {
                mid(fghz[i - 1], fghz[i])
            };
            let hi = if i == n - 1 {
                fghz[i] * fghz[i] / mid(fghz[i - 1], fghz[i])
            } else {
                mid(fghz[i], fghz[i + 1])
            };
            (lo, hi)
        })
        .collect()
}

/// Position of `value` on a logarithmic colour scale from `vmin` (0) to
/// `vmax` (1). Values outside the range are clipped.
pub fn log_scale_fraction(value: f64, vmin: f64, vmax: f64) -> f64 {
    let clipped = value.max(vmin).min(vmax);
    let span = vmax.ln() - vmin.ln();
    if span <= 0.0 {
        return 0.0;
    }
    (clipped.ln() - vmin.ln()) / span
}

/// Colour scale position of a background-subtracted spectrogram value.
/// The value is offset by `vmin` first so that zero flux sits at the bottom
/// of the scale.
pub fn spectrum_colour_fraction(value: f64, vmin: f64, vmax: f64) -> f64 {
    log_scale_fraction(value + vmin, vmin, vmax)
}

/// Whether a plot can be rendered to `path`, judging by its extension.
pub fn can_render(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    RENDERED_PLOT_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Hours since the UTC midnight before `jd0`, for each of `jd`.
pub fn hours_of_day(jd: ArrayView1<f64>, jd0: f64) -> Vec<f64> {
    let midnight = (jd0 - 0.5).floor() + 0.5;
    jd.iter().map(|&t| (t - midnight) * 24.0).collect()
}

/// Format hours of the day as `HH:MM`.
pub fn format_hhmm(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    format!(
        "{:02}:{:02}",
        total_minutes.div_euclid(60).rem_euclid(24),
        total_minutes.rem_euclid(60)
    )
}

cfg_if! {
    if #[cfg(feature = "plotting")] {
        /// Render the spectrogram `spec` (`[frequency][time]`, log scaled and
        /// clipped to `vmin..vmax`) above `light_curves`, writing an image to
        /// `path`.
        ///
        /// # Errors
        ///
        /// - [`PlotError::UnsupportedFormat`] if `path` isn't an image format
        ///   that can be encoded
        /// - [`PlotError::EmptySpectrum`] if there's nothing to draw
        /// - [`PlotError::Plotters`] if rendering or encoding fails, in which
        ///   case any partially written file is removed
        pub fn plot_spectrogram(
            path: &Path,
            spec: ArrayView2<f64>,
            fghz: ArrayView1<f64>,
            jd: ArrayView1<f64>,
            light_curves: &[LightCurve],
            vmin: f64,
            vmax: f64,
        ) -> Result<(), PlotError> {
            if !can_render(path) {
                return Err(PlotError::UnsupportedFormat {
                    path: path.display().to_string(),
                });
            }
            let result =
                plotting::plot_spectrogram(path, spec, fghz, jd, light_curves, vmin, vmax);
            if let Err(PlotError::Plotters(_)) = &result {
                if path.exists() {
                    log::warn!("removing partially written plot {}", path.display());
                    let _ = std::fs::remove_file(path);
                }
            }
            result
        }
    } else {
        /// Plotting is an optional feature; without it this always fails.
        ///
        /// # Errors
        ///
        /// [`PlotError::NoPlottingFeature`]
        pub fn plot_spectrogram(
            _path: &Path,
            _spec: ArrayView2<f64>,
            _fghz: ArrayView1<f64>,
            _jd: ArrayView1<f64>,
            _light_curves: &[LightCurve],
            _vmin: f64,
            _vmax: f64,
        ) -> Result<(), PlotError> {
            Err(PlotError::NoPlottingFeature)
        }
    }
}

#[cfg(feature = "plotting")]
mod plotting {
    use lazy_static::lazy_static;
    use log::{debug, info};
    use plotters::{prelude::*, style::RGBAColor};

    use super::*;
    use crate::{
        constants::{PLOT_X_PIXELS, PLOT_Y_PIXELS},
        types::{epoch_to_isot, jd_to_epoch},
    };

    lazy_static! {
        static ref GRID: RGBAColor = BLACK.mix(0.15);
    }

    fn colour(fraction: f64) -> HSLColor {
        // blue (low) to red (high)
        HSLColor(0.66 * (1.0 - fraction), 1.0, 0.5)
    }

    pub(super) fn plot_spectrogram(
        path: &Path,
        spec: ArrayView2<f64>,
        fghz: ArrayView1<f64>,
        jd: ArrayView1<f64>,
        light_curves: &[LightCurve],
        vmin: f64,
        vmax: f64,
    ) -> Result<(), PlotError> {
        let (num_chans, num_times) = spec.dim();
        if num_chans == 0 || num_times == 0 || fghz.len() != num_chans || jd.len() != num_times
        {
            return Err(PlotError::EmptySpectrum {
                shape: spec.dim(),
            });
        }

        let hours = hours_of_day(jd, jd[0]);
        let cadence = if num_times > 1 {
            hours[num_times - 1] - hours[num_times - 2]
        } else {
            1.0 / 3600.0
        };
        let time_edges = (0..num_times)
            .map(|t| {
                let hi = hours.get(t + 1).copied().unwrap_or(hours[t] + cadence);
                (hours[t], hi)
            })
            .collect::<Vec<_>>();
        let chan_edges = channel_edges(fghz);
        let (x_min, x_max) = (time_edges[0].0, time_edges[num_times - 1].1);
        let (y_min, y_max) = chan_edges
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(a, b)| {
                (lo.min(a), hi.max(b))
            });

        let date = epoch_to_isot(jd_to_epoch(jd[0]));
        let title = format!("EOVSA Data for {}", &date[..10]);
        debug!("plotting {} to {}", title, path.display());

        let root_area = BitMapBackend::new(path, (PLOT_X_PIXELS, PLOT_Y_PIXELS)).into_drawing_area();
        root_area
            .fill(&WHITE)
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        let root_area = root_area
            .titled(&title, ("sans-serif", 28))
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        let panels = root_area.split_evenly((2, 1));

        let mut spec_chart = ChartBuilder::on(&panels[0])
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_min..x_max, (y_min..y_max).log_scale())
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        spec_chart
            .configure_mesh()
            .disable_mesh()
            .x_label_formatter(&|x| format_hhmm(*x))
            .y_label_formatter(&|y| format!("{:.1}", y))
            .y_desc("Frequency [GHz]")
            .draw()
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        spec_chart
            .draw_series(spec.indexed_iter().filter_map(|((f, t), &v)| {
                if v.is_nan() {
                    return None;
                }
                let (x0, x1) = time_edges[t];
                let (y0, y1) = chan_edges[f];
                Some(Rectangle::new(
                    [(x0, y0), (x1, y1)],
                    colour(spectrum_colour_fraction(v, vmin, vmax)).filled(),
                ))
            }))
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;

        let mut lc_chart = ChartBuilder::on(&panels[1])
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x_min..x_max, -0.5..vmax)
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        lc_chart
            .configure_mesh()
            .light_line_style(&*GRID)
            .x_label_formatter(&|x| format_hhmm(*x))
            .x_desc("Time [UT]")
            .y_desc("Flux [sfu]")
            .draw()
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        for (i, lc) in light_curves.iter().enumerate() {
            let lc_colour = Palette99::pick(i).to_rgba();
            // NaN samples break the line
            let mut segments: Vec<Vec<(f64, f64)>> = vec![vec![]];
            for (&x, &y) in hours.iter().zip(lc.values.iter()) {
                if y.is_nan() {
                    if segments.last().map_or(false, |s| !s.is_empty()) {
                        segments.push(vec![]);
                    }
                } else if let Some(segment) = segments.last_mut() {
                    segment.push((x, y));
                }
            }
            let mut labelled = false;
            for segment in segments.into_iter().filter(|s| !s.is_empty()) {
                let series = lc_chart
                    .draw_series(LineSeries::new(segment, lc_colour.stroke_width(2)))
                    .map_err(|e| PlotError::Plotters(Box::new(e)))?;
                if !labelled {
                    series.label(&lc.label).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], lc_colour.stroke_width(2))
                    });
                    labelled = true;
                }
            }
        }
        if !light_curves.is_empty() {
            lc_chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        }

        root_area
            .present()
            .map_err(|e| PlotError::Plotters(Box::new(e)))?;
        info!("wrote plot to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ndarray::Array1;

    #[test]
    fn test_channel_edges() {
        let fghz = Array1::from(vec![1.0, 4.0, 16.0]);
        let edges = channel_edges(fghz.view());
        assert_abs_diff_eq!(edges[0].0, 0.5);
        assert_abs_diff_eq!(edges[0].1, 2.0);
        assert_abs_diff_eq!(edges[1].1, 8.0);
        assert_abs_diff_eq!(edges[2].1, 32.0);

        let single = channel_edges(Array1::from(vec![2.0]).view());
        assert_abs_diff_eq!(single[0].0, 1.9);
        assert_abs_diff_eq!(single[0].1, 2.1);
    }

    #[test]
    fn test_log_scale_fraction() {
        assert_abs_diff_eq!(log_scale_fraction(0.1, 0.1, 10.0), 0.0);
        assert_abs_diff_eq!(log_scale_fraction(1.0, 0.1, 10.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(log_scale_fraction(100.0, 0.1, 10.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(log_scale_fraction(-3.0, 0.1, 10.0), 0.0);
    }

    #[test]
    fn test_spectrum_colour_fraction() {
        // zero flux is the bottom of the scale
        assert_abs_diff_eq!(spectrum_colour_fraction(0.0, 0.1, 10.0), 0.0);
        assert_abs_diff_eq!(spectrum_colour_fraction(-2.0, 0.1, 10.0), 0.0);
        assert_abs_diff_eq!(spectrum_colour_fraction(0.9, 0.1, 10.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(spectrum_colour_fraction(9.9, 0.1, 10.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_can_render() {
        assert!(can_render(Path::new("out/flare.png")));
        assert!(can_render(Path::new("flare.JPG")));
        assert!(can_render(Path::new("flare.tiff")));
        assert!(!can_render(Path::new("flare.pdf")));
        assert!(!can_render(Path::new("flare")));
    }

    #[test]
    fn test_time_axis() {
        // 2022-01-01T06:30:00
        let jd0 = 2_459_580.5 + 6.5 / 24.0;
        let hours = hours_of_day(Array1::from(vec![jd0]).view(), jd0);
        assert_abs_diff_eq!(hours[0], 6.5, epsilon = 1e-6);
        assert_eq!(format_hhmm(hours[0]), "06:30");
        assert_eq!(format_hhmm(23.999), "00:00");
    }

    #[test]
    #[cfg(not(feature = "plotting"))]
    fn test_plot_without_feature() {
        use crate::ndarray::Array2;
        let spec = Array2::<f64>::zeros((1, 1));
        let axis = Array1::<f64>::zeros(1);
        assert!(matches!(
            plot_spectrogram(Path::new("x.png"), spec.view(), axis.view(), axis.view(), &[], 0.1, 10.0),
            Err(PlotError::NoPlottingFeature)
        ));
    }

    #[test]
    #[cfg(feature = "plotting")]
    fn test_plot_rejects_empty() {
        use crate::ndarray::Array2;
        let spec = Array2::<f64>::zeros((0, 3));
        let fghz = Array1::<f64>::zeros(0);
        let jd = Array1::<f64>::zeros(3);
        assert!(matches!(
            plot_spectrogram(Path::new("x.png"), spec.view(), fghz.view(), jd.view(), &[], 0.1, 10.0),
            Err(PlotError::EmptySpectrum { shape: (0, 3) })
        ));
    }

    #[cfg(feature = "plotting")]
    fn flare_plot_inputs() -> (
        crate::ndarray::Array2<f64>,
        Array1<f64>,
        Array1<f64>,
        Vec<LightCurve>,
    ) {
        use crate::{lightcurve::light_curves, ndarray::Array2};

        let fghz = Array1::linspace(1.0, 18.0, 8);
        let jd = Array1::from_shape_fn(30, |t| 2_459_580.5 + (3600.0 + t as f64) / 86400.0);
        let mut spec = Array2::from_shape_fn((8, 30), |(f, t)| {
            if (10..20).contains(&t) {
                (f + 1) as f64
            } else {
                0.0
            }
        });
        // a data gap
        spec.column_mut(15).fill(f64::NAN);
        let lcs = light_curves(spec.view(), fghz.view(), &[2, 6], 1);
        (spec, fghz, jd, lcs)
    }

    #[test]
    #[cfg(feature = "plotting")]
    fn test_plot_renders_each_format() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let (spec, fghz, jd, lcs) = flare_plot_inputs();
        assert_eq!(lcs.len(), 2);
        for name in ["flare.png", "flare.jpg", "flare.jpeg", "flare.tif", "flare.tiff"] {
            let path = tmp_dir.path().join(name);
            plot_spectrogram(&path, spec.view(), fghz.view(), jd.view(), &lcs, 0.1, 10.0).unwrap();
            let metadata = std::fs::metadata(&path).unwrap();
            assert!(metadata.len() > 0, "{} is empty", name);
        }
    }

    #[test]
    #[cfg(feature = "plotting")]
    fn test_plot_unsupported_format_writes_nothing() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let (spec, fghz, jd, lcs) = flare_plot_inputs();
        let path = tmp_dir.path().join("flare.pdf");
        assert!(matches!(
            plot_spectrogram(&path, spec.view(), fghz.view(), jd.view(), &lcs, 0.1, 10.0),
            Err(PlotError::UnsupportedFormat { .. })
        ));
        assert!(!path.exists());
    }
}
