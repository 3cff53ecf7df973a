//! Data containers shared between the processing stages.

use std::ops::Range;

use crate::{
    constants::{JD_UNIX_EPOCH, SECONDS_PER_DAY},
    hifitime::{Epoch, TimeUnits},
    io::error::IOError,
    ndarray::{Array1, Array3, Array4},
    Complex,
};

/// Calibrated visibilities for one observing interval, as handed over by a
/// [`crate::io::VisibilityReader`].
#[derive(Debug, Clone)]
pub struct VisDataset {
    /// Julian dates of each time sample, ascending.
    pub time: Array1<f64>,
    /// Frequency of each channel in GHz.
    pub fghz: Array1<f64>,
    /// Baseline coordinates in nanoseconds, `[baseline][time][u, v, w]`.
    pub uvw: Array3<f64>,
    /// Complex visibilities, `[baseline][polarization][frequency][time]`.
    pub x: Array4<Complex<f32>>,
}

impl VisDataset {
    /// Bundle the arrays of a dataset, checking that their axes agree.
    ///
    /// # Errors
    ///
    /// [`IOError::VisShape`] if the time, frequency or baseline axes of the
    /// arrays disagree.
    pub fn new(
        time: Array1<f64>,
        fghz: Array1<f64>,
        uvw: Array3<f64>,
        x: Array4<Complex<f32>>,
    ) -> Result<Self, IOError> {
        let (num_bls, _, num_chans, num_times) = x.dim();
        if time.len() != num_times {
            return Err(IOError::VisShape(format!(
                "{} time samples but visibilities have {}",
                time.len(),
                num_times
            )));
        }
        if fghz.len() != num_chans {
            return Err(IOError::VisShape(format!(
                "{} frequencies but visibilities have {}",
                fghz.len(),
                num_chans
            )));
        }
        let (uvw_bls, uvw_times, uvw_dims) = uvw.dim();
        if uvw_bls != num_bls || uvw_times != num_times || uvw_dims != 3 {
            return Err(IOError::VisShape(format!(
                "uvw has shape {:?}, expected ({}, {}, 3)",
                uvw.dim(),
                num_bls,
                num_times
            )));
        }
        Ok(Self { time, fghz, uvw, x })
    }

    /// Index of the sample in the middle of the time axis.
    pub fn mid_time_index(&self) -> usize {
        self.time.len() / 2
    }
}

/// A half-open window `[start, end)` of time sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// First sample in the window.
    pub start: usize,
    /// One past the last sample in the window.
    pub end: usize,
}

impl TimeWindow {
    /// Create a new window covering `[start, end)`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The window limited to `[0, len)`. May be empty.
    pub fn clip(&self, len: usize) -> Range<usize> {
        let end = self.end.min(len);
        let start = self.start.min(end);
        start..end
    }
}

impl From<[usize; 2]> for TimeWindow {
    fn from([start, end]: [usize; 2]) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Convert a Julian date (UTC) to an [`Epoch`].
pub fn jd_to_epoch(jd: f64) -> Epoch {
    Epoch::from_unix_seconds((jd - JD_UNIX_EPOCH) * SECONDS_PER_DAY)
}

/// Convert an [`Epoch`] to a Julian date (UTC).
pub fn epoch_to_jd(epoch: Epoch) -> f64 {
    epoch.to_unix_seconds() / SECONDS_PER_DAY + JD_UNIX_EPOCH
}

/// Round `epoch` to the nearest millisecond. Julian dates held as `f64` are
/// only good to tens of microseconds, which is enough to land just short of
/// a whole second.
pub fn round_to_millis(epoch: Epoch) -> Epoch {
    epoch.round(1.milliseconds())
}

/// Format an [`Epoch`] as `YYYY-MM-DDTHH:MM:SS.mmm`, rounded to the nearest
/// millisecond.
pub fn epoch_to_isot(epoch: Epoch) -> String {
    let (y, mo, d, h, mi, s, ns) = round_to_millis(epoch).to_gregorian_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
        y,
        mo,
        d,
        h,
        mi,
        s,
        ns / 1_000_000
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ndarray::{Array1, Array3, Array4};

    #[test]
    fn test_vis_dataset_rejects_mismatched_axes() {
        let x = Array4::<Complex<f32>>::zeros((3, 1, 4, 10));
        let uvw = Array3::<f64>::zeros((3, 10, 3));
        let fghz = Array1::linspace(1.0, 2.0, 4);

        assert!(VisDataset::new(Array1::zeros(10), fghz.clone(), uvw.clone(), x.clone()).is_ok());
        assert!(matches!(
            VisDataset::new(Array1::zeros(9), fghz.clone(), uvw.clone(), x.clone()),
            Err(IOError::VisShape(_))
        ));
        assert!(matches!(
            VisDataset::new(Array1::zeros(10), Array1::zeros(5), uvw, x.clone()),
            Err(IOError::VisShape(_))
        ));
        assert!(matches!(
            VisDataset::new(Array1::zeros(10), fghz, Array3::zeros((2, 10, 3)), x),
            Err(IOError::VisShape(_))
        ));
    }

    #[test]
    fn test_time_window_clip() {
        assert_eq!(TimeWindow::new(2, 5).clip(10), 2..5);
        assert_eq!(TimeWindow::new(8, 15).clip(10), 8..10);
        assert!(TimeWindow::new(12, 15).clip(10).is_empty());
        assert!(TimeWindow::new(5, 2).clip(10).is_empty());
    }

    #[test]
    fn test_jd_epoch_conversion() {
        // 2022-01-01T00:00:00 UTC
        let jd = 2_459_580.5;
        let epoch = jd_to_epoch(jd);
        assert_eq!(epoch_to_isot(epoch), "2022-01-01T00:00:00.000");
        assert_abs_diff_eq!(epoch_to_jd(epoch), jd, epsilon = 1e-8);
    }

    #[test]
    fn test_epoch_to_isot_rounds() {
        // 47 s past midnight, which f64 Julian dates can't hold exactly
        let epoch = jd_to_epoch(2_459_580.5 + 47.0 / SECONDS_PER_DAY);
        assert_eq!(epoch_to_isot(epoch), "2022-01-01T00:00:47.000");
        for t in 0..120 {
            let epoch = jd_to_epoch(2_459_580.5 + t as f64 / SECONDS_PER_DAY);
            assert!(epoch_to_isot(epoch).ends_with(".000"), "t={}", t);
        }
    }
}
