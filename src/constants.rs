// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.
//!
//! All floating point constants *must* be double precision.

/// Number of antennas in the EOVSA correlator.
pub const EOVSA_NUM_ANTS: usize = 16;

/// Default antenna selection string: the thirteen 2.1 m dishes.
pub const DEFAULT_ANT_STR: &str = "ant1-13";

/// Polarization index used when aggregating spectrograms.
pub const DEFAULT_POLARIZATION: usize = 0;

/// Baselines must be strictly longer than this (ns) to be selected.
pub const MIN_BASELINE_LEN: f64 = 150.0;
/// Baselines must be strictly shorter than this (ns) to be selected.
pub const MAX_BASELINE_LEN: f64 = 1000.0;

/// Frequencies (GHz) of known narrow-band interference, masked out of every
/// spectrogram.
pub const NOTCH_FREQS_GHZ: [f64; 1] = [1.742];
/// Channels closer than this (GHz) to a notch frequency are masked.
pub const NOTCH_TOLERANCE_GHZ: f64 = 0.001;

/// Longest allowed spacing between consecutive samples (rounded seconds).
/// Anything longer marks a data gap.
pub const MAX_CADENCE_SECONDS: f64 = 1.0;

/// Half width (in channels) of the light-curve averaging window.
pub const DEFAULT_LC_HALF_WIDTH: usize = 5;

/// Default light-curve channel indices.
pub const DEFAULT_LC_CHANS: [usize; 2] = [25, 235];

/// Default background window `[start, end)` (time samples).
pub const DEFAULT_BG_WINDOW: [usize; 2] = [100, 110];

/// Lower clip of the plotted spectrogram (sfu).
pub const DEFAULT_VMIN: f64 = 0.1;
/// Upper clip of the plotted spectrogram, also the light-curve y limit (sfu).
pub const DEFAULT_VMAX: f64 = 10.0;

/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Julian date of the unix epoch, 1970-01-01T00:00:00 UTC.
pub const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Seconds between the LabVIEW epoch (1904-01-01T00:00:00 UTC) and the unix
/// epoch.
pub const LV_UNIX_OFFSET_S: f64 = 2_082_844_800.0;

/// Rough processing time for one raw data file (minutes), used to warn users
/// before a long run.
pub const MINUTES_PER_FILE: usize = 4;

/// Plot file extensions that are kept as given. Anything else gets `.png`.
pub const ACCEPTED_PLOT_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".tif", ".tiff", ".pdf"];

/// Plot file extensions the bitmap renderer can encode.
pub const RENDERED_PLOT_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".tif", ".tiff"];

/// Width of rendered plots in pixels.
pub const PLOT_X_PIXELS: u32 = 1400;
/// Height of rendered plots in pixels.
pub const PLOT_Y_PIXELS: u32 = 800;

/// Record kind code of a reference calibration.
pub const REFCAL_KIND_CODE: u8 = 8;
/// Record kind code of a phase calibration.
pub const PHACAL_KIND_CODE: u8 = 9;
