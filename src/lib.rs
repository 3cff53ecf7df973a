#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! flarespec turns calibrated visibilities from the Expanded Owens Valley
//! Solar Array (EOVSA) into solar flare dynamic spectra and light curves, and
//! decodes the calibration records stored alongside them.
//!
//! # Examples
//!
//! Combine the medium-length baselines between a few antennas into a
//! spectrogram, then remove the background and extract light curves.
//!
//! ```rust
//! use flarespec::{
//!     ndarray::{Array1, Array3, Array4},
//!     parse_ant_str, Complex, SpecContext, TimeWindow, VisDataset,
//! };
//!
//! // the first two EOVSA baselines, (0, 1) and (0, 2), both 500ns long
//! let (num_bls, num_chans, num_times) = (2, 4, 20);
//! let time = Array1::from_shape_fn(num_times, |t| 2_459_580.5 + t as f64 / 86400.0);
//! let fghz = Array1::linspace(1.0, 2.5, num_chans);
//! let mut uvw = Array3::zeros((num_bls, num_times, 3));
//! uvw.slice_mut(flarespec::ndarray::s![.., .., 0]).fill(500.0);
//! let x = Array4::from_elem((num_bls, 1, num_chans, num_times), Complex::new(3.0, 4.0));
//! let dataset = VisDataset::new(time, fghz, uvw, x).unwrap();
//!
//! let spec_ctx = SpecContext {
//!     bg_window: Some(TimeWindow::new(0, 5)),
//!     lc_chans: vec![1],
//!     ..SpecContext::default()
//! };
//! let ant_list = parse_ant_str("ant1-3").unwrap();
//! let processed = spec_ctx.process_dataset(&dataset, &ant_list);
//!
//! assert_eq!(processed.spec.dim(), (num_chans, num_times));
//! assert_eq!(processed.spec[(0, 10)], 0.0);
//! assert_eq!(processed.light_curves.len(), 1);
//! ```
//!
//! # Details
//!
//! Reading raw visibility files, querying the calibration database and
//! correcting raw files are left to implementations of
//! [`io::VisibilityReader`], [`calibration::CalRecordReader`],
//! [`io::TimeRangeLookup`] and [`io::FileCorrector`].

pub mod background;
pub mod calibration;
pub mod constants;
pub mod error;
pub mod io;
pub mod lightcurve;
pub mod plot;
pub mod processing;
pub mod selection;
pub mod spectrogram;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use background::{
    blank_time_gaps, estimate_background, fix_times, mask_notches, subtract_background,
    BackgroundModel,
};
pub use calibration::{
    decode_records, read_phacals, read_refcals, CalBuffers, CalKind, CalRecord, CalRecordError,
    CalRecordReader, Decoded, PhaCal, RecordOutcome, RefCal, TimeSelector,
};
pub use error::FlareSpecError;
pub use io::{
    schema::{CalSchema, FieldDescriptor, FieldType},
    spec_fits::{read_spec_fits, write_spec_fits, SpecFits},
};
pub use lightcurve::{extract_light_curve, LightCurve};
pub use processing::{ProcessedSpec, SpecContext, SpecContextBuilder};
pub use selection::{parse_ant_str, select_baselines, BaselineOrder, UpperTriangleOrder};
pub use spectrogram::{aggregate, combine_subtracted, inspect, AggregateMode};
pub use types::{TimeWindow, VisDataset};

pub use marlu::{self, fitsio, hifitime, ndarray, Complex};
