//! Reference and phase calibration records.
//!
//! Calibration records are stored as fixed-layout binary buffers, one per
//! record, alongside a [`CalSchema`] describing where each named field
//! lives. A query returns either a single buffer or a batch of them; the
//! [`CalBuffers`] tag is decided once, where the buffers are read.
//!
//! Decoding a single record propagates any failure. Decoding a batch never
//! fails as a whole: every record gets its own [`RecordOutcome`].
//!
//! # Examples
//!
//! ```rust
//! use flarespec::{
//!     calibration::{decode_records, CalBuffers, Decoded, RefCal},
//!     io::schema::{CalSchema, FieldDescriptor, FieldType},
//! };
//!
//! let mut schema = CalSchema::new();
//! for (i, name) in ["Refcal_Real", "Refcal_Imag", "Refcal_Flag", "Fghz", "Refcal_Sigma",
//!                   "Timestamp", "T_beg", "T_end"].iter().enumerate() {
//!     schema.insert(name, FieldDescriptor::new(8 * i, FieldType::F64, &[]));
//! }
//!
//! // a record that's too short to hold every field
//! let buffers = CalBuffers::Batch(vec![vec![0; 64], vec![0; 8]]);
//! let decoded = decode_records::<RefCal>(&buffers, &schema).unwrap();
//! assert!(matches!(&decoded, Decoded::Batch(outcomes) if outcomes.len() == 2));
//! assert_eq!(decoded.into_records().len(), 1);
//! ```

use std::fmt::Display;

use itertools::izip;
use log::{debug, warn};
use thiserror::Error;

use crate::{
    constants::{LV_UNIX_OFFSET_S, PHACAL_KIND_CODE, REFCAL_KIND_CODE},
    hifitime::Epoch,
    io::schema::{extract_f64, extract_i32, extract_scalar_f64, CalSchema},
    ndarray::{ArrayD, Axis},
    types::epoch_to_isot,
    Complex,
};

/// Errors while decoding calibration records.
#[derive(Error, Debug)]
pub enum CalRecordError {
    /// The schema has no field with this name.
    #[error("calibration schema has no field {name}")]
    MissingField {
        /// The field name
        name: String,
    },

    /// A field extends past the end of the record buffer.
    #[error("field {name} ends at byte {end}, but the record is only {buf_len} bytes")]
    OutOfBounds {
        /// The field name
        name: String,
        /// One past the last byte of the field
        end: usize,
        /// Length of the record buffer
        buf_len: usize,
    },

    /// A field doesn't have the shape the record requires.
    #[error("field {name} has a bad shape. expected {expected}, received {received}")]
    BadShape {
        /// The field name
        name: String,
        /// Description of the expected shape
        expected: String,
        /// Description of the shape that was found
        received: String,
    },

    /// The calibration record source failed.
    #[error("couldn't read {kind} records: {message}")]
    Reader {
        /// The kind of record being read
        kind: CalKind,
        /// What went wrong
        message: String,
    },
}

/// The kinds of calibration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalKind {
    /// Reference calibration, kind code 8.
    RefCal,
    /// Phase calibration, kind code 9.
    PhaCal,
}

impl CalKind {
    /// Numeric kind code used by the calibration database.
    pub fn code(&self) -> u8 {
        match self {
            Self::RefCal => REFCAL_KIND_CODE,
            Self::PhaCal => PHACAL_KIND_CODE,
        }
    }

    /// The kind with numeric code `code`, if any.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            REFCAL_KIND_CODE => Some(Self::RefCal),
            PHACAL_KIND_CODE => Some(Self::PhaCal),
            _ => None,
        }
    }
}

impl Display for CalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RefCal => write!(f, "refcal"),
            Self::PhaCal => write!(f, "phacal"),
        }
    }
}

/// Convert a LabVIEW timestamp (seconds since 1904-01-01T00:00:00 UTC) to an
/// [`Epoch`].
pub fn lv_to_epoch(lv_seconds: f64) -> Epoch {
    Epoch::from_unix_seconds(lv_seconds - LV_UNIX_OFFSET_S)
}

fn read_lv_time(buf: &[u8], schema: &CalSchema, name: &str) -> Result<Epoch, CalRecordError> {
    extract_scalar_f64(buf, schema, name).map(lv_to_epoch)
}

/// A decoded reference calibration, or the common part of a phase
/// calibration.
#[derive(Debug, Clone)]
pub struct RefCal {
    /// Phase of the complex gain, radians.
    pub pha: ArrayD<f64>,
    /// Amplitude of the complex gain.
    pub amp: ArrayD<f64>,
    /// Flags.
    pub flag: ArrayD<i32>,
    /// Frequencies, GHz.
    pub fghz: ArrayD<f64>,
    /// Uncertainties.
    pub sigma: ArrayD<f64>,
    /// Record timestamp.
    pub timestamp: Epoch,
    /// Start of the interval the calibration was derived from.
    pub t_bg: Epoch,
    /// End of the interval the calibration was derived from.
    pub t_ed: Epoch,
}

/// A decoded phase calibration.
#[derive(Debug, Clone)]
pub struct PhaCal {
    /// Phase offset, the first slice of the multi-band delay.
    pub poff: ArrayD<f64>,
    /// Phase slope, the second slice of the multi-band delay.
    pub pslope: ArrayD<f64>,
    /// First slice of the per-antenna flags.
    pub flag: ArrayD<i32>,
    /// Phase calibration timestamp.
    pub t_pha: Epoch,
    /// Timestamp of the reference calibration this was measured against.
    pub t_ref: Epoch,
    /// The raw phase calibration, in reference calibration form.
    pub phacal: RefCal,
}

/// A record type that can be decoded from a buffer.
pub trait CalRecord: Sized {
    /// Which kind of record this is.
    const KIND: CalKind;

    /// Decode one record from `buf` using the field layout in `schema`.
    ///
    /// # Errors
    ///
    /// [`CalRecordError`] if a field is missing, truncated or misshapen.
    fn decode(buf: &[u8], schema: &CalSchema) -> Result<Self, CalRecordError>;
}

impl CalRecord for RefCal {
    const KIND: CalKind = CalKind::RefCal;

    fn decode(buf: &[u8], schema: &CalSchema) -> Result<Self, CalRecordError> {
        let real = extract_f64(buf, schema, "Refcal_Real")?;
        let imag = extract_f64(buf, schema, "Refcal_Imag")?;
        if real.shape() != imag.shape() {
            return Err(CalRecordError::BadShape {
                name: "Refcal_Imag".into(),
                expected: format!("{:?} (same as Refcal_Real)", real.shape()),
                received: format!("{:?}", imag.shape()),
            });
        }
        let gains = izip!(real.iter(), imag.iter())
            .map(|(&re, &im)| Complex::new(re, im))
            .collect::<Vec<_>>();
        let to_array = |values: Vec<f64>| {
            ArrayD::from_shape_vec(real.raw_dim(), values).map_err(|e| CalRecordError::BadShape {
                name: "Refcal_Real".into(),
                expected: format!("{:?}", real.shape()),
                received: e.to_string(),
            })
        };
        Ok(Self {
            pha: to_array(gains.iter().map(|g| g.arg()).collect())?,
            amp: to_array(gains.iter().map(|g| g.norm()).collect())?,
            flag: extract_i32(buf, schema, "Refcal_Flag")?,
            fghz: extract_f64(buf, schema, "Fghz")?,
            sigma: extract_f64(buf, schema, "Refcal_Sigma")?,
            timestamp: read_lv_time(buf, schema, "Timestamp")?,
            t_bg: read_lv_time(buf, schema, "T_beg")?,
            t_ed: read_lv_time(buf, schema, "T_end")?,
        })
    }
}

/// Split `array` along its last axis, checking it has at least `min_len`
/// entries there, and return slice `index`.
fn last_axis_slice(
    array: &ArrayD<f64>,
    name: &str,
    min_len: usize,
    index: usize,
) -> Result<ArrayD<f64>, CalRecordError> {
    let bad_shape = || CalRecordError::BadShape {
        name: name.to_string(),
        expected: format!("a last axis of length >= {}", min_len),
        received: format!("{:?}", array.shape()),
    };
    let last = array.ndim().checked_sub(1).ok_or_else(bad_shape)?;
    if array.len_of(Axis(last)) < min_len {
        return Err(bad_shape());
    }
    Ok(array.index_axis(Axis(last), index).to_owned())
}

impl CalRecord for PhaCal {
    const KIND: CalKind = CalKind::PhaCal;

    fn decode(buf: &[u8], schema: &CalSchema) -> Result<Self, CalRecordError> {
        let timestamp = read_lv_time(buf, schema, "Timestamp")?;
        let phacal = RefCal {
            pha: extract_f64(buf, schema, "Phacal_Pha")?,
            amp: extract_f64(buf, schema, "Phacal_Amp")?,
            flag: extract_i32(buf, schema, "Phacal_Flag")?,
            fghz: extract_f64(buf, schema, "Fghz")?,
            sigma: extract_f64(buf, schema, "Phacal_Sigma")?,
            timestamp,
            t_bg: read_lv_time(buf, schema, "T_beg")?,
            t_ed: read_lv_time(buf, schema, "T_end")?,
        };

        let mbd = extract_f64(buf, schema, "MBD")?;
        if mbd.ndim() == 0 || mbd.shape()[mbd.ndim() - 1] != 2 {
            return Err(CalRecordError::BadShape {
                name: "MBD".into(),
                expected: "a last axis of length 2 (offset, slope)".into(),
                received: format!("{:?}", mbd.shape()),
            });
        }
        let poff = last_axis_slice(&mbd, "MBD", 2, 0)?;
        let pslope = last_axis_slice(&mbd, "MBD", 2, 1)?;
        let flag = last_axis_slice(&extract_f64(buf, schema, "Flag")?, "Flag", 1, 0)?
            .mapv(|v| v as i32);

        Ok(Self {
            poff,
            pslope,
            flag,
            t_pha: timestamp,
            t_ref: read_lv_time(buf, schema, "T_refcal")?,
            phacal,
        })
    }
}

/// The raw result of a calibration query.
#[derive(Debug, Clone)]
pub enum CalBuffers {
    /// A query that matched a single record.
    Single(Vec<u8>),
    /// A query that matched several records.
    Batch(Vec<Vec<u8>>),
}

/// The outcome of decoding one record of a batch.
#[derive(Debug)]
pub struct RecordOutcome<T> {
    /// Position of the record within the batch, from zero.
    pub index: usize,
    /// Timestamp of the record, if it could be read.
    pub timestamp: Option<Epoch>,
    /// The decoded record, or why it couldn't be decoded.
    pub outcome: Result<T, CalRecordError>,
}

/// Decoded records, in the same shape as the [`CalBuffers`] they came from.
#[derive(Debug)]
pub enum Decoded<T> {
    /// The decoded single record.
    Single(T),
    /// Per-record outcomes of a batch, in input order.
    Batch(Vec<RecordOutcome<T>>),
}

impl<T> Decoded<T> {
    /// All successfully decoded records. Failures in a batch are logged
    /// (1-based record number and timestamp, when available) and dropped.
    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Single(record) => vec![record],
            Self::Batch(outcomes) => outcomes
                .into_iter()
                .filter_map(|RecordOutcome {
                     index,
                     timestamp,
                     outcome,
                 }| match outcome {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(
                            "failed to load record {} ---> {}: {}",
                            index + 1,
                            timestamp
                                .map(epoch_to_isot)
                                .unwrap_or_else(|| "<unknown time>".into()),
                            e
                        );
                        None
                    }
                })
                .collect(),
        }
    }

    /// Number of records that failed to decode.
    pub fn num_failed(&self) -> usize {
        match self {
            Self::Single(_) => 0,
            Self::Batch(outcomes) => outcomes.iter().filter(|o| o.outcome.is_err()).count(),
        }
    }
}

/// Decode `buffers` as records of type `T`.
///
/// # Errors
///
/// A [`CalBuffers::Single`] record that fails to decode propagates its
/// [`CalRecordError`]. A batch always succeeds, with per-record outcomes.
pub fn decode_records<T: CalRecord>(
    buffers: &CalBuffers,
    schema: &CalSchema,
) -> Result<Decoded<T>, CalRecordError> {
    match buffers {
        CalBuffers::Single(buf) => T::decode(buf, schema).map(Decoded::Single),
        CalBuffers::Batch(bufs) => {
            debug!("decoding a batch of {} {} records", bufs.len(), T::KIND);
            Ok(Decoded::Batch(
                bufs.iter()
                    .enumerate()
                    .map(|(index, buf)| {
                        let outcome = T::decode(buf, schema);
                        let timestamp = match &outcome {
                            Ok(_) => None,
                            Err(_) => read_lv_time(buf, schema, "Timestamp").ok(),
                        };
                        RecordOutcome {
                            index,
                            timestamp,
                            outcome,
                        }
                    })
                    .collect(),
            ))
        }
    }
}

/// Which calibration records to fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSelector {
    /// The record closest to this time.
    At(Epoch),
    /// All records within `[start, end]`.
    Range(Epoch, Epoch),
}

/// A source of calibration records, e.g. the calibration database.
pub trait CalRecordReader {
    /// Fetch the schema and the raw buffers of `kind` records matching
    /// `selector`.
    ///
    /// # Errors
    ///
    /// [`CalRecordError::Reader`] if the source can't be queried.
    fn read_cal(
        &self,
        kind: CalKind,
        selector: &TimeSelector,
    ) -> Result<(CalSchema, CalBuffers), CalRecordError>;
}

fn read_records<T: CalRecord>(
    reader: &impl CalRecordReader,
    selector: &TimeSelector,
) -> Result<Decoded<T>, CalRecordError> {
    let (schema, buffers) = reader.read_cal(T::KIND, selector)?;
    decode_records(&buffers, &schema)
}

/// Fetch and decode reference calibrations for `selector`.
///
/// # Errors
///
/// See [`CalRecordReader::read_cal`] and [`decode_records`].
pub fn read_refcals(
    reader: &impl CalRecordReader,
    selector: &TimeSelector,
) -> Result<Decoded<RefCal>, CalRecordError> {
    read_records(reader, selector)
}

/// Fetch and decode phase calibrations for `selector`.
///
/// # Errors
///
/// See [`CalRecordReader::read_cal`] and [`decode_records`].
pub fn read_phacals(
    reader: &impl CalRecordReader,
    selector: &TimeSelector,
) -> Result<Decoded<PhaCal>, CalRecordError> {
    read_records(reader, selector)
}
