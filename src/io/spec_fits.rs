//! The flare spectrum FITS artifact.
//!
//! Layout:
//! - primary HDU: `f64` image of the background-subtracted spectrogram,
//!   `NAXIS1` = time, `NAXIS2` = frequency, plus descriptive keys
//! - `FGHZ` binary table: one `f32` column `FGHZ`, frequencies in GHz
//! - `TIME` binary table: one `f64` column `TIME`, Julian dates

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::error::IOError;
use crate::{
    fitsio::{
        hdu::HduInfo,
        images::{ImageDescription, ImageType},
        tables::{ColumnDataType, ColumnDescription},
        FitsFile,
    },
    hifitime::Epoch,
    ndarray::{Array1, Array2, ArrayView1, ArrayView2},
    types::{epoch_to_isot, jd_to_epoch},
};

/// Descriptive keys of the primary header.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFitsHeader {
    /// Name of the file when it was written.
    pub filename: String,
    /// Creation time, ISO-T.
    pub date: String,
    /// Time of the first sample, ISO-T.
    pub date_obs: String,
    /// Time of the last sample, ISO-T.
    pub date_end: String,
    /// Lowest frequency, GHz.
    pub freqmin: f64,
    /// Highest frequency, GHz.
    pub freqmax: f64,
}

/// A spectrum artifact read back from disk.
#[derive(Debug, Clone)]
pub struct SpecFits {
    /// `[frequency][time]` spectrogram.
    pub spec: Array2<f64>,
    /// Frequencies in GHz.
    pub fghz: Array1<f64>,
    /// Julian dates.
    pub time: Array1<f64>,
    /// Primary header keys.
    pub header: SpecFitsHeader,
}

fn min_max(values: ArrayView1<f64>) -> (f64, f64) {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Write `spec` with its frequency and time axes to `path`, replacing any
/// existing file.
///
/// # Errors
///
/// - [`IOError::SpecFitsInconsistent`] if the axes don't match `spec`, or the
///   time axis is empty
/// - [`IOError::FitsOpen`] / [`IOError::FitsIO`] for fitsio failures
pub fn write_spec_fits(
    path: &Path,
    spec: ArrayView2<f64>,
    fghz: ArrayView1<f64>,
    jd: ArrayView1<f64>,
) -> Result<SpecFitsHeader, IOError> {
    let fits_filename = path.display().to_string();
    let (num_chans, num_times) = spec.dim();
    if fghz.len() != num_chans || jd.len() != num_times {
        return Err(IOError::SpecFitsInconsistent {
            file: fits_filename,
            expected: format!("{} frequencies and {} times", num_chans, num_times),
            found: format!("{} frequencies and {} times", fghz.len(), jd.len()),
        });
    }
    let (first_jd, last_jd) = match (jd.first(), jd.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            return Err(IOError::SpecFitsInconsistent {
                file: fits_filename,
                expected: "at least one time sample".into(),
                found: "none".into(),
            })
        }
    };

    let (freqmin, freqmax) = min_max(fghz);
    let header = SpecFitsHeader {
        filename: path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| fits_filename.clone()),
        date: epoch_to_isot(Epoch::now().map_err(|e| IOError::SystemTime(e.to_string()))?),
        date_obs: epoch_to_isot(jd_to_epoch(first_jd)),
        date_end: epoch_to_isot(jd_to_epoch(last_jd)),
        freqmin,
        freqmax,
    };

    if path.exists() {
        debug!("removing existing {}", fits_filename);
        std::fs::remove_file(path)?;
    }

    let fits_io = |hdu_name: &str| {
        let fits_filename = fits_filename.clone();
        let hdu_name = hdu_name.to_string();
        move |fits_error| IOError::FitsIO {
            fits_error,
            fits_filename,
            hdu_name,
            source_file: file!(),
            source_line: line!(),
        }
    };

    let image_description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[num_chans, num_times],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&image_description)
        .open()
        .map_err(|fits_error| IOError::FitsOpen {
            fits_error,
            fits_filename: fits_filename.clone(),
            source_file: file!(),
            source_line: line!(),
        })?;

    let hdu = fptr.primary_hdu().map_err(fits_io("PRIMARY"))?;
    let image = spec.iter().copied().collect::<Vec<f64>>();
    hdu.write_image(&mut fptr, &image)
        .map_err(fits_io("PRIMARY"))?;
    for (key, value) in [
        ("FILENAME", header.filename.as_str()),
        ("ORIGIN", "NJIT"),
        ("DATE", header.date.as_str()),
        ("OBSERVER", "EOVSA Team"),
        ("TELESCOP", "EOVSA"),
        ("OBJ_ID", "SUN"),
        ("DATE_OBS", header.date_obs.as_str()),
        ("DATE_END", header.date_end.as_str()),
        ("POLARIZA", "I"),
    ] {
        hdu.write_key(&mut fptr, key, value)
            .map_err(fits_io("PRIMARY"))?;
    }
    hdu.write_key(&mut fptr, "TYPE", 1_i64)
        .map_err(fits_io("PRIMARY"))?;
    for (key, value) in [
        ("FREQMIN", header.freqmin),
        ("FREQMAX", header.freqmax),
        ("XCEN", 0.0),
        ("YCEN", 0.0),
        ("RESOLUTI", 0.0),
    ] {
        hdu.write_key(&mut fptr, key, value)
            .map_err(fits_io("PRIMARY"))?;
    }

    let fghz_col = ColumnDescription::new("FGHZ")
        .with_type(ColumnDataType::Float)
        .create()
        .map_err(fits_io("FGHZ"))?;
    let hdu = fptr
        .create_table("FGHZ", &[fghz_col])
        .map_err(fits_io("FGHZ"))?;
    let fghz_f32 = fghz.iter().map(|&f| f as f32).collect::<Vec<f32>>();
    hdu.write_col(&mut fptr, "FGHZ", &fghz_f32)
        .map_err(fits_io("FGHZ"))?;

    let time_col = ColumnDescription::new("TIME")
        .with_type(ColumnDataType::Double)
        .create()
        .map_err(fits_io("TIME"))?;
    let hdu = fptr
        .create_table("TIME", &[time_col])
        .map_err(fits_io("TIME"))?;
    hdu.write_col(&mut fptr, "TIME", &jd.to_vec())
        .map_err(fits_io("TIME"))?;

    info!("wrote spectrum to {}", fits_filename);
    Ok(header)
}

/// Read a spectrum artifact written by [`write_spec_fits`].
///
/// # Errors
///
/// - [`IOError::FitsOpen`] / [`IOError::FitsIO`] for fitsio failures
/// - [`IOError::SpecFitsInconsistent`] if the image and axes disagree
pub fn read_spec_fits(path: &Path) -> Result<SpecFits, IOError> {
    let fits_filename = path.display().to_string();
    let fits_io = |hdu_name: &str| {
        let fits_filename = fits_filename.clone();
        let hdu_name = hdu_name.to_string();
        move |fits_error| IOError::FitsIO {
            fits_error,
            fits_filename,
            hdu_name,
            source_file: file!(),
            source_line: line!(),
        }
    };
    let inconsistent = |expected: String, found: String| IOError::SpecFitsInconsistent {
        file: fits_filename.clone(),
        expected,
        found,
    };

    let mut fptr = FitsFile::open(path).map_err(|fits_error| IOError::FitsOpen {
        fits_error,
        fits_filename: fits_filename.clone(),
        source_file: file!(),
        source_line: line!(),
    })?;

    let hdu = fptr.hdu("FGHZ").map_err(fits_io("FGHZ"))?;
    let fghz: Vec<f32> = hdu.read_col(&mut fptr, "FGHZ").map_err(fits_io("FGHZ"))?;
    let fghz = fghz.into_iter().map(f64::from).collect::<Array1<f64>>();

    let hdu = fptr.hdu("TIME").map_err(fits_io("TIME"))?;
    let time: Vec<f64> = hdu.read_col(&mut fptr, "TIME").map_err(fits_io("TIME"))?;
    let time = Array1::from(time);

    let hdu = fptr.primary_hdu().map_err(fits_io("PRIMARY"))?;
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => {
            return Err(inconsistent(
                "an image in the primary HDU".into(),
                "no image".into(),
            ))
        }
    };
    if shape != [fghz.len(), time.len()] {
        return Err(inconsistent(
            format!("image shape [{}, {}]", fghz.len(), time.len()),
            format!("{:?}", shape),
        ));
    }
    let image: Vec<f64> = hdu.read_image(&mut fptr).map_err(fits_io("PRIMARY"))?;
    let spec = Array2::from_shape_vec((fghz.len(), time.len()), image)
        .map_err(|e| inconsistent(format!("{} pixels", fghz.len() * time.len()), e.to_string()))?;

    let read_str = |fptr: &mut FitsFile, key: &str| -> Result<String, IOError> {
        hdu.read_key::<String>(fptr, key).map_err(fits_io("PRIMARY"))
    };
    let header = SpecFitsHeader {
        filename: read_str(&mut fptr, "FILENAME")?,
        date: read_str(&mut fptr, "DATE")?,
        date_obs: read_str(&mut fptr, "DATE_OBS")?,
        date_end: read_str(&mut fptr, "DATE_END")?,
        freqmin: hdu
            .read_key::<f64>(&mut fptr, "FREQMIN")
            .map_err(fits_io("PRIMARY"))?,
        freqmax: hdu
            .read_key::<f64>(&mut fptr, "FREQMAX")
            .map_err(fits_io("PRIMARY"))?,
    };
    debug!("read spectrum {:?} from {}", spec.dim(), fits_filename);

    Ok(SpecFits {
        spec,
        fghz,
        time,
        header,
    })
}

/// Convenience for [`write_spec_fits`] into `dir` with the standard file
/// name for `flare_id`. Returns the path written.
///
/// # Errors
///
/// See [`write_spec_fits`].
pub fn write_flare_spec_fits(
    dir: &Path,
    flare_id: &str,
    spec: ArrayView2<f64>,
    fghz: ArrayView1<f64>,
    jd: ArrayView1<f64>,
) -> Result<PathBuf, IOError> {
    let path = dir.join(super::spec_fits_filename(flare_id));
    write_spec_fits(&path, spec, fghz, jd)?;
    Ok(path)
}
