//! Errors that can occur in the io module

use thiserror::Error;

use crate::fitsio;

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// All the errors that can occur in file io operations
pub enum IOError {
    /// Error when opening a fits file.
    #[error("{source_file}:{source_line}\nCouldn't open {fits_filename}: {fits_error}")]
    FitsOpen {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file
        fits_filename: String,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },
    /// A generic error associated with the fitsio crate.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_name}: {fits_error}")]
    FitsIO {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file where the error occurred
        fits_filename: String,
        /// The name of the HDU in the fits file where the error occurred
        hdu_name: String,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    #[error("{0}")]
    /// Error derived from [`fitsio::errors::Error`]
    FitsioError(#[from] fitsio::errors::Error),

    #[error("{0}")]
    /// Error derived from [`std::io::Error`]
    StdIo(#[from] std::io::Error),

    /// Error to describe some kind of inconsistent state within a spectrum file.
    #[error("Inconsistent spectrum file (file: {file}, expected: {expected}, found: {found})")]
    SpecFitsInconsistent {
        /// The filename of the fits file where the error occurred
        file: String,
        /// The value that was expected
        expected: String,
        /// The unexpected value that was found
        found: String,
    },

    /// A visibility dataset whose arrays disagree on their dimensions.
    #[error("Inconsistent visibility dataset: {0}")]
    VisShape(String),

    /// An external collaborator (visibility reader, file lookup, file
    /// correction) failed.
    #[error("{0}")]
    Collaborator(String),

    /// The system clock couldn't be read.
    #[error("Couldn't read the system time: {0}")]
    SystemTime(String),
}
