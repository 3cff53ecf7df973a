//! Errors that can occur in flarespec

use thiserror::Error;

use crate::{calibration::CalRecordError, io::error::IOError, selection::SelectionError};

#[derive(Error, Debug)]
/// Errors relating to CLI invocation
pub enum CLIError {
    /// When a bad CLI argument is provided
    #[error("Invalid Command Line Argument for option {option}. Expected {expected}. Received {received}")]
    InvalidCommandLineArgument {
        /// The argument name within the clap app
        option: String,
        /// Description of what was expected
        expected: String,
        /// What was received
        received: String,
    },
}

#[derive(Error, Debug)]
/// Errors that can be raised while processing flare data.
pub enum FlareSpecError {
    /// Error derived from [`CLIError`]
    #[error(transparent)]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    /// Error derived from [`clap::Error`]
    #[error(transparent)]
    ClapError(#[from] clap::Error),

    /// Error derived from [`IOError`]
    #[error(transparent)]
    IOError(#[from] IOError),

    /// Error derived from [`SelectionError`]
    #[error(transparent)]
    SelectionError(#[from] SelectionError),

    /// Error derived from [`CalRecordError`]
    #[error(transparent)]
    CalRecordError(#[from] CalRecordError),

    /// Error derived from [`crate::plot::PlotError`]
    #[error(transparent)]
    PlotError(#[from] crate::plot::PlotError),

    /// An array did not have the shape a function expected.
    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },

    /// Not really an error, the user asked to print the summary and exit.
    #[error("Dry run")]
    DryRun {},
}
