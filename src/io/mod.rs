//! Input and output: the spectrum artifact, calibration record layouts, and
//! the collaborators that locate and prepare raw visibility files.

pub mod error;
pub mod schema;
pub mod spec_fits;

use std::io::{BufRead, Write};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::{
    constants::{ACCEPTED_PLOT_EXTENSIONS, MINUTES_PER_FILE},
    hifitime::Epoch,
    types::{jd_to_epoch, round_to_millis, VisDataset},
};

use self::error::IOError;

/// Something that can turn a list of visibility files into a
/// [`VisDataset`].
pub trait VisibilityReader {
    /// Read and concatenate the visibilities in `files`. With `srcchk`, files
    /// whose source doesn't match the first are skipped.
    ///
    /// # Errors
    ///
    /// Implementation defined, usually [`IOError::Collaborator`].
    fn read_vis(&self, files: &[String], srcchk: bool) -> Result<VisDataset, IOError>;
}

/// Something that knows which raw visibility files cover a time range.
pub trait TimeRangeLookup {
    /// Files whose data fall between `start` and `end`.
    ///
    /// # Errors
    ///
    /// Implementation defined, usually [`IOError::Collaborator`].
    fn files_for_range(&self, start: Epoch, end: Epoch) -> Result<Vec<String>, IOError>;
}

/// Something that calibrates and desaturates a raw visibility file,
/// producing a new file.
pub trait FileCorrector {
    /// Correct `file`, returning the path of the corrected copy.
    ///
    /// # Errors
    ///
    /// Implementation defined, usually [`IOError::Collaborator`].
    fn correct(&self, file: &str) -> Result<String, IOError>;
}

/// How the raw files for a flare are specified.
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// All files between two times.
    TimeRange(Epoch, Epoch),
    /// A single file.
    File(String),
    /// An explicit list of files.
    Files(Vec<String>),
}

/// Turn an [`InputKind`] into a list of files. A failed time range lookup is
/// logged and gives an empty list.
pub fn resolve_file_list<L>(input: InputKind, lookup: &L) -> Vec<String>
where
    L: TimeRangeLookup + ?Sized,
{
    match input {
        InputKind::TimeRange(start, end) => match lookup.files_for_range(start, end) {
            Ok(files) => {
                debug!("{} files between {} and {}", files.len(), start, end);
                files
            }
            Err(e) => {
                warn!("couldn't find files between {} and {}: {}", start, end, e);
                vec![]
            }
        },
        InputKind::File(file) => vec![file],
        InputKind::Files(files) => files,
    }
}

/// List `files` with a time estimate on `output`, then read one line from
/// `input`. Only `y` or `Y` proceeds, in which case every file is passed
/// through `corrector` and the corrected paths are returned. Anything else
/// returns an empty list.
///
/// # Errors
///
/// [`IOError::StdIo`] if the prompt can't be written or the answer can't be
/// read, or whatever `corrector` returns.
pub fn confirm_and_correct<C, R, W>(
    files: &[String],
    corrector: &C,
    input: &mut R,
    output: &mut W,
    draw_progress: bool,
) -> Result<Vec<String>, IOError>
where
    C: FileCorrector + ?Sized,
    R: BufRead,
    W: Write,
{
    if files.is_empty() {
        writeln!(output, "No files to process.")?;
        return Ok(vec![]);
    }
    writeln!(output, "Files to process:")?;
    for file in files {
        writeln!(output, "  {}", file)?;
    }
    writeln!(
        output,
        "Estimated processing time: {} minutes",
        MINUTES_PER_FILE * files.len()
    )?;
    write!(output, "Proceed? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if !matches!(answer.trim(), "y" | "Y") {
        info!("aborted by user");
        return Ok(vec![]);
    }

    let draw_target = if draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let correct_progress = ProgressBar::with_draw_target(Some(files.len() as u64), draw_target);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})")
    {
        correct_progress.set_style(style.progress_chars("=> "));
    }
    correct_progress.set_message("correct files");

    let corrected = files
        .iter()
        .map(|file| {
            let result = corrector.correct(file);
            correct_progress.inc(1);
            result
        })
        .collect::<Result<Vec<_>, _>>()?;
    correct_progress.finish();
    Ok(corrected)
}

lazy_static! {
    static ref RE_FORBIDDEN: Regex = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    static ref RE_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Replace characters that are invalid in file names, and runs of
/// whitespace, with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let name = RE_FORBIDDEN.replace_all(name, "_");
    RE_WHITESPACE.replace_all(&name, "_").to_string()
}

/// The flare identifier: the peak time `tpk` if given, otherwise the first
/// time sample `jd0` to the second, with `-`, ` ` and `:` removed.
///
/// ```
/// use flarespec::io::flare_id;
///
/// assert_eq!(flare_id(Some("2022-01-01 12:34:56"), 0.0), "20220101123456");
/// assert_eq!(flare_id(None, 2_459_580.5), "20220101000000");
/// ```
pub fn flare_id(tpk: Option<&str>, jd0: f64) -> String {
    let time_str = match tpk {
        Some(tpk) => tpk.to_string(),
        None => {
            let (y, mo, d, h, mi, s, _) =
                round_to_millis(jd_to_epoch(jd0)).to_gregorian_utc();
            format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
        }
    };
    time_str
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | ':'))
        .collect()
}

/// File name of the spectrum artifact for `flare_id`.
pub fn spec_fits_filename(flare_id: &str) -> String {
    format!("eovsa.spec.flare_id_{}.fits", flare_id)
}

/// File name of the plot: the sanitized `name` if given, otherwise the
/// standard stem for `flare_id`. `.png` is appended unless the name already
/// has an image extension.
pub fn plot_filename(name: Option<&str>, flare_id: &str) -> String {
    let name = match name {
        Some(name) => sanitize_filename(name),
        None => format!("eovsa.spec.flare_id_{}", flare_id),
    };
    let lower = name.to_lowercase();
    if ACCEPTED_PLOT_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        name
    } else {
        format!("{}.png", name)
    }
}
