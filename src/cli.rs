//! Command Line Interface helpers for flarespec

use crate::{
    error::{CLIError::InvalidCommandLineArgument, FlareSpecError, FlareSpecError::DryRun},
    io::{
        flare_id, plot_filename,
        spec_fits::{read_spec_fits, write_flare_spec_fits, SpecFits},
    },
    plot::{can_render, plot_spectrogram},
    processing::SpecContext,
    types::TimeWindow,
};
use clap::{
    arg, command,
    ErrorKind::{ArgumentNotFound, DisplayHelp, DisplayVersion},
    ValueHint::{DirPath, FilePath},
};
use log::{debug, info, trace};
use prettytable::{format as prettyformat, row, table};
use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    path::{Path, PathBuf},
};

/// Everything needed to re-process a flare spectrum file.
pub struct FlareSpecContext {
    /// Path of the input spectrum file
    pub input_path: PathBuf,
    /// The input spectrum
    pub input: SpecFits,
    /// Clean-up parameters
    pub spec_ctx: SpecContext,
    /// Directory to write outputs to
    pub out_dir: PathBuf,
    /// Plot file name, if not the default
    pub plot_name: Option<String>,
    /// Peak time, used to name the outputs
    pub tpk: Option<String>,
    /// Whether to render a plot
    pub plot: bool,
}

/// Paths written by [`FlareSpecContext::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlareSpecOutputs {
    /// The new spectrum file
    pub fits_path: PathBuf,
    /// The plot, if one was rendered
    pub plot_path: Option<PathBuf>,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match GIT_HEAD_REF {
        Some(hr) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                GIT_COMMIT_HASH.unwrap_or("<unknown>"),
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        None => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

impl FlareSpecContext {
    fn flare_id(&self) -> String {
        flare_id(
            self.tpk.as_deref(),
            self.input.time.first().copied().unwrap_or_default(),
        )
    }
}

impl Display for FlareSpecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        let header = &self.input.header;
        let (num_chans, num_times) = self.input.spec.dim();
        let mut input_table = table!(
            ["file", self.input_path.display()],
            ["channels", num_chans],
            ["times", num_times],
            ["start", header.date_obs],
            ["end", header.date_end],
            [
                "frequencies",
                format!("{:.4} - {:.4} GHz", header.freqmin, header.freqmax)
            ]
        );
        input_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        writeln!(f, "Input spectrum:\n{}", input_table)?;

        let flare_id = self.flare_id();
        let mut output_table = table!([
            "spectrum",
            self.out_dir
                .join(crate::io::spec_fits_filename(&flare_id))
                .display()
        ]);
        if self.plot {
            output_table.add_row(row![
                "plot",
                self.out_dir
                    .join(plot_filename(self.plot_name.as_deref(), &flare_id))
                    .display()
            ]);
        }
        output_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        writeln!(f, "Outputs:\n{}", output_table)?;

        writeln!(f, "Spectrum Context: \n{}", &self.spec_ctx)?;
        Ok(())
    }
}

fn parse_window(
    matches: &clap::ArgMatches,
    name: &str,
) -> Result<Option<TimeWindow>, FlareSpecError> {
    match matches.values_of_t::<usize>(name) {
        Ok(values) => match values[..] {
            [start, end] if start < end => Ok(Some(TimeWindow::new(start, end))),
            _ => Err(FlareSpecError::CLIError(InvalidCommandLineArgument {
                option: format!("--{} <START> <END>", name),
                expected: "start < end".into(),
                received: format!("{:?}", values),
            })),
        },
        Err(err) if err.kind() == ArgumentNotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl FlareSpecContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, FlareSpecError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Clean up an EOVSA flare spectrum: subtract the background, mask \
                    interference and gaps, extract light curves, and plot.")
            .args(&[
                // input options
                arg!(input: <PATH> "Spectrum FITS file to process")
                    .value_hint(FilePath)
                    .help_heading("INPUT")
                    .required(true),

                // output options
                arg!(-o --"out-dir" <DIR> "Directory to write outputs to [default: .]")
                    .value_hint(DirPath)
                    .help_heading("OUTPUT")
                    .required(false),
                arg!(--name <NAME> "Plot file name [default: eovsa.spec.flare_id_<ID>.png]")
                    .help_heading("OUTPUT")
                    .required(false),
                arg!(--tpk <TIME> "Flare peak time (e.g. '2022-01-01 12:34:56'), names the outputs")
                    .help_heading("OUTPUT")
                    .required(false),
                arg!(--"no-plot" "Don't render a plot")
                    .help_heading("OUTPUT"),
                arg!(--"dry-run" "Just print the summary and exit"),
                arg!(--"no-draw-progress" "do not show progress bars"),

                // background options
                arg!(--bg "Background window of time samples [START, END) [default: 100 110]")
                    .help_heading("BACKGROUND")
                    .value_names(&["START", "END"])
                    .required(false)
                    .conflicts_with("no-bg"),
                arg!(--bg2 "Second background window, interpolated against --bg")
                    .help_heading("BACKGROUND")
                    .value_names(&["START", "END"])
                    .required(false),
                arg!(--"no-bg" "Don't subtract a background")
                    .help_heading("BACKGROUND")
                    .conflicts_with("bg2"),

                // clean-up options
                arg!(--notch <GHZ>... "Interference frequencies to mask [default: 1.742]")
                    .help_heading("CLEAN-UP")
                    .multiple_values(true)
                    .required(false)
                    .conflicts_with("no-notch"),
                arg!(--"no-notch" "Don't mask any interference frequencies")
                    .help_heading("CLEAN-UP"),
                arg!(--"max-cadence" <SECONDS> "Spacings longer than this are gaps [default: 1]")
                    .help_heading("CLEAN-UP")
                    .required(false),

                // plot options
                arg!(--"lc-chans" <CHANS>... "Channels to extract light curves at [default: 25 235]")
                    .help_heading("PLOT")
                    .multiple_values(true)
                    .required(false),
                arg!(--vmin <VALUE> "Lower limit of the spectrogram colour scale [default: 0.1]")
                    .help_heading("PLOT")
                    .required(false),
                arg!(--vmax <VALUE> "Upper limit of the colour scale and light curves [default: 10]")
                    .help_heading("PLOT")
                    .required(false),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_spec_matches(
        matches: &clap::ArgMatches,
        input: &SpecFits,
    ) -> Result<SpecContext, FlareSpecError> {
        let mut spec_ctx = SpecContext::default();

        if matches.is_present("no-bg") {
            spec_ctx.bg_window = None;
        } else if let Some(bg_window) = parse_window(matches, "bg")? {
            spec_ctx.bg_window = Some(bg_window);
        }
        spec_ctx.bg2_window = parse_window(matches, "bg2")?;

        if matches.is_present("no-notch") {
            spec_ctx.notches_ghz = vec![];
        }
        match matches.values_of_t::<f64>("notch") {
            Ok(notches) => spec_ctx.notches_ghz = notches,
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            _ => {}
        }

        match matches.value_of_t::<f64>("max-cadence") {
            Ok(max_cadence) if max_cadence > 0.0 => spec_ctx.max_cadence_s = max_cadence,
            Ok(max_cadence) => {
                return Err(FlareSpecError::CLIError(InvalidCommandLineArgument {
                    option: "--max-cadence <SECONDS>".into(),
                    expected: "a positive number".into(),
                    received: format!("{}", max_cadence),
                }))
            }
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            _ => {}
        }

        let num_chans = input.fghz.len();
        match matches.values_of_t::<usize>("lc-chans") {
            Ok(chans) => {
                if let Some(bad) = chans.iter().find(|&&chan| chan >= num_chans) {
                    return Err(FlareSpecError::CLIError(InvalidCommandLineArgument {
                        option: "--lc-chans <CHANS>...".into(),
                        expected: format!("channels < num_chans={}", num_chans),
                        received: format!("{}", bad),
                    }));
                }
                spec_ctx.lc_chans = chans;
            }
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            _ => {}
        }

        let (vmin, vmax) = match (
            matches.value_of_t::<f64>("vmin"),
            matches.value_of_t::<f64>("vmax"),
        ) {
            // filter any errors other than ArgumentNotFound
            (Err(err), _) if err.kind() != ArgumentNotFound => return Err(err.into()),
            (_, Err(err)) if err.kind() != ArgumentNotFound => return Err(err.into()),
            (vmin, vmax) => (
                vmin.unwrap_or(spec_ctx.vmin),
                vmax.unwrap_or(spec_ctx.vmax),
            ),
        };
        if !(vmin > 0.0 && vmin < vmax) {
            return Err(FlareSpecError::CLIError(InvalidCommandLineArgument {
                option: "--vmin <VALUE> --vmax <VALUE>".into(),
                expected: "0 < vmin < vmax".into(),
                received: format!("vmin={} vmax={}", vmin, vmax),
            }));
        }
        spec_ctx.vmin = vmin;
        spec_ctx.vmax = vmax;

        spec_ctx.draw_progress = !matches.is_present("no-draw-progress");
        Ok(spec_ctx)
    }

    /// Parse an iterator of arguments, `args` into a `FlareSpecContext`,
    /// reading the input spectrum.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - `IOError` if the input spectrum can't be read
    /// - `FlareSpecError::CLIError` if the arguments are invalid.
    /// - `FlareSpecError::DryRun` if `--dry-run` was given
    pub fn from_args<I, T>(args: I) -> Result<Self, FlareSpecError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let input_path = match matches.value_of("input") {
            Some(path) => PathBuf::from(path),
            None => unreachable!("<PATH> is required, enforced by clap"),
        };
        let input = read_spec_fits(&input_path)?;
        let spec_ctx = Self::parse_spec_matches(&matches, &input)?;

        let plot = !matches.is_present("no-plot");
        let plot_name = matches.value_of("name").map(String::from);
        if plot {
            // checked before anything is written
            let name = plot_filename(plot_name.as_deref(), "");
            if !can_render(Path::new(&name)) {
                return Err(FlareSpecError::CLIError(InvalidCommandLineArgument {
                    option: "--name <NAME>".into(),
                    expected: "a .png, .jpg, .jpeg, .tif or .tiff plot name, or --no-plot".into(),
                    received: name,
                }));
            }
        }

        let result = Self {
            input_path,
            input,
            spec_ctx,
            out_dir: matches.value_of("out-dir").unwrap_or(".").into(),
            plot_name,
            tpk: matches.value_of("tpk").map(Into::into),
            plot,
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Clean up the input spectrum, then write it and its plot.
    ///
    /// # Errors
    ///
    /// can raise:
    /// - `IOError` if the spectrum can't be written
    /// - `PlotError` if the plot can't be rendered
    pub fn run(self) -> Result<FlareSpecOutputs, FlareSpecError> {
        let flare_id = self.flare_id();
        let processed = self.spec_ctx.process(
            self.input.spec.view(),
            self.input.fghz.view(),
            self.input.time.view(),
        );

        let fits_path = write_flare_spec_fits(
            &self.out_dir,
            &flare_id,
            processed.spec.view(),
            self.input.fghz.view(),
            processed.time.view(),
        )?;

        let plot_path = if self.plot {
            let plot_path = self
                .out_dir
                .join(plot_filename(self.plot_name.as_deref(), &flare_id));
            plot_spectrogram(
                &plot_path,
                processed.spec.view(),
                self.input.fghz.view(),
                processed.time.view(),
                &processed.light_curves,
                self.spec_ctx.vmin,
                self.spec_ctx.vmax,
            )?;
            Some(plot_path)
        } else {
            None
        };

        Ok(FlareSpecOutputs {
            fits_path,
            plot_path,
        })
    }
}

/// Run the command line with `args`, returning the process exit code.
pub fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    let flarespec_ctx = match FlareSpecContext::from_args(args) {
        Ok(flarespec_ctx) => flarespec_ctx,
        Err(DryRun {}) => {
            info!("Dry run. No files will be written.");
            return 0;
        }
        Err(FlareSpecError::ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {}", e);
            return 1;
        }
    };

    match flarespec_ctx.run() {
        Ok(outputs) => {
            info!("wrote {}", outputs.fits_path.display());
            if let Some(plot_path) = outputs.plot_path {
                info!("wrote {}", plot_path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("flarespec failed: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod argparse_tests {
    use std::path::Path;

    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::{
        constants::SECONDS_PER_DAY,
        io::spec_fits::write_spec_fits,
        ndarray::{Array1, Array2},
    };

    /// A small spectrum with 4 channels and 20 one second samples.
    fn spec_file() -> (TempDir, String) {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("input.fits");
        let spec = Array2::from_shape_fn((4, 20), |(f, t)| {
            (f + 1) as f64 + if (10..15).contains(&t) { 10.0 } else { 0.0 }
        });
        let fghz = Array1::from(vec![1.0, 1.5, 2.0, 2.5]);
        let jd = Array1::from_shape_fn(20, |t| 2_459_580.5 + t as f64 / SECONDS_PER_DAY);
        write_spec_fits(&path, spec.view(), fghz.view(), jd.view()).unwrap();
        let path = path.to_str().unwrap().to_string();
        (tmp_dir, path)
    }

    #[test]
    fn test_parse_missing_input() {
        match FlareSpecContext::from_args(["flarespec", "--no-plot"]) {
            Err(FlareSpecError::ClapError(inner)) => assert!(matches!(
                inner.kind(),
                clap::error::ErrorKind::MissingRequiredArgument
            )),
            Err(e) => panic!("expected missing required argument error, not {}", e),
            Ok(_) => panic!("expected error, but got Ok(_)"),
        }
    }

    #[test]
    fn test_parse_nonexistent_input() {
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", "nonexistent.fits"]),
            Err(FlareSpecError::IOError(_))
        ));
    }

    #[test]
    fn test_parse_defaults() {
        let (_tmp_dir, path) = spec_file();
        let ctx = FlareSpecContext::from_args(["flarespec", path.as_str()]).unwrap();
        assert_eq!(ctx.spec_ctx.bg_window, Some(TimeWindow::new(100, 110)));
        assert_eq!(ctx.spec_ctx.bg2_window, None);
        assert_eq!(ctx.spec_ctx.notches_ghz, vec![1.742]);
        assert!(ctx.plot);
        assert!(ctx.spec_ctx.draw_progress);
        assert_eq!(ctx.out_dir, PathBuf::from("."));
        assert_eq!(ctx.input.spec.dim(), (4, 20));

        let display = format!("{}", &ctx);
        assert!(display.contains("eovsa.spec.flare_id_20220101000000.fits"));
        assert!(display.contains("eovsa.spec.flare_id_20220101000000.png"));
        assert!(display.contains("Will subtract the background in samples [100, 110)."));
    }

    #[test]
    fn test_parse_valid_options() {
        let (_tmp_dir, path) = spec_file();
        #[rustfmt::skip]
        let args = [
            "flarespec", path.as_str(),
            "--bg", "0", "5",
            "--bg2", "15", "20",
            "--notch", "1.5", "2.5",
            "--lc-chans", "1", "3",
            "--vmin", "0.5",
            "--vmax", "20",
            "--max-cadence", "2",
            "--tpk", "2022-01-01 00:00:12",
            "--name", "my flare",
            "--no-draw-progress",
        ];
        let ctx = FlareSpecContext::from_args(args).unwrap();
        assert_eq!(ctx.spec_ctx.bg_window, Some(TimeWindow::new(0, 5)));
        assert_eq!(ctx.spec_ctx.bg2_window, Some(TimeWindow::new(15, 20)));
        assert_eq!(ctx.spec_ctx.notches_ghz, vec![1.5, 2.5]);
        assert_eq!(ctx.spec_ctx.lc_chans, vec![1, 3]);
        assert_eq!(ctx.spec_ctx.vmin, 0.5);
        assert_eq!(ctx.spec_ctx.vmax, 20.0);
        assert_eq!(ctx.spec_ctx.max_cadence_s, 2.0);
        assert!(!ctx.spec_ctx.draw_progress);

        let display = format!("{}", &ctx);
        assert!(display.contains("eovsa.spec.flare_id_20220101000012.fits"));
        assert!(display.contains("my_flare.png"));
    }

    #[test]
    fn test_parse_no_bg_no_notch() {
        let (_tmp_dir, path) = spec_file();
        let ctx =
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--no-bg", "--no-notch"]).unwrap();
        assert_eq!(ctx.spec_ctx.bg_window, None);
        assert!(ctx.spec_ctx.notches_ghz.is_empty());
    }

    #[test]
    fn test_parse_invalid_window() {
        let (_tmp_dir, path) = spec_file();
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--bg", "5", "5"]),
            Err(FlareSpecError::CLIError(_))
        ));
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--bg2", "8", "2"]),
            Err(FlareSpecError::CLIError(_))
        ));
    }

    #[test]
    fn test_parse_invalid_lc_chans() {
        let (_tmp_dir, path) = spec_file();
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--lc-chans", "1", "4"]),
            Err(FlareSpecError::CLIError(_))
        ));
    }

    #[test]
    fn test_parse_invalid_scale() {
        let (_tmp_dir, path) = spec_file();
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--vmin", "0"]),
            Err(FlareSpecError::CLIError(_))
        ));
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--vmin", "20"]),
            Err(FlareSpecError::CLIError(_))
        ));
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--vmax", "lots"]),
            Err(FlareSpecError::ClapError(_))
        ));
    }

    #[test]
    fn test_parse_unrenderable_plot_name() {
        let (tmp_dir, path) = spec_file();
        let out_dir = tmp_dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();
        let out_dir_str = out_dir.to_str().unwrap();

        assert!(matches!(
            FlareSpecContext::from_args([
                "flarespec", path.as_str(), "--name", "flare.pdf", "-o", out_dir_str
            ]),
            Err(FlareSpecError::CLIError(_))
        ));
        assert_ne!(
            main_with_args(["flarespec", path.as_str(), "--name", "flare.pdf", "-o", out_dir_str]),
            0
        );
        // rejected before the spectrum was written
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);

        // fine when no plot is wanted
        assert!(FlareSpecContext::from_args([
            "flarespec", path.as_str(), "--name", "flare.pdf", "--no-plot"
        ])
        .is_ok());
    }

    #[test]
    fn test_parse_dry_run() {
        let (_tmp_dir, path) = spec_file();
        assert!(matches!(
            FlareSpecContext::from_args(["flarespec", path.as_str(), "--dry-run"]),
            Err(DryRun {})
        ));
    }

    #[test]
    fn test_run_writes_spectrum() {
        let (tmp_dir, path) = spec_file();
        let out_dir = tmp_dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();
        let out_dir_str = out_dir.to_str().unwrap();

        #[rustfmt::skip]
        let ctx = FlareSpecContext::from_args([
            "flarespec", path.as_str(),
            "--bg", "0", "5",
            "--no-plot",
            "-o", out_dir_str,
        ])
        .unwrap();
        let outputs = ctx.run().unwrap();
        assert_eq!(outputs.plot_path, None);
        assert_eq!(
            outputs.fits_path,
            out_dir.join("eovsa.spec.flare_id_20220101000000.fits")
        );

        let written = read_spec_fits(Path::new(&outputs.fits_path)).unwrap();
        // background removed, flare remains
        assert_eq!(written.spec[(2, 0)], 0.0);
        assert_eq!(written.spec[(2, 12)], 10.0);
    }

    #[test]
    fn main_with_version_succeeds() {
        assert_eq!(main_with_args(["flarespec", "--version"]), 0);
    }

    #[test]
    fn main_with_help_succeeds() {
        assert_eq!(main_with_args(["flarespec", "--help"]), 0);
    }

    #[test]
    fn main_with_dry_run_doesnt_crash() {
        let (_tmp_dir, path) = spec_file();
        assert_eq!(main_with_args(["flarespec", path.as_str(), "--dry-run"]), 0);
    }

    #[test]
    fn main_with_bad_arg_returns_1() {
        let (_tmp_dir, path) = spec_file();
        assert_ne!(main_with_args(["flarespec", path.as_str(), "--lc-chans", "99"]), 0);
    }
}
