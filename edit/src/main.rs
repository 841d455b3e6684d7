//! A CLI tool for inspecting the data elements of a DICOM file
//! and overwriting textual tag values in place.
use clap::Parser;
use dcmedit::{ColorMode, DumpOptions, Session};
use dcmedit_core::Tag;
use snafu::{Report, Whatever};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, Level};

/// Exit code for when an error emerged while reading the DICOM file.
const ERROR_READ: i32 = -2;
/// Exit code for when an error emerged while printing the table.
const ERROR_PRINT: i32 = -3;
/// Exit code for when an error emerged while applying the edits.
const ERROR_PATCH: i32 = -4;

/// Inspect a DICOM file and edit tag values in place
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// The DICOM file to read
    file: PathBuf,
    /// Overwrite the value of a textual element
    /// (may be given multiple times)
    #[arg(short = 's', long = "set", value_name = "TAG=VALUE")]
    set: Vec<String>,
    /// Where to write the modified file
    #[arg(short = 'o', long = "output", default_value = "modified.dcm")]
    output: PathBuf,
    /// Do not print the tag table
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
    /// Print text values to the end
    /// (limited to `width` by default)
    #[arg(long = "no-text-limit")]
    no_text_limit: bool,
    /// The width of the display
    /// (default is to check automatically)
    #[arg(short = 'w', long = "width")]
    width: Option<u32>,
    /// The color mode
    #[arg(long = "color", default_value = "auto")]
    color: ColorMode,
    /// Verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    run().unwrap_or_else(|e| {
        eprintln!("{}", Report::from_error(e));
        std::process::exit(ERROR_READ);
    });
}

fn run() -> Result<(), Whatever> {
    let App {
        file,
        set,
        output,
        quiet,
        no_text_limit,
        width,
        color,
        verbose,
    } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!(
            "Could not set up global logger: {}",
            snafu::Report::from_error(e)
        );
    });

    // parse edits up front so a bad argument fails before any I/O
    let mut edits = Vec::with_capacity(set.len());
    for entry in &set {
        let (tag, value) = entry.split_once('=').unwrap_or_else(|| {
            eprintln!("Invalid edit `{}` (expected TAG=VALUE)", entry);
            std::process::exit(ERROR_PATCH);
        });
        let tag: Tag = tag.trim().parse().unwrap_or_else(|e| {
            eprintln!("Invalid edit `{}`: {}", entry, Report::from_error(e));
            std::process::exit(ERROR_PATCH);
        });
        edits.push((tag, value.to_string()));
    }

    let bytes = std::fs::read(&file).unwrap_or_else(|e| {
        eprintln!(
            "Could not read {}: {}",
            file.display(),
            Report::from_error(e)
        );
        std::process::exit(ERROR_READ);
    });

    let mut session = Session::new();
    if let Err(e) = session.load(bytes) {
        eprintln!("{}: {}", file.display(), Report::from_error(e));
        std::process::exit(ERROR_READ);
    }

    for (tag, value) in edits {
        if let Err(e) = session.edit(tag, value) {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_PATCH);
        }
    }

    if !quiet {
        let width = width
            .or_else(|| terminal_size::terminal_size().map(|(width, _)| width.0 as u32))
            .unwrap_or(120);
        let mut options = DumpOptions::new();
        options
            .no_text_limit(no_text_limit)
            .width(width)
            .color_mode(color);
        if let Err(ref e) = options.dump_rows(session.rows()) {
            if e.kind() != ErrorKind::BrokenPipe {
                eprintln!("[ERROR] {}", Report::from_error(e));
                std::process::exit(ERROR_PRINT);
            }
        }
    }

    if !set.is_empty() {
        let patched = session.export().unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_PATCH);
        });
        std::fs::write(&output, patched).unwrap_or_else(|e| {
            eprintln!(
                "Could not write {}: {}",
                output.display(),
                Report::from_error(e)
            );
            std::process::exit(ERROR_PATCH);
        });
        info!("Modified file written to {}", output.display());
    }

    Ok(())
}
