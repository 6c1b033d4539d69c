use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use dtbgen::{logger::StderrLogger, Config, GeometryMode};
use log::{error, info, LevelFilter};

/// Generate the early boot tables header from a device tree blob.
#[derive(Parser, Debug)]
#[command(name = "dtbgen", about, version)]
struct Cli {
    #[arg(short, long, help = "Flattened device tree blob to read")]
    input: PathBuf,

    #[arg(short, long, help = "Header to generate")]
    output: PathBuf,

    #[arg(
        long,
        value_enum,
        default_value_t = GeometryMode::Scoped,
        help = "Take `reg` cell widths from the nearest ancestor (scoped) or from the root only"
    )]
    geometry: GeometryMode,

    #[arg(
        long,
        help = "Fail on cell decoding errors in optional tables instead of emitting them empty"
    )]
    strict: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Log more, repeat for more detail")]
    verbose: u8,

    #[arg(short, long, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = StderrLogger::install(cli.level()) {
        eprintln!("failed to install logger: {err}");
        process::exit(1);
    }

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let blob = fs::read(&cli.input)
        .with_context(|| format!("failed to read `{}`", cli.input.display()))?;

    let config = Config {
        geometry: cli.geometry,
        strict: cli.strict,
    };
    let header = dtbgen::compile(&blob, &config)
        .with_context(|| format!("failed to compile `{}`", cli.input.display()))?;

    write_atomically(&cli.output, &header)?;
    info!("wrote `{}`", cli.output.display());

    Ok(())
}

/// Write `contents` next to `path` first and rename it into place, so
/// `path` either keeps its old contents or gets the complete new ones.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = temp_path(path);

    fs::write(&tmp, contents)
        .with_context(|| format!("failed to write `{}`", tmp.display()))?;

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("failed to create `{}`", path.display()));
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("dtb"));
    name.push(".tmp");
    path.with_file_name(name)
}
