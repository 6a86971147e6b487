//! Command-line arguments.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use headless_core::{DebugFlag, DebugFlags, DebugParseError, SessionOptions};

const FALLBACK_NAME: &str = "headless-host";

#[derive(Debug, Parser)]
#[command(name = "headless-host")]
#[command(about = "Run an audio session without a user interface")]
#[command(version, disable_version_flag = true)]
pub struct Args {
    /// Session directory
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Snapshot to load from DIR
    #[arg(value_name = "SNAPSHOT_NAME")]
    pub snapshot: Option<String>,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Client name used for the engine and its ports
    #[arg(short = 'c', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Bypass all plugins in the session
    #[arg(short = 'B', long = "bypass-plugins")]
    pub bypass_plugins: bool,

    /// Disable all plugins in the session
    #[arg(short = 'd', long = "disable-plugins")]
    pub disable_plugins: bool,

    /// Debug flags, comma separated ("list" shows them)
    #[arg(short = 'D', long = "debug", value_name = "OPTS")]
    pub debug: Option<String>,

    /// Do not use hardware floating point optimizations
    #[arg(short = 'O', long = "no-hw-optimizations")]
    pub no_hw_optimizations: bool,

    /// Do not restore port connections from the session
    #[arg(short = 'P', long = "no-connect-ports")]
    pub no_connect_ports: bool,

    /// Disable VST support (accepted for compatibility)
    #[arg(short = 'V', long = "novst")]
    pub novst: bool,

    /// Config file (default: ~/.headless-host/config.yaml)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Engine backend, overriding the config file
    #[arg(long = "backend", value_name = "NAME")]
    pub backend: Option<String>,
}

/// A validated invocation: both positionals are present.
#[derive(Debug)]
pub struct Invocation {
    pub args: Args,
    pub dir: PathBuf,
    pub snapshot: String,
    pub client_name: String,
    pub debug: DebugFlags,
}

impl Invocation {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            bypass_plugins: self.args.bypass_plugins,
            disable_plugins: self.args.disable_plugins,
            connect_ports: !self.args.no_connect_ports,
        }
    }
}

/// Parse `argv`. On `Err` the caller exits with the returned code; help,
/// version, `-D list` and usage errors have already been printed.
///
/// `-D` is handled before the positionals are checked, so `-D list` works
/// on its own.
pub fn parse<I, T>(argv: I) -> Result<Invocation, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();

    let args = match Args::try_parse_from(&argv) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Err(match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            });
        }
    };

    if args.version {
        println!("{} {}", FALLBACK_NAME, env!("CARGO_PKG_VERSION"));
        return Err(ExitCode::SUCCESS);
    }

    let debug = match args.debug.as_deref().map(DebugFlags::parse) {
        None => DebugFlags::default(),
        Some(Ok(flags)) => flags,
        Some(Err(DebugParseError::ListRequested)) => {
            print!("{}", DebugFlag::describe_all());
            return Err(ExitCode::FAILURE);
        }
        Some(Err(e)) => {
            eprintln!("{}: {}", FALLBACK_NAME, e);
            return Err(ExitCode::FAILURE);
        }
    };

    let (Some(dir), Some(snapshot)) = (args.dir.clone(), args.snapshot.clone()) else {
        let _ = Args::command().print_help();
        return Err(ExitCode::FAILURE);
    };

    let client_name = args
        .name
        .clone()
        .unwrap_or_else(|| program_name(argv.first().map(Path::new)));

    Ok(Invocation {
        args,
        dir,
        snapshot,
        client_name,
        debug,
    })
}

/// Lowercased file stem of argv[0].
fn program_name(argv0: Option<&Path>) -> String {
    argv0
        .and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}
