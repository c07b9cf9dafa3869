#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use esverify_verify::{
    solve_all, verification_conditions_with, HttpSolver, ProcessSolver, Solver, Status,
    VerificationCondition,
};
use miette::{IntoDiagnostic, NamedSource};
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::{Overrides, Settings};
use report::{LogFormat, VerifyReport};

#[derive(Parser, Debug)]
#[command(
    name = "esverify",
    version,
    disable_version_flag = true,
    about = "Static verifier for annotated JavaScript"
)]
struct Cli {
    /// Input file, or `-` for standard input
    file: String,

    /// Output format of the result lines
    #[arg(short = 'f', long = "logformat", value_enum, default_value_t = LogFormat::Colored)]
    logformat: LogFormat,

    /// Path to a local z3 executable
    #[arg(long = "z3path", env = "ESVERIFY_Z3PATH")]
    z3path: Option<String>,

    /// Send scripts to a remote z3 over HTTP
    #[arg(short = 'r', long)]
    remote: bool,

    /// URL of the remote z3 endpoint
    #[arg(long = "z3url", env = "ESVERIFY_Z3URL")]
    z3url: Option<String>,

    /// Suppress all output
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Also print the conditions that verified
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Write a JSON report of every condition to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_tracing(cli.quiet);
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Returns whether every condition was verified.
fn run(cli: &Cli) -> miette::Result<bool> {
    let input = (cli.file != "-").then(|| PathBuf::from(&cli.file));
    let cwd = std::env::current_dir().into_diagnostic()?;
    let file = match config::find_config(input.as_deref(), &cwd) {
        Some(path) => {
            let parsed = config::load_config(&path)?;
            Some((path, parsed))
        }
        None => None,
    };
    let settings = Settings::resolve(
        file,
        &Overrides {
            z3path: cli.z3path.clone(),
            z3url: cli.z3url.clone(),
            remote: cli.remote,
        },
    )?;
    if let Some(path) = &settings.config_path {
        tracing::debug!(config = %path.display(), "loaded settings");
    }

    let name = input
        .as_deref()
        .map(display_path)
        .unwrap_or_else(|| "<stdin>".to_string());
    let src = read_input(input.as_deref())?;

    let mut vcs = match verification_conditions_with(&src, &settings.verify_options()) {
        Ok(vcs) => vcs,
        Err(e) => {
            if let Some(out) = &cli.report {
                let _ = VerifyReport::failed(&name, e.to_string()).write(out);
            }
            let source = NamedSource::new(name, src);
            return Err(miette::Report::new(e).with_source_code(source));
        }
    };
    tracing::info!(count = vcs.len(), input = %name, "generated verification conditions");

    let solver = make_solver(&settings)?;
    solve_all(&mut vcs, solver.as_ref(), settings.parallel);

    if !cli.quiet {
        print_results(&vcs, cli.logformat, cli.verbose);
    }
    if let Some(out) = &cli.report {
        VerifyReport::new(&name, &vcs).write(out)?;
    }
    Ok(report::all_verified(&vcs))
}

fn make_solver(settings: &Settings) -> miette::Result<Box<dyn Solver>> {
    match (&settings.z3url, settings.remote) {
        (Some(url), true) => Ok(Box::new(HttpSolver::new(url.clone(), settings.timeout)?)),
        _ => Ok(Box::new(ProcessSolver::new(
            settings.z3path.clone(),
            settings.timeout,
        ))),
    }
}

fn read_input(path: Option<&Path>) -> miette::Result<String> {
    match path {
        Some(p) => fs::read_to_string(p)
            .map_err(|e| miette::miette!("failed to read {}: {e}", p.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).into_diagnostic()?;
            Ok(buf)
        }
    }
}

/// Prints the conditions that did not verify, and with `verbose` the rest.
fn print_results(vcs: &[VerificationCondition], format: LogFormat, verbose: bool) {
    for vc in vcs {
        if verbose || vc.result().status != Status::Verified {
            println!("{}", report::render_line(vc, format));
        }
        vc.debug_out();
    }
}

fn display_path(p: &Path) -> String {
    p.to_string_lossy().to_string()
}
