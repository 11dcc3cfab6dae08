use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use url::Url;

use crate::commands::ExitStatus;

mod commands;
mod logging;
mod requirements;

#[derive(Parser)]
#[command(author, version, about = "A fast, drop-in replacement for `pip install`")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install Python packages.
    Install(InstallArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Packages to install, as PEP 508 requirements.
    packages: Vec<String>,

    /// Install from the given requirements file.
    #[arg(long, short = 'r', value_name = "FILE")]
    requirements: Option<PathBuf>,

    /// Maximum number of concurrent downloads (default: logical CPU count).
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// The Python interpreter whose environment to install into.
    #[arg(long, default_value = "python3", value_name = "BIN")]
    python: String,

    /// Install into this directory instead of the detected site-packages.
    #[arg(long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// The base URL of the package index.
    #[arg(long, value_name = "URL")]
    index_url: Option<Url>,

    /// Skip dependencies; install only the named packages.
    #[arg(long)]
    no_deps: bool,

    /// Show the plan without downloading or installing.
    #[arg(long)]
    dry_run: bool,

    /// Avoid reading from or writing to the wheel cache.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::setup_logging(if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    });

    let result = match cli.command {
        Commands::Install(args) => commands::install(args).await,
    };

    match result {
        Ok(status) => status.into(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{}: {err:#}", "error".red().bold());
            }
            ExitStatus::Error.into()
        }
    }
}
