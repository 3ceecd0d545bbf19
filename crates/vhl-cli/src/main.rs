use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vhl_core::config::LabConfig;
use vhl_run::Lab;

use commands::{
    artifact::{self, ArtifactArgs},
    check::{self, CheckArgs},
    list::{self, ListArgs},
    results::{self, ResultsArgs},
    run::{self, RunArgs},
    runs,
    show::{self, ShowArgs},
    upload::{self, UploadArgs},
    version::{self, VersionArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "vhl", about = "Virtual Hardware Lab simulation orchestrator")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base directory for relative template and run directories.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List templates of one kind with their metadata.
    List(ListArgs),
    /// Print a template's raw content or metadata.
    Show(ShowArgs),
    /// Validate a template file without storing it.
    Check(CheckArgs),
    /// Validate and store a template file.
    Upload(UploadArgs),
    /// Render, merge and execute a simulation.
    Run(RunArgs),
    /// Print the manifest of a finished run.
    Results(ResultsArgs),
    /// Fetch one artifact of a run.
    Artifact(ArtifactArgs),
    /// List recorded run ids.
    Runs,
    /// Print the lab and simulator versions.
    Version(VersionArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => LabConfig::load(path)?,
        None => LabConfig::default(),
    };
    let lab = Lab::open(config.rooted(&cli.root))?;

    match cli.command {
        Command::List(args) => list::run(&lab, &args),
        Command::Show(args) => show::run(&lab, &args),
        Command::Check(args) => check::run(&lab, &args).await,
        Command::Upload(args) => upload::run(&lab, &args).await,
        Command::Run(args) => run::run(&lab, &args).await,
        Command::Results(args) => results::run(&lab, &args),
        Command::Artifact(args) => artifact::run(&lab, &args),
        Command::Runs => runs::run(&lab),
        Command::Version(args) => version::run(&lab, &args).await,
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
