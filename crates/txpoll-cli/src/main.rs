mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{check::CheckArgs, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "txpoll",
    about = "Poll a payment status endpoint until a transaction is confirmed",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (missing file = built-in defaults)
    #[arg(long, global = true, env = "TXPOLL_CONFIG", default_value = "txpoll.yaml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at info level (RUST_LOG still takes precedence per target)
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one transaction until it is confirmed, times out, or fails
    Check(CheckArgs),

    /// Inspect and validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check(args) => cmd::check::run(&cli.config, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
