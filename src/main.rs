mod b64;
mod container;
mod convert;
mod detect;
mod encode;
mod error;
mod fetch;
mod input;
mod inspect;
mod node;
mod uri;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
  /// Log level used when RUST_LOG is unset (error, warn, info, debug, trace).
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch or read a subscription, decode its nodes and write them in another format.
  Convert(convert::Args),

  /// Print the detected format of a subscription.
  Detect(inspect::Args),

  /// Decode a subscription and output one JSON line per node (stdout JSONL).
  Parse(inspect::Args),

  /// List supported input and output formats.
  Formats,
}

fn init_tracing(level: &str) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .compact()
    .try_init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level);
  match cli.command {
    Commands::Convert(args) => convert::run(args).await,
    Commands::Detect(args) => inspect::run_detect(args).await,
    Commands::Parse(args) => inspect::run_parse(args).await,
    Commands::Formats => inspect::run_formats(),
  }
}
