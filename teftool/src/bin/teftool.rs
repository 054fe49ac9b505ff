use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use std::path::PathBuf;
use teftool::config::{Config, OutputFormat};
use teftool::summary::Summary;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "teftool")]
#[command(about = "inspect and convert chrome trace event format files")]
#[command(version)]
struct Args {
    #[arg(short, long, global = true, help = "configuration file path (toml format)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a summary of a trace file.
    Stats {
        #[arg(help = "trace file, object or array form")]
        input: PathBuf,

        #[arg(long, help = "number of most frequent event names to list")]
        top: Option<usize>,
    },
    /// Decode a trace file and write it back out.
    Convert {
        #[arg(help = "trace file, object or array form")]
        input: PathBuf,

        #[arg(help = "output file")]
        output: PathBuf,

        #[arg(short, long, value_enum, help = "output wire shape")]
        format: Option<OutputFormat>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load config path={}", path.display()))?,
        None => Config::default(),
    };

    let filter = match (std::env::var_os(EnvFilter::DEFAULT_ENV), &config.log_filter) {
        (None, Some(directives)) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log_filter in config: {directives}"))?,
        _ => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Stats { input, top } => {
            let trace = teftool::read_trace(&input)?;
            let summary = Summary::new(&trace, top.unwrap_or(config.stats.top_names));
            print!("{summary}");
        }
        Command::Convert { input, output, format } => {
            let trace = teftool::read_trace(&input)?;
            let format = format.unwrap_or(config.convert.format);
            teftool::write_trace(&trace, &output, format)?;
        }
    }

    Ok(())
}
