//! textsink CLI: render length-prefixed JSON frames as text.
//!
//! # Commands
//! ```text
//! textsink render --input <path|-> --output <path|-> --format jsonl|yaml [--exit-on-fatal]
//! textsink encode --input <path|-> --output <path|->
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use textsink_observability::{init_tracing, LogConfig};

mod cmd_encode;
mod cmd_render;

#[derive(Parser)]
#[command(
    name = "textsink",
    about = "Render length-prefixed JSON frames as text",
    long_about = "
textsink reads a stream of frames (4-byte big-endian length + JSON payload),
renders each one through a bounded output queue, and writes the text to a
file or stdout. Logs go to stderr.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter, overrides --verbose (e.g. textsink_core=debug)
",
    version
)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render framed JSON records as text
    Render {
        /// Framed input file ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,
        /// Output file ("-" or "" for stdout); truncated if it exists
        #[arg(short, long, default_value = "-")]
        output: String,
        /// Text format
        #[arg(short, long, value_enum, default_value_t = cmd_render::TextFormat::Yaml)]
        format: cmd_render::TextFormat,
        /// Queue capacity (overrides the config file)
        #[arg(long)]
        capacity: Option<usize>,
        /// YAML sink config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Exit with status 1 as soon as rendering hits a fatal error
        #[arg(long)]
        exit_on_fatal: bool,
    },

    /// Turn newline-delimited JSON into length-prefixed frames
    Encode {
        /// NDJSON input file ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,
        /// Framed output file ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&LogConfig {
        level: if cli.verbose { "debug" } else { "warn" }.into(),
        json: cli.json_logs,
        ..LogConfig::default()
    });

    match cli.command {
        Commands::Render {
            input,
            output,
            format,
            capacity,
            config,
            exit_on_fatal,
        } => {
            cmd_render::run(cmd_render::RenderArgs {
                input,
                output,
                format,
                capacity,
                config,
                exit_on_fatal,
            })
            .await
        }
        Commands::Encode { input, output } => cmd_encode::run(&input, &output).await,
    }
}
