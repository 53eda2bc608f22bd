//! hdr-inspect CLI - HDR image comparison tool

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{CompareArgs, DisplayArgs};

/// Compare high-dynamic-range images and inspect the differences.
#[derive(Parser, Debug)]
#[command(name = "hdr-inspect")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Session configuration file (JSON)
    #[arg(long, global = true, env = "HDR_INSPECT_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (defaults to the available parallelism)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print mean, minimum, maximum and the histogram of a comparison
    Stats {
        #[command(flatten)]
        compare: CompareArgs,

        /// Restrict statistics to the rectangle between two corners: x0,y0,x1,y1
        #[arg(long, value_parser = commands::parse_crop)]
        crop: Option<hdr_inspect::CropRegion>,

        /// Print the full statistics as JSON
        #[arg(long)]
        json: bool,

        /// Write the histogram to a CSV file
        #[arg(long)]
        histogram: Option<PathBuf>,
    },

    /// Save the composite as PFM (float) or PNG (tonemapped)
    Export {
        #[command(flatten)]
        compare: CompareArgs,

        #[command(flatten)]
        display: DisplayArgs,

        /// Output file; the extension selects the format
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print every composite channel's value at one pixel
    Probe {
        #[command(flatten)]
        compare: CompareArgs,

        /// Pixel column
        #[arg(short, long)]
        x: i64,

        /// Pixel row
        #[arg(short, long)]
        y: i64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    tracing::debug!("hdr-inspect v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref(), cli.threads)?;

    match cli.command {
        Commands::Stats {
            compare,
            crop,
            json,
            histogram,
        } => commands::stats::run(config, &compare, crop, json, histogram),
        Commands::Export {
            compare,
            display,
            output,
        } => commands::export::run(config, &compare, &display, output),
        Commands::Probe { compare, x, y } => commands::probe::run(config, &compare, x, y),
    }
}
