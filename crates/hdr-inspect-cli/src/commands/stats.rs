//! Statistics command.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use hdr_inspect::{CropRegion, SessionConfig, Statistics};
use serde::Serialize;

use super::{CompareArgs, load_request, start_session};

/// Interval between progress polls on a running computation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// JSON output of the stats command.
#[derive(Serialize)]
struct StatsReport<'a> {
    image: String,
    reference: Option<String>,
    group: &'a str,
    metric: String,
    post_processing: String,
    crop: Option<CropRegion>,
    statistics: &'a Statistics,
}

pub fn run(
    config: SessionConfig,
    args: &CompareArgs,
    crop: Option<CropRegion>,
    json: bool,
    histogram: Option<PathBuf>,
) -> Result<()> {
    let request = load_request(args)?;
    let session = start_session(config)?;

    let start = Instant::now();
    let handle = session.statistics(&request, crop);
    let statistics = loop {
        if let Some(statistics) = handle.try_get() {
            break statistics;
        }
        tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "waiting for statistics");
        std::thread::sleep(POLL_INTERVAL);
    };

    if json {
        let report = StatsReport {
            image: args.image.display().to_string(),
            reference: args.reference.as_ref().map(|p| p.display().to_string()),
            group: &args.group,
            metric: args.metric.to_string(),
            post_processing: args.post_processing.to_string(),
            crop,
            statistics: &statistics,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&statistics);
    }

    if let Some(path) = histogram {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        statistics
            .write_histogram_csv(BufWriter::new(file))
            .with_context(|| format!("Failed to write histogram to {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote histogram");
    }

    Ok(())
}

fn print_summary(statistics: &Statistics) {
    let region = statistics.region;
    println!(
        "Region: ({}, {}) - ({}, {}), {} valid samples",
        region.x0, region.y0, region.x1, region.y1, statistics.sample_count
    );
    println!("Channels: {}", statistics.channels.join(", "));
    println!("{:-<40}", "");
    println!("Mean:    {:.6}", statistics.mean);
    println!("Minimum: {:.6}", statistics.minimum);
    println!("Maximum: {:.6}", statistics.maximum);

    if statistics.histogram.is_empty() {
        return;
    }

    // Coarse view: 400 bins folded into 20 rows of the channel-summed density.
    println!();
    println!("Histogram (zero at bin {}):", statistics.histogram_zero_bin);
    let bins = statistics.histogram.bins();
    let rows = 20;
    let per_row = bins / rows;
    let sums: Vec<f32> = (0..rows)
        .map(|r| {
            (r * per_row..(r + 1) * per_row)
                .map(|bin| statistics.histogram.row(bin).iter().sum::<f32>())
                .sum()
        })
        .collect();
    let peak = sums.iter().copied().fold(0.0f32, f32::max);
    for (r, sum) in sums.iter().enumerate() {
        let width = if peak > 0.0 { (sum / peak * 50.0).round() as usize } else { 0 };
        println!("{:>4} |{}", r * per_row, "#".repeat(width));
    }
}
