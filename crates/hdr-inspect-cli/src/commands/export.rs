//! Export command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use hdr_inspect::SessionConfig;
use hdr_inspect::session::sibling_path;

use super::{CompareArgs, DisplayArgs, load_request, start_session};

pub fn run(
    mut config: SessionConfig,
    args: &CompareArgs,
    display: &DisplayArgs,
    output: Option<PathBuf>,
) -> Result<()> {
    config.display = display.apply(config.display);
    let output = output.unwrap_or_else(|| sibling_path(&args.image, "-composite", "png"));

    let request = load_request(args)?;
    let session = start_session(config)?;
    session
        .save(&request, &output)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}
