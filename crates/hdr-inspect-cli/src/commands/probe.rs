//! Pixel probe command.

use anyhow::{Result, bail};
use hdr_inspect::SessionConfig;

use super::{CompareArgs, load_request, start_session};

pub fn run(config: SessionConfig, args: &CompareArgs, x: i64, y: i64) -> Result<()> {
    let request = load_request(args)?;
    let size = request.image.size();
    if !size.contains(x, y) {
        bail!("Pixel ({x}, {y}) is outside the {size} image");
    }

    let session = start_session(config)?;
    let composite = session.composite(&request);
    for (channel, value) in composite.channels().iter().zip(composite.values_at(x, y)) {
        println!("{}: {}", channel.name(), value);
    }
    Ok(())
}
