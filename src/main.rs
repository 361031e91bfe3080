//! fire CLI entrypoint

use anyhow::Result;
use clap::Parser;

use fire::cli::Cli;

fn main() -> Result<()> {
    // Logging is set up by each command, since `run` takes its levels
    // from the process configuration
    let cli = Cli::parse();
    cli.execute()
}
