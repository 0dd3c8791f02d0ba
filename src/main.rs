//! lasbatch CLI: plan, confirm and process a directory of LAS files.

use anyhow::Result;
use clap::Parser;
use lasbatch::engine::arg_parser::Cli;
use lasbatch::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
