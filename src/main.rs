//! fibertrack CLI: grow streamlines through a synthetic field and write the accepted ones.

use anyhow::Result;
use clap::Parser;
use fibertrack::engine::arg_parser::Cli;
use fibertrack::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
