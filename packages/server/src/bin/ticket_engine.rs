//! Process entry point: parses CLI flags, opens the on-disk engine, then
//! drives a synchronous read-dispatch-print loop over stdin.

use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ticket_server::{CliArgs, Dispatcher, Engine};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.default_log_filter())),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!(
        data_dir = %args.data_dir.display(),
        index_cache_size = args.index_cache_size,
        leaf_cache_size = args.leaf_cache_size,
        "starting ticket-engine"
    );

    let mut engine = Engine::open(&args.data_dir, args.index_cache_size, args.leaf_cache_size)?;
    let dispatcher = Dispatcher::new();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (response, should_exit) = dispatcher.execute(&mut engine, &line)?;
        writeln!(out, "{response}")?;
        out.flush()?;
        if should_exit {
            break;
        }
    }

    engine.flush()?;
    tracing::info!("ticket-engine shut down cleanly");
    Ok(())
}
