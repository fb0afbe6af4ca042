//! # hyperleaup command-line entry point
//!
//! ```bash
//! hyperleaup create --name sales --table sales=data/sales.csv \
//!     --sql "SELECT region, SUM(amount) AS total FROM sales GROUP BY region" --describe
//! hyperleaup inspect --path extracts/sales.parquet --limit 20
//! ```
//!
//! Set `RUST_LOG=debug` for detailed logs. Logs are also written to the
//! platform data directory (see [`hyperleaup::logging`]).

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use clap::Parser as _;

/// # Errors
///
/// Returns error if logging cannot be initialized or the command fails
fn main() -> Result<(), Box<dyn std::error::Error>> {
    hyperleaup::logging::init()?;

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run_command(cli.command) {
        tracing::error!("{e:#}");
        return Err(e.into());
    }
    Ok(())
}
