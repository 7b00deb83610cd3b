pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use arrange_core::BatchSummary;
use arrange_core::error::Result;
use clap::Parser;

pub fn run() -> Result<BatchSummary> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Organize {
            entries,
            by,
            dest,
            created,
        } => handlers::handle_organize(&cli.run, entries, by.into(), dest, created),
        Commands::Encrypt { entries, password } => {
            handlers::handle_encrypt(&cli.run, entries, password)
        }
        Commands::Decrypt { entries, password } => {
            handlers::handle_decrypt(&cli.run, entries, password)
        }
    }
}
