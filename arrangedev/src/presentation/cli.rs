use arrange_core::OrganizeBy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "arrangedev CLI (alpha)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Parallel workers (clamped to 1..=8; defaults to the CPU count)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Replace each folder argument with the entries directly inside it
    #[arg(long, global = true)]
    pub expand_dirs: bool,

    /// Request cancellation after this many outcomes
    #[arg(long, global = true)]
    pub cancel_after: Option<usize>,

    /// Delete each source once its output is written
    #[arg(long, global = true)]
    pub remove_originals: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ByArg {
    Type,
    Date,
    Both,
}

impl From<ByArg> for OrganizeBy {
    fn from(b: ByArg) -> Self {
        match b {
            ByArg::Type => OrganizeBy::ByType,
            ByArg::Date => OrganizeBy::ByDate,
            ByArg::Both => OrganizeBy::Both,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy files into "Organized by Type" and/or "Organized by Date" folders
    Organize {
        #[arg(required = true)]
        entries: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = ByArg::Both)]
        by: ByArg,

        /// Destination root (defaults to the first entry's folder)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Group by creation time instead of modification time
        #[arg(long)]
        created: bool,
    },

    /// Encrypt files and folders next to their sources
    Encrypt {
        #[arg(required = true)]
        entries: Vec<PathBuf>,

        #[arg(long)]
        password: String,
    },

    /// Decrypt containers next to their sources
    Decrypt {
        #[arg(required = true)]
        entries: Vec<PathBuf>,

        #[arg(long)]
        password: String,
    },
}
