use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use quire_fs::Encoding;

#[derive(Parser, Debug)]
#[command(name = "quire", version, about = "Load, inspect and convert text files")]
pub struct Cli {
    /// Increase logging verbosity (repeat for more detail)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Save logs to a specific file
    #[arg(long = "log", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Load configuration from a specific file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a file decoded to UTF-8
    Cat {
        file: PathBuf,
        /// Charset of the file instead of auto-detection
        #[arg(short, long, value_name = "CHARSET", value_parser = parse_encoding)]
        encoding: Option<Encoding>,
    },
    /// Show what loading a file detects
    Info { file: PathBuf },
    /// Re-encode a file
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Target charset
        #[arg(long, value_name = "CHARSET", value_parser = parse_encoding)]
        to: Encoding,
        /// Charset of the input instead of auto-detection
        #[arg(long, value_name = "CHARSET", value_parser = parse_encoding)]
        from: Option<Encoding>,
        /// Keep the previous content of OUTPUT as a backup
        #[arg(long)]
        keep_backup: bool,
    },
    /// Write the default configuration to a file
    InitConfig { path: PathBuf },
}

fn parse_encoding(label: &str) -> Result<Encoding> {
    Encoding::for_label(label).with_context(|| format!("unknown charset {label:?}"))
}
