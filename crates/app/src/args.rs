pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "s3pypi")]
#[command(about = "Publish Python packages to a bucket served as a static PyPI index")]
pub struct Args {
    /// Path to a TOML config file (defaults to ~/.s3pypi/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: crate::Command,
}
