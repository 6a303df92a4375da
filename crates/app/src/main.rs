// CLI modules
mod args;
mod config;
mod discover;
mod op;
mod ops;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Publish, Version};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

command_enum! {
    (Publish, Publish),
    (Version, Version),
}

/// Install a compact stderr subscriber; RUST_LOG overrides `log_level`.
fn init_tracing(log_level: &str) -> WorkerGuard {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let log_level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
    guard
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guard = init_tracing(&args.log_level);

    let code = match op::OpContext::new(args.config) {
        Ok(ctx) => match args.command.execute(&ctx).await {
            Ok(output) => {
                println!("{}", output);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: Failed to load config: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}
