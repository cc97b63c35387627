//! Gatelink CLI entry point.

use clap::Parser;
use gatelink_cli::{run, Cli};
use gatelink_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging(&cli);

    // Run the command
    run(cli).await
}

fn init_logging(cli: &Cli) {
    // A broken config file is reported by the command itself.
    let logging = Config::resolve(cli.global.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();

    let level = match cli.global.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gatelink={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
