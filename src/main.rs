use anyhow::Result;
use clap::Parser;

use promptrelay::cli::{self, Cli, Commands};
use promptrelay::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        Config::load_from(cli.config.as_deref())
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve(args) => cli::serve::run(args, config_path).await,
        Commands::Token(args) => cli::token::run(args, config_path),
        Commands::Check(args) => cli::check::run(args, config_path),
        Commands::Redact(args) => cli::redact::run(args, config_path),
        Commands::Config(args) => cli::config::run(args, config_path),
        Commands::Paths => cli::paths::run(),
    }
}
