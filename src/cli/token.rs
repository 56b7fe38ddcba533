//! CLI subcommand: `promptrelay token`
//!
//! The token is what the browser client pastes into its settings. Reading
//! it here also creates it, so the client can be configured before the
//! relay is first started.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Config;
use crate::security::TokenAuthority;

#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommands,
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Print the bearer token
    Show,

    /// Print the token file path
    Path,
}

pub fn run(args: TokenArgs, config_path: Option<&str>) -> Result<()> {
    let config = Config::load_from(config_path)?;

    match args.command {
        TokenCommands::Show => {
            let tokens = TokenAuthority::init(&config.paths.data_dir)?;
            println!("{}", tokens.token());
        }
        TokenCommands::Path => {
            println!("{}", config.paths.token_file().display());
        }
    }

    Ok(())
}
