pub mod check;
pub mod config;
pub mod paths;
pub mod redact;
pub mod serve;
pub mod token;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "promptrelay")]
#[command(
    author,
    version,
    about = "Local security gateway between a browser client and command-line AI tools"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "PROMPTRELAY_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP relay
    Serve(serve::ServeArgs),

    /// Show the bearer token shared with the client
    Token(token::TokenArgs),

    /// Run the prompt guard on a prompt without relaying it
    Check(check::CheckArgs),

    /// Run the response guard over a file or stdin
    Redact(redact::RedactArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}
