use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{Config, DEFAULT_CONFIG_TEMPLATE};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., guard.rate_limit.capacity)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., guard.violations.ban_secs)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Write the commented default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config_path: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(config_path, &format),
        ConfigCommands::Get { key } => {
            let config = Config::load_from(config_path)?;
            println!("{}", config.get_value(&key)?);
            Ok(())
        }
        ConfigCommands::Set { key, value } => set_config(config_path, &key, &value),
        ConfigCommands::Path => {
            println!("{}", Config::config_path(config_path)?.display());
            Ok(())
        }
        ConfigCommands::Init { force } => init_config(config_path, force),
    }
}

fn show_config(config_path: Option<&str>, format: &str) -> Result<()> {
    let config = Config::load_from(config_path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => println!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

fn set_config(config_path: Option<&str>, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_from(config_path)?;
    // Rejects values that would disable a guard before anything is written.
    config.set_value(key, value)?;
    config.save_to(&Config::config_path(config_path)?)?;
    println!("Set {} = {}", key, value);
    Ok(())
}

fn init_config(config_path: Option<&str>, force: bool) -> Result<()> {
    let path = Config::config_path(config_path)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;

    println!("Created config file at {}", path.display());
    Ok(())
}
