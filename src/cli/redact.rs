use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::PathBuf;

use crate::config::Config;
use crate::security::{PolicyPatternSets, ResponseGuard};

#[derive(Args)]
pub struct RedactArgs {
    /// File to sanitize (reads stdin if omitted)
    pub file: Option<PathBuf>,
}

pub fn run(args: RedactArgs, config_path: Option<&str>) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let rules = PolicyPatternSets::builtin()?;
    let guard = ResponseGuard::new(config.guard.max_response_chars, &rules);

    let input = match args.file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    print!("{}", guard.sanitize(&input));
    Ok(())
}
