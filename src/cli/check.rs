use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::security::{PolicyPatternSets, PromptGuard};

#[derive(Args)]
pub struct CheckArgs {
    /// Prompt text to validate
    pub prompt: String,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn run(args: CheckArgs, config_path: Option<&str>) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let rules = PolicyPatternSets::builtin()?;
    let guard = PromptGuard::new(config.guard.max_prompt_chars, &rules);

    let result = guard.wrap(&args.prompt);

    if args.format == "json" {
        let json = match &result {
            Ok(wrapped) => serde_json::json!({ "allowed": true, "wrapped": wrapped }),
            Err(violation) => serde_json::json!({
                "allowed": false,
                "kind": violation.kind(),
                "reason": violation.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        if result.is_err() {
            anyhow::bail!("Prompt rejected");
        }
        return Ok(());
    }

    match result {
        Ok(wrapped) => {
            println!("{}", wrapped);
            Ok(())
        }
        Err(violation) => anyhow::bail!("Rejected ({}): {}", violation.kind(), violation),
    }
}
