use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Limits consumed by the security pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum prompt length in characters, measured before normalization
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Maximum response length in characters before truncation
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub violations: ViolationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Token bucket capacity (burst size)
    #[serde(default = "default_rate_capacity")]
    pub capacity: u32,

    /// One token is credited per interval
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationConfig {
    /// Violations inside the window that trigger a ban
    #[serde(default = "default_violation_threshold")]
    pub threshold: usize,

    #[serde(default = "default_violation_window")]
    pub window_secs: u64,

    #[serde(default = "default_ban_secs")]
    pub ban_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// CLI executable that receives the wrapped prompt
    #[serde(default = "default_relay_command")]
    pub command: String,

    /// Arguments placed before the prompt
    #[serde(default = "default_relay_args")]
    pub args: Vec<String>,

    /// Kill the CLI after this many seconds
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_port() -> u16 {
    31330
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_max_prompt_chars() -> usize {
    10_000
}
fn default_max_response_chars() -> usize {
    100_000
}
fn default_rate_capacity() -> u32 {
    30
}
fn default_refill_interval_ms() -> u64 {
    2_000 // 30 requests per minute sustained
}
fn default_violation_threshold() -> usize {
    5
}
fn default_violation_window() -> u64 {
    60
}
fn default_ban_secs() -> u64 {
    900 // 15 minutes
}
fn default_relay_command() -> String {
    "claude".to_string()
}
fn default_relay_args() -> Vec<String> {
    vec!["-p".to_string()]
}
fn default_relay_timeout() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            max_response_chars: default_max_response_chars(),
            rate_limit: RateLimitConfig::default(),
            violations: ViolationConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_interval_ms: default_refill_interval_ms(),
        }
    }
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            threshold: default_violation_threshold(),
            window_secs: default_violation_window(),
            ban_secs: default_ban_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command: default_relay_command(),
            args: default_relay_args(),
            timeout_secs: default_relay_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GuardConfig {
    /// Reject limits that would disable a guard outright.
    pub fn validate(&self) -> Result<()> {
        if self.max_prompt_chars == 0 {
            anyhow::bail!("guard.max_prompt_chars must be greater than 0");
        }
        if self.max_response_chars == 0 {
            anyhow::bail!("guard.max_response_chars must be greater than 0");
        }
        if self.rate_limit.capacity == 0 {
            anyhow::bail!("guard.rate_limit.capacity must be greater than 0");
        }
        if self.rate_limit.refill_interval_ms == 0 {
            anyhow::bail!("guard.rate_limit.refill_interval_ms must be greater than 0");
        }
        if self.violations.threshold == 0 {
            anyhow::bail!("guard.violations.threshold must be greater than 0");
        }
        if self.violations.window_secs == 0 {
            anyhow::bail!("guard.violations.window_secs must be greater than 0");
        }
        if self.violations.ban_secs == 0 {
            anyhow::bail!("guard.violations.ban_secs must be greater than 0");
        }
        Ok(())
    }
}

impl Config {
    /// Load from an explicit file, or from the default location.
    ///
    /// The default file is created from a commented template on first run.
    /// An explicit file must already exist.
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let paths = Paths::resolve()?;
        paths.ensure_dirs()?;

        let path = match path {
            Some(_) => {
                let explicit = Self::config_path(path)?;
                if !explicit.exists() {
                    anyhow::bail!("Config file not found: {}", explicit.display());
                }
                explicit
            }
            None => {
                let default_path = paths.config_file();
                if !default_path.exists() {
                    let config = Config {
                        paths,
                        ..Config::default()
                    };
                    config.save_with_template()?;
                    return Ok(config);
                }
                default_path
            }
        };

        let mut config = Self::parse_file(&path)?;
        config.paths = paths;
        config.expand_env_vars();
        config.guard.validate()?;

        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        // Create parent directories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    /// The explicit file if given (tilde-expanded), otherwise the default.
    pub fn config_path(explicit: Option<&str>) -> Result<PathBuf> {
        match explicit {
            Some(p) => Ok(PathBuf::from(shellexpand::tilde(p).to_string())),
            None => Ok(Paths::resolve()?.config_file()),
        }
    }

    fn expand_env_vars(&mut self) {
        self.relay.command = expand_env(&self.relay.command);
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["guard", "max_prompt_chars"] => Ok(self.guard.max_prompt_chars.to_string()),
            ["guard", "max_response_chars"] => Ok(self.guard.max_response_chars.to_string()),
            ["guard", "rate_limit", "capacity"] => Ok(self.guard.rate_limit.capacity.to_string()),
            ["guard", "rate_limit", "refill_interval_ms"] => {
                Ok(self.guard.rate_limit.refill_interval_ms.to_string())
            }
            ["guard", "violations", "threshold"] => {
                Ok(self.guard.violations.threshold.to_string())
            }
            ["guard", "violations", "window_secs"] => {
                Ok(self.guard.violations.window_secs.to_string())
            }
            ["guard", "violations", "ban_secs"] => Ok(self.guard.violations.ban_secs.to_string()),
            ["relay", "command"] => Ok(self.relay.command.clone()),
            ["relay", "timeout_secs"] => Ok(self.relay.timeout_secs.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["guard", "max_prompt_chars"] => self.guard.max_prompt_chars = value.parse()?,
            ["guard", "max_response_chars"] => self.guard.max_response_chars = value.parse()?,
            ["guard", "rate_limit", "capacity"] => self.guard.rate_limit.capacity = value.parse()?,
            ["guard", "rate_limit", "refill_interval_ms"] => {
                self.guard.rate_limit.refill_interval_ms = value.parse()?
            }
            ["guard", "violations", "threshold"] => {
                self.guard.violations.threshold = value.parse()?
            }
            ["guard", "violations", "window_secs"] => {
                self.guard.violations.window_secs = value.parse()?
            }
            ["guard", "violations", "ban_secs"] => self.guard.violations.ban_secs = value.parse()?,
            ["relay", "command"] => self.relay.command = value.to_string(),
            ["relay", "timeout_secs"] => self.relay.timeout_secs = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        self.guard.validate()
    }
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub(crate) const DEFAULT_CONFIG_TEMPLATE: &str = r#"# promptrelay Configuration
# Auto-created on first run. Edit as needed.

[server]
# Loopback only. The browser client talks to this address.
port = 31330
bind = "127.0.0.1"

[guard]
max_prompt_chars = 10000      # measured before normalization
max_response_chars = 100000   # longer output is truncated, then redacted

[guard.rate_limit]
capacity = 30                 # burst size
refill_interval_ms = 2000     # one request credited every 2s

[guard.violations]
threshold = 5                 # auth failures / policy violations ...
window_secs = 60              # ... inside this window ...
ban_secs = 900                # ... ban all requests for this long

[relay]
# CLI that receives the policy-wrapped prompt as its last argument.
# May reference an environment variable: command = "${CLAUDE_BIN}"
command = "claude"
args = ["-p"]
timeout_secs = 120

[logging]
level = "info"
"#;
