//! promptrelay - a local security gateway for command-line AI tools
//!
//! A browser client sends prompts over loopback HTTP; promptrelay
//! authenticates them, rate-limits and circuit-breaks abusive callers,
//! screens and wraps the prompt, runs the configured CLI, and redacts the
//! output before returning it. Payloads may be AES-256-GCM encrypted under
//! a key derived from the shared bearer token.
//!
//! - [`security`]: the defense pipeline
//! - [`server`]: axum HTTP host
//! - [`relay`]: CLI runner
//! - [`config`] / [`paths`]: TOML configuration and XDG directories

pub mod cli;
pub mod config;
pub mod paths;
pub mod relay;
pub mod security;
pub mod server;

pub use config::Config;
