//! Error taxonomy for the request pipeline.
//!
//! Every rejection is terminal for the request that caused it. Nothing
//! here is fatal to the host process.

use std::time::Duration;

/// Reasons [`PromptGuard`](super::PromptGuard) refuses a prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    /// Raw prompt exceeds the configured maximum (measured before normalization).
    #[error("Prompt too long: {length} characters (maximum {max})")]
    TooLong { length: usize, max: usize },

    #[error("Prompt rejected: shell command pattern detected ({rule})")]
    ShellPattern { rule: &'static str },

    #[error("Prompt rejected: instruction override pattern detected ({rule})")]
    InjectionPattern { rule: &'static str },

    #[error("Prompt rejected: internal network address detected ({rule})")]
    SsrfPattern { rule: &'static str },
}

impl PolicyViolation {
    /// Stable machine-readable subtype.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyViolation::TooLong { .. } => "too_long",
            PolicyViolation::ShellPattern { .. } => "shell_pattern",
            PolicyViolation::InjectionPattern { .. } => "injection_pattern",
            PolicyViolation::SsrfPattern { .. } => "ssrf_pattern",
        }
    }
}

/// Failures of the payload encryption layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// Tag verification failed, or the envelope was malformed. No plaintext
    /// is ever returned alongside this error.
    #[error("Encrypted payload failed integrity check")]
    Integrity,

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Encryption failed: {0}")]
    Encryption(&'static str),
}

/// Caller-visible outcome of a rejected request.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Sustained abuse tripped the circuit breaker. Checked before anything else.
    #[error("Client temporarily banned; retry in {}s", hint_secs(.retry_after))]
    Banned { retry_after: Duration },

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Rate limit exceeded; retry in {}s", hint_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("Encrypted payload failed integrity check")]
    Integrity,

    #[error("Payload encryption unavailable: {0}")]
    Crypto(CipherError),
}

impl From<CipherError> for GuardError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Integrity => GuardError::Integrity,
            other => GuardError::Crypto(other),
        }
    }
}

impl GuardError {
    /// Stable machine-readable error code for transport framing.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Banned { .. } => "banned",
            GuardError::Unauthorized => "unauthorized",
            GuardError::RateLimited { .. } => "rate_limited",
            GuardError::Policy(_) => "policy_violation",
            GuardError::Integrity => "integrity_error",
            GuardError::Crypto(_) => "crypto_error",
        }
    }

    /// Retry hint, if the rejection is temporary.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GuardError::Banned { retry_after } | GuardError::RateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Whether this rejection feeds the violation tracker.
    ///
    /// Rate limiting is expected load, not abuse, and integrity failures
    /// come from already-authenticated callers.
    pub fn counts_as_violation(&self) -> bool {
        matches!(self, GuardError::Unauthorized | GuardError::Policy(_))
    }
}

fn hint_secs(duration: &Duration) -> u64 {
    ceil_secs(*duration)
}

/// Whole seconds, rounded up, never below one.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
