//! # promptrelay Security Module
//!
//! Central security module for promptrelay. This file is the **front door**
//! for security auditing: all security-critical types, constants, and
//! functions are re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                promptrelay.rs (you are here)                     │
//! │                Public API facade & documentation                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  context.rs - SecurityContext: one per process, one mutex        │
//! ├──────────────┬───────────────┬───────────────┬───────────────────┤
//! │  token.rs    │ admission.rs  │ violations.rs │ prompt_guard.rs   │
//! │  Bearer      │ Token bucket  │ Sliding-window│ Normalize, match, │
//! │  credential  │ rate limiter  │ ban breaker   │ wrap in policy    │
//! ├──────────────┼───────────────┼───────────────┼───────────────────┤
//! │  kdf.rs      │ cipher.rs     │ rules.rs      │ response_guard.rs │
//! │  HKDF-SHA256 │ AES-256-GCM   │ Versioned     │ Truncate, redact, │
//! │  payload key │ envelopes     │ rule tables   │ mask home dir     │
//! └──────────────┴───────────────┴───────────────┴───────────────────┘
//! ```
//!
//! ## Request Pipeline
//!
//! ```text
//! ban check → token validation → token bucket
//!     → [decrypt envelope] → PromptGuard::wrap → CLI
//!     → ResponseGuard::sanitize → [encrypt envelope] → client
//! ```
//!
//! Auth failures and policy violations are recorded by the violation
//! tracker. Rate-limit rejections and integrity failures are not.
//!
//! ## Security Model
//!
//! 1. **Single credential**: One random bearer token per installation,
//!    stored 0600 in the data directory and rewritten on every start.
//!
//! 2. **Fail closed**: Every check rejects on doubt. A failed envelope
//!    never yields partial plaintext; a rejected prompt never reaches
//!    the CLI.
//!
//! 3. **Escalation**: Repeated abuse inside a sliding window becomes a
//!    blanket temporary ban, checked before anything else.
//!
//! 4. **Policy isolation**: User text is normalized, filtered, and placed
//!    in a delimited section after an immutable policy preamble.
//!
//! 5. **Output hygiene**: Responses are bounded, secret-shaped strings
//!    are replaced with tagged markers, and the home directory is masked.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use promptrelay::security::{SecurityContext, PromptPayload};
//!
//! let ctx = SecurityContext::new(&config.guard, &config.paths.data_dir)?;
//!
//! ctx.admit(bearer)?;
//! let opened = ctx.open_prompt(&payload)?;
//! let output = runner.run(&opened.wrapped).await?;
//! let reply = ctx.seal_response(&output, opened.encrypted)?;
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense Layer |
//! |--------|--------------|
//! | Unauthenticated caller | Bearer token, violation tracker |
//! | Request flooding | Token bucket |
//! | Credential guessing | Ban after repeated auth failures |
//! | Shell metacharacters in prompt | Shell rule table |
//! | "Ignore previous instructions" | Injection rule table + preamble |
//! | Prompt asks CLI to hit internal hosts | SSRF rule table |
//! | Zero-width / bidi smuggling | Invisible-character strip + NFKC |
//! | CLI echoes API keys or paths | Secret rule table + home masking |
//! | Payload tampering in transit | AES-256-GCM tag verification |
//!
//! Anyone holding the bearer token can derive the payload key. That is
//! accepted: the token is the trust boundary.

// ── Errors ──────────────────────────────────────────────────────────

pub use super::error::{CipherError, GuardError, PolicyViolation, ceil_secs};

// ── Request Pipeline ────────────────────────────────────────────────

pub use super::context::{
    GuardStatus, OpenedPrompt, PromptPayload, ResponsePayload, SecurityContext,
};

// ── Credential ──────────────────────────────────────────────────────

pub use super::token::{TOKEN_FILENAME, TokenAuthority, token_file_path};

// ── Admission & Circuit Breaking ────────────────────────────────────

pub use super::admission::AdmissionController;
pub use super::violations::ViolationTracker;

// ── Payload Encryption ──────────────────────────────────────────────

pub use super::cipher::{EncryptedEnvelope, TAG_LEN, decrypt, encrypt, is_encrypted_payload};
pub use super::kdf::{DERIVED_KEY_LEN, DerivedKey, KDF_INFO, KDF_SALT, derive_key};

// ── Prompt & Response Guards ────────────────────────────────────────

pub use super::prompt_guard::{
    POLICY_PREAMBLE, PromptGuard, build_wrapped_prompt, is_invisible, normalize_prompt,
};
pub use super::response_guard::{HOME_PLACEHOLDER, ResponseGuard, TRUNCATION_MARKER};
pub use super::rules::{
    INJECTION_RULES, PolicyPatternSets, RULESET_VERSION, Rule, RuleCategory, RuleTable,
    SECRET_RULES, SHELL_RULES, SSRF_RULES,
};
