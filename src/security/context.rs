//! Per-process security context shared by all request handlers.
//!
//! Constructed once at startup and owned by the host. The token bucket and
//! the violation tracker sit behind one mutex so the ban check, the
//! admission decision, and violation recording for a request never
//! interleave with another request's. The token and derived key are
//! immutable after construction.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use anyhow::{Context, Result};

use super::admission::AdmissionController;
use super::cipher::{self, EncryptedEnvelope};
use super::error::GuardError;
use super::kdf::{DerivedKey, derive_key};
use super::prompt_guard::PromptGuard;
use super::response_guard::ResponseGuard;
use super::rules::PolicyPatternSets;
use super::token::TokenAuthority;
use super::violations::ViolationTracker;
use crate::config::GuardConfig;

/// Prompt as sent by the client: plain text or an encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptPayload {
    Encrypted(EncryptedEnvelope),
    Plain(String),
}

/// Response returned to the client, mirroring the request's encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Encrypted(EncryptedEnvelope),
    Plain(String),
}

/// A prompt that passed every check.
#[derive(Debug, Clone)]
pub struct OpenedPrompt {
    /// Policy-wrapped text ready for the CLI.
    pub wrapped: String,
    /// Whether the caller encrypted the prompt (and expects an encrypted reply).
    pub encrypted: bool,
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    pub rate_limit_remaining: u32,
    pub rate_limit_capacity: u32,
    pub recent_violations: usize,
    pub banned: bool,
    pub ban_remaining_secs: Option<u64>,
}

struct GuardState {
    bucket: AdmissionController,
    violations: ViolationTracker,
}

pub struct SecurityContext {
    tokens: TokenAuthority,
    key: DerivedKey,
    prompt_guard: PromptGuard,
    response_guard: ResponseGuard,
    state: Mutex<GuardState>,
}

impl SecurityContext {
    /// Load (or create) the bearer token in `token_dir` and build every guard.
    pub fn new(config: &GuardConfig, token_dir: &Path) -> Result<Self> {
        let tokens = TokenAuthority::init(token_dir)?;
        Self::with_authority(config, tokens)
    }

    pub fn with_authority(config: &GuardConfig, tokens: TokenAuthority) -> Result<Self> {
        let rules = PolicyPatternSets::builtin().context("Failed to compile policy rules")?;
        let response_guard = ResponseGuard::new(config.max_response_chars, &rules);
        Self::assemble(config, tokens, &rules, response_guard)
    }

    fn assemble(
        config: &GuardConfig,
        tokens: TokenAuthority,
        rules: &PolicyPatternSets,
        response_guard: ResponseGuard,
    ) -> Result<Self> {
        config.validate()?;
        let key = derive_key(tokens.token()).context("Failed to derive payload key")?;

        let state = GuardState {
            bucket: AdmissionController::new(
                config.rate_limit.capacity,
                Duration::from_millis(config.rate_limit.refill_interval_ms),
            ),
            violations: ViolationTracker::new(
                config.violations.threshold,
                Duration::from_secs(config.violations.window_secs),
                Duration::from_secs(config.violations.ban_secs),
            ),
        };

        Ok(Self {
            tokens,
            key,
            prompt_guard: PromptGuard::new(config.max_prompt_chars, rules),
            response_guard,
            state: Mutex::new(state),
        })
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn response_guard(&self) -> &ResponseGuard {
        &self.response_guard
    }

    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn admit(&self, bearer: Option<&str>) -> Result<(), GuardError> {
        self.admit_at(bearer, Instant::now())
    }

    /// Ban check, then token validation, then rate limiting.
    pub fn admit_at(&self, bearer: Option<&str>, now: Instant) -> Result<(), GuardError> {
        let mut state = self.lock_state();

        if let Some(retry_after) = state.violations.ban_remaining_at(now) {
            debug!("Rejecting request: ban active for {:?}", retry_after);
            return Err(GuardError::Banned { retry_after });
        }

        if !self.tokens.validate(bearer) {
            warn!("Rejected request with missing or invalid bearer token");
            if state.violations.record_at(now) {
                warn!("Violation threshold reached; banning clients temporarily");
            }
            return Err(GuardError::Unauthorized);
        }

        if !state.bucket.try_consume_at(now) {
            let retry_after = state.bucket.retry_after_at(now);
            warn!("Rate limit exceeded; retry in {:?}", retry_after);
            return Err(GuardError::RateLimited { retry_after });
        }

        Ok(())
    }

    pub fn open_prompt(&self, payload: &PromptPayload) -> Result<OpenedPrompt, GuardError> {
        self.open_prompt_at(payload, Instant::now())
    }

    /// Decrypt if needed, then validate and wrap. Policy failures count
    /// as violations; integrity failures do not.
    pub fn open_prompt_at(
        &self,
        payload: &PromptPayload,
        now: Instant,
    ) -> Result<OpenedPrompt, GuardError> {
        let (raw, encrypted) = match payload {
            PromptPayload::Plain(text) => (text.clone(), false),
            PromptPayload::Encrypted(envelope) => {
                let text = cipher::decrypt(envelope, &self.key).inspect_err(|_| {
                    warn!("Encrypted prompt failed integrity check");
                })?;
                (text, true)
            }
        };

        match self.prompt_guard.wrap(&raw) {
            Ok(wrapped) => Ok(OpenedPrompt { wrapped, encrypted }),
            Err(violation) => {
                warn!("Policy violation ({}): {}", violation.kind(), violation);
                if self.lock_state().violations.record_at(now) {
                    warn!("Violation threshold reached; banning clients temporarily");
                }
                Err(GuardError::Policy(violation))
            }
        }
    }

    /// Redact CLI output and encrypt it if the request was encrypted.
    pub fn seal_response(&self, output: &str, encrypt: bool) -> Result<ResponsePayload, GuardError> {
        let sanitized = self.response_guard.sanitize(output);
        if encrypt {
            Ok(ResponsePayload::Encrypted(cipher::encrypt(
                &sanitized, &self.key,
            )?))
        } else {
            Ok(ResponsePayload::Plain(sanitized))
        }
    }

    /// Decrypt a response envelope produced by this context.
    pub fn decrypt_payload(&self, envelope: &EncryptedEnvelope) -> Result<String, GuardError> {
        Ok(cipher::decrypt(envelope, &self.key)?)
    }

    /// Encrypt arbitrary text under this context's key.
    pub fn encrypt_payload(&self, plaintext: &str) -> Result<EncryptedEnvelope, GuardError> {
        Ok(cipher::encrypt(plaintext, &self.key)?)
    }

    pub fn status(&self) -> GuardStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> GuardStatus {
        let mut state = self.lock_state();
        let ban = state.violations.ban_remaining_at(now);
        GuardStatus {
            rate_limit_remaining: state.bucket.remaining_at(now),
            rate_limit_capacity: state.bucket.capacity(),
            recent_violations: state.violations.recent_count_at(now),
            banned: ban.is_some(),
            ban_remaining_secs: ban.map(super::error::ceil_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, ViolationConfig};

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn config() -> GuardConfig {
        GuardConfig {
            max_prompt_chars: 200,
            max_response_chars: 1_000,
            rate_limit: RateLimitConfig {
                capacity: 3,
                refill_interval_ms: 1_000,
            },
            violations: ViolationConfig {
                threshold: 3,
                window_secs: 60,
                ban_secs: 300,
            },
        }
    }

    fn context() -> SecurityContext {
        let rules = PolicyPatternSets::builtin().unwrap();
        let response_guard =
            ResponseGuard::with_home_dir(1_000, &rules, Some("/home/tester".to_string()));
        SecurityContext::assemble(
            &config(),
            TokenAuthority::from_token(TOKEN),
            &rules,
            response_guard,
        )
        .unwrap()
    }

    #[test]
    fn valid_token_admitted_until_bucket_empty() {
        let ctx = context();
        let now = Instant::now();
        for _ in 0..3 {
            ctx.admit_at(Some(TOKEN), now).unwrap();
        }
        let err = ctx.admit_at(Some(TOKEN), now).unwrap_err();
        assert!(matches!(err, GuardError::RateLimited { .. }));
        assert!(err.retry_after().unwrap() > Duration::ZERO);
    }

    #[test]
    fn rate_limiting_is_not_a_violation() {
        let ctx = context();
        let now = Instant::now();
        for _ in 0..10 {
            let _ = ctx.admit_at(Some(TOKEN), now);
        }
        let status = ctx.status_at(now);
        assert_eq!(status.recent_violations, 0);
        assert!(!status.banned);
    }

    #[test]
    fn auth_failures_escalate_to_ban() {
        let ctx = context();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(matches!(
                ctx.admit_at(Some("wrong"), now),
                Err(GuardError::Unauthorized)
            ));
        }

        // Banned before the token is even looked at.
        let err = ctx.admit_at(Some(TOKEN), now).unwrap_err();
        assert!(matches!(err, GuardError::Banned { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(300)));

        let later = now + Duration::from_secs(301);
        ctx.admit_at(Some(TOKEN), later).unwrap();
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let ctx = context();
        assert!(matches!(ctx.admit(None), Err(GuardError::Unauthorized)));
        assert!(matches!(ctx.admit(Some("")), Err(GuardError::Unauthorized)));
    }

    #[test]
    fn plain_prompt_opened_and_wrapped() {
        let ctx = context();
        let opened = ctx
            .open_prompt(&PromptPayload::Plain("Analyze AAPL earnings for Q4".into()))
            .unwrap();
        assert!(!opened.encrypted);
        assert!(opened.wrapped.contains("Analyze AAPL earnings for Q4"));
    }

    #[test]
    fn policy_violations_recorded() {
        let ctx = context();
        let now = Instant::now();
        let bad = PromptPayload::Plain("$(rm -rf /)".into());

        for _ in 0..3 {
            assert!(matches!(
                ctx.open_prompt_at(&bad, now),
                Err(GuardError::Policy(_))
            ));
        }
        assert!(ctx.status_at(now).banned);
    }

    #[test]
    fn encrypted_roundtrip_through_context() {
        let ctx = context();
        let envelope = ctx.encrypt_payload("Summarize the attached notes").unwrap();

        let opened = ctx
            .open_prompt(&PromptPayload::Encrypted(envelope))
            .unwrap();
        assert!(opened.encrypted);

        let reply = ctx
            .seal_response("Notes live in /home/tester/notes.md", true)
            .unwrap();
        match reply {
            ResponsePayload::Encrypted(env) => {
                assert_eq!(ctx.decrypt_payload(&env).unwrap(), "Notes live in ~/notes.md");
            }
            other => panic!("Expected encrypted reply, got {:?}", other),
        }
    }

    #[test]
    fn tampered_prompt_is_integrity_error_not_violation() {
        let ctx = context();
        let mut envelope = ctx.encrypt_payload("hello").unwrap();
        envelope.iv = ctx.encrypt_payload("other").unwrap().iv;

        let err = ctx
            .open_prompt(&PromptPayload::Encrypted(envelope))
            .unwrap_err();
        assert!(matches!(err, GuardError::Integrity));
        assert_eq!(ctx.status().recent_violations, 0);
    }

    #[test]
    fn plain_response_redacted() {
        let ctx = context();
        let reply = ctx
            .seal_response("key sk-abc123def456ghi789jkl012mno345", false)
            .unwrap();
        assert_eq!(
            reply,
            ResponsePayload::Plain("key [REDACTED:openai_key]".to_string())
        );
    }

    #[test]
    fn payload_deserializes_from_either_shape() {
        let plain: PromptPayload = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(plain, PromptPayload::Plain("hello".into()));

        let enc: PromptPayload =
            serde_json::from_str(r#"{"iv":"AAAA","ciphertext":"BBBB"}"#).unwrap();
        assert!(matches!(enc, PromptPayload::Encrypted(_)));

        assert!(serde_json::from_str::<PromptPayload>(r#"{"iv":"AAAA"}"#).is_err());
    }

    #[test]
    fn payload_shape_matches_envelope_discriminator() {
        for value in [
            serde_json::json!({"iv": "AAAA", "ciphertext": "BBBB"}),
            serde_json::json!({"iv": "AAAA", "ciphertext": "BBBB", "extra": 1}),
            serde_json::json!({"iv": 1, "ciphertext": "BBBB"}),
            serde_json::json!({"iv": "AAAA"}),
            serde_json::json!({"ciphertext": "BBBB"}),
            serde_json::json!("plain prompt"),
            serde_json::json!(null),
        ] {
            let parsed = serde_json::from_value::<PromptPayload>(value.clone());
            assert_eq!(
                matches!(parsed, Ok(PromptPayload::Encrypted(_))),
                cipher::is_encrypted_payload(&value),
                "disagree on {value}"
            );
        }
    }

    #[test]
    fn context_persists_token_in_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = SecurityContext::new(&config(), tmp.path()).unwrap();
        let again = SecurityContext::new(&config(), tmp.path()).unwrap();
        assert_eq!(ctx.tokens().token(), again.tokens().token());
    }
}
