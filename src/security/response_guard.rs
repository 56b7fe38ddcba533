//! Outbound redaction for CLI output.
//!
//! Truncation runs first so the marker is never fed to the secret rules.
//! Redaction is textual: anything shaped like a secret is replaced, even
//! if it turns out to be harmless.

use tracing::warn;

use super::rules::{PolicyPatternSets, RuleTable};

/// Appended when output exceeds the configured maximum.
pub const TRUNCATION_MARKER: &str = "\n[... output truncated by promptrelay ...]";

/// Replacement for the local user's home directory.
pub const HOME_PLACEHOLDER: &str = "~";

#[derive(Debug, Clone)]
pub struct ResponseGuard {
    max_chars: usize,
    secrets: RuleTable,
    home_dir: Option<String>,
}

impl ResponseGuard {
    /// Guard that also masks the current user's home directory.
    pub fn new(max_chars: usize, rules: &PolicyPatternSets) -> Self {
        let home = etcetera::home_dir()
            .ok()
            .map(|p| p.to_string_lossy().into_owned());
        Self::with_home_dir(max_chars, rules, home)
    }

    /// Guard with an explicit home directory (or none).
    ///
    /// Empty and root-only paths are ignored; replacing them would
    /// mangle every path in the output.
    pub fn with_home_dir(
        max_chars: usize,
        rules: &PolicyPatternSets,
        home_dir: Option<String>,
    ) -> Self {
        let home_dir = home_dir
            .map(|h| h.trim_end_matches(['/', '\\']).to_string())
            .filter(|h| !h.is_empty());

        Self {
            max_chars,
            secrets: rules.secrets.clone(),
            home_dir,
        }
    }

    /// Truncate, redact secrets, then mask the home directory.
    pub fn sanitize(&self, text: &str) -> String {
        let (bounded, truncated) = truncate_chars(text, self.max_chars);
        if truncated {
            warn!(
                "Response truncated to {} characters before redaction",
                self.max_chars
            );
        }

        let (redacted, fired) = self.secrets.redact(&bounded);
        if !fired.is_empty() {
            warn!("Redacted secrets from response: {:?}", fired);
        }

        match self.home_dir {
            Some(ref home) => redacted.replace(home.as_str(), HOME_PLACEHOLDER),
            None => redacted,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, appending the marker if cut.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
        None => (text.to_string(), false),
    }
}
