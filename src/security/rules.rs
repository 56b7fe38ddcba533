//! Compiled-in policy rule tables.
//!
//! Each category is an ordered `(name, pattern)` list compiled once at
//! startup into a [`RuleTable`]. Call sites only see the guards; rules can
//! be added or tuned here without touching them. Bump [`RULESET_VERSION`]
//! whenever a table changes.
//!
//! Matching is best-effort. False positives are acceptable, false
//! negatives on the secret table are not.

use regex::Regex;
use std::borrow::Cow;

/// Version of the built-in rule tables.
pub const RULESET_VERSION: u32 = 2;

/// Shell and command-execution patterns. Rejected in prompts.
pub const SHELL_RULES: &[(&str, &str)] = &[
    ("subshell", r"\$\("),
    ("backtick", r"`"),
    ("variable_expansion", r"\$\{[^}]*\}"),
    ("privilege_escalation", r"(?i)\b(sudo|doas|pkexec)\b|\bsu\s+-"),
    ("eval_exec", r"(?i)\b(eval|exec)\b\s*[\(\s]"),
    (
        "destructive_chain",
        r"(?i)(;|&&|\|\|)\s*(rm|mkfs|dd|shutdown|reboot|chmod|chown|kill|curl|wget)\b",
    ),
    ("recursive_delete", r"(?i)\brm\s+-[a-z]*[rf]"),
    ("pipe_to_shell", r"(?i)\|\s*(sh|bash|zsh|fish|python3?|perl|ruby|node)\b"),
    ("fork_bomb", r":\(\)\s*\{"),
    ("device_write", r">\s*/dev/(sd|nvme|disk)"),
];

/// Prompt-injection phrasing. Rejected in prompts.
pub const INJECTION_RULES: &[(&str, &str)] = &[
    (
        "ignore_previous",
        r"(?i)\b(ignore|disregard|forget|skip)\s+(all\s+|any\s+|the\s+|your\s+|my\s+|of\s+|everything\s+|previous\s+|prior\s+|above\s+|earlier\s+|preceding\s+|system\s+)*(instructions?|prompts?|rules|constraints|directions|guidelines|context|above|before)\b",
    ),
    (
        "override_constraints",
        r"(?i)\b(override|bypass|disable)\s+(all\s+|any\s+|the\s+|your\s+)*(safety|security|system)?\s*(rules|constraints|restrictions|guardrails|filters|policies)",
    ),
    ("role_reassignment", r"(?i)\byou\s+are\s+now\b"),
    (
        "role_play",
        r"(?i)\b(pretend\s+(to\s+be|you\s+are)|act\s+as|from\s+now\s+on,?\s+you)\b",
    ),
    ("new_instructions", r"(?i)\b(new|updated|real)\s+instructions\s*:"),
    ("system_prompt", r"(?im)\bsystem\s+prompt\s*:|^\s*(system|assistant)\s*:"),
    (
        "chat_template_marker",
        r"(?i)\[/?INST\]|<\|im_(start|end)\|>|<\|endoftext\|>|<</?SYS>>",
    ),
];

/// Internal network targets. Rejected in prompts.
pub const SSRF_RULES: &[(&str, &str)] = &[
    ("link_local", r"\b169\.254\.\d{1,3}\.\d{1,3}\b"),
    ("cloud_metadata", r"(?i)\bmetadata\.google\.internal\b|\bmetadata\.azure\.com\b"),
    ("private_10", r"\b10\.\d{1,3}\.\d{1,3}\.\d{1,3}\b"),
    ("private_172", r"\b172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}\b"),
    ("private_192", r"\b192\.168\.\d{1,3}\.\d{1,3}\b"),
    ("loopback", r"\b127\.\d{1,3}\.\d{1,3}\.\d{1,3}\b|\[::1\]"),
    ("unspecified", r"\b0\.0\.0\.0\b|\[::\]"),
    ("localhost", r"(?i)\blocalhost\b"),
];

/// Secret shapes. Redacted in responses, in this order.
pub const SECRET_RULES: &[(&str, &str)] = &[
    ("anthropic_key", r"sk-ant-[A-Za-z0-9_\-]{20,}"),
    ("openai_key", r"\bsk-(proj-|svcacct-)?[A-Za-z0-9_\-]{20,}"),
    (
        "github_token",
        r"\b(ghp|gho|ghu|ghs|ghr)_[A-Za-z0-9]{36,}\b|\bgithub_pat_[A-Za-z0-9_]{22,}",
    ),
    ("slack_token", r"\bxox[abposr]-[A-Za-z0-9\-]{10,}"),
    (
        "private_key",
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----",
    ),
    ("private_key", r"-----BEGIN [A-Z ]*PRIVATE KEY-----"),
    ("aws_access_key", r"\b(AKIA|ASIA)[0-9A-Z]{16}\b"),
    (
        "aws_secret_key",
        r#"(?i)\baws_secret_access_key\b\s*[:=]\s*["']?[A-Za-z0-9/+=]{40}["']?"#,
    ),
    ("google_oauth", r"\bya29\.[0-9A-Za-z_\-]{20,}"),
    ("bearer_token", r"(?i)\bbearer\s+[A-Za-z0-9._~+/\-]{16,}=*"),
    (
        "credential",
        r#"(?i)[A-Za-z0-9_\-]*(password|passwd|pwd|secret|token|api[_-]?key)["']?\s*[:=]\s*["']?[^\s"']{4,}["']?"#,
    ),
];

/// Rule category, used for logging and to pick the violation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Shell,
    Injection,
    Ssrf,
    Secret,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub regex: Regex,
}

/// Ordered, immutable list of compiled rules for one category.
#[derive(Debug, Clone)]
pub struct RuleTable {
    category: RuleCategory,
    version: u32,
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn compile(
        category: RuleCategory,
        version: u32,
        specs: &[(&'static str, &str)],
    ) -> Result<Self, regex::Error> {
        let rules = specs
            .iter()
            .map(|&(name, pattern)| {
                Ok(Rule {
                    name,
                    regex: Regex::new(pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            category,
            version,
            rules,
        })
    }

    pub fn category(&self) -> RuleCategory {
        self.category
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule, in table order, that matches anywhere in `text`.
    pub fn first_match(&self, text: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.regex.is_match(text))
    }

    /// Apply every rule in order, replacing matches with `[REDACTED:<name>]`.
    ///
    /// Returns the redacted text and the names of rules that fired.
    pub fn redact(&self, text: &str) -> (String, Vec<&'static str>) {
        let mut current = text.to_string();
        let mut fired = Vec::new();

        for rule in &self.rules {
            let marker = format!("[REDACTED:{}]", rule.name);
            let replaced = match rule.regex.replace_all(&current, marker.as_str()) {
                Cow::Borrowed(_) => None,
                Cow::Owned(s) => Some(s),
            };
            if let Some(replaced) = replaced {
                current = replaced;
                fired.push(rule.name);
            }
        }

        (current, fired)
    }
}

/// The four built-in tables, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PolicyPatternSets {
    pub shell: RuleTable,
    pub injection: RuleTable,
    pub ssrf: RuleTable,
    pub secrets: RuleTable,
}

impl PolicyPatternSets {
    pub fn builtin() -> Result<Self, regex::Error> {
        Ok(Self {
            shell: RuleTable::compile(RuleCategory::Shell, RULESET_VERSION, SHELL_RULES)?,
            injection: RuleTable::compile(
                RuleCategory::Injection,
                RULESET_VERSION,
                INJECTION_RULES,
            )?,
            ssrf: RuleTable::compile(RuleCategory::Ssrf, RULESET_VERSION, SSRF_RULES)?,
            secrets: RuleTable::compile(RuleCategory::Secret, RULESET_VERSION, SECRET_RULES)?,
        })
    }
}
