//! Bearer token issuance, persistence, and validation.
//!
//! One static credential per installation. The local browser client reads
//! it once (out of band) and presents it as `Authorization: Bearer <token>`
//! on every request.
//!
//! # Storage
//!
//! - **Location**: `promptrelay.token` in the data directory, outside
//!   anything the relayed CLI tools are pointed at.
//! - **Format**: one line, the hex token followed by `\n`.
//! - **Permissions**: 0600 on Unix. The file is rewritten on every start,
//!   so loosened permissions are repaired automatically.
//! - **Generation**: 32 bytes from the OS CSPRNG via the `rand` crate,
//!   only when the file is missing, unreadable, or empty.

use anyhow::{Context, Result};
use rand::RngExt;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::fs;
use std::path::{Path, PathBuf};

/// Filename of the persisted bearer token.
pub const TOKEN_FILENAME: &str = "promptrelay.token";

const TOKEN_BYTES: usize = 32;

/// Owner of the shared bearer credential.
pub struct TokenAuthority {
    token: String,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("fingerprint", &self.fingerprint())
            .field("path", &self.path)
            .finish()
    }
}

impl TokenAuthority {
    /// Load the token from `storage_dir`, generating one if needed, and
    /// rewrite the file with owner-only permissions.
    pub fn init(storage_dir: &Path) -> Result<Self> {
        fs::create_dir_all(storage_dir)
            .with_context(|| format!("Failed to create {}", storage_dir.display()))?;

        let path = token_file_path(storage_dir);
        let existing = match fs::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Unreadable token file {}: {}", path.display(), e);
                }
                None
            }
        };

        let token = match existing {
            Some(token) => token,
            None => {
                let token = generate_token();
                tracing::info!("Generated new bearer token at {}", path.display());
                token
            }
        };

        write_token_file(&path, &token)?;

        let authority = Self {
            token,
            path: Some(path),
        };
        tracing::debug!("Bearer token loaded (fingerprint {})", authority.fingerprint());
        Ok(authority)
    }

    /// In-memory authority with a fixed token, never persisted.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            path: None,
        }
    }

    /// Exact-match validation. Missing or empty candidates are invalid.
    ///
    /// Hashes both sides to fixed-length digests and compares them in
    /// constant time, so neither length nor matching prefix leaks.
    pub fn validate(&self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(c) if !c.is_empty() => {
                let candidate = Sha256::digest(c.as_bytes());
                let expected = Sha256::digest(self.token.as_bytes());
                bool::from(candidate.as_slice().ct_eq(expected.as_slice()))
            }
            _ => false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Path of the persisted token file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Short SHA-256 prefix that is safe to log.
    pub fn fingerprint(&self) -> String {
        hex_encode(&Sha256::digest(self.token.as_bytes())[..4])
    }
}

/// Full path of the token file inside `storage_dir`.
pub fn token_file_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(TOKEN_FILENAME)
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex_encode(&bytes)
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    fs::write(path, format!("{}\n", token)).context("Failed to write token file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set token file permissions")?;
    }

    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
