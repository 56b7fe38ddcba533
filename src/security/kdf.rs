//! Deterministic payload key derivation from the bearer token.
//!
//! HKDF-SHA256 (RFC 5869) with fixed, distinct salt and info strings. The
//! browser derives the same key from the same token with WebCrypto, so
//! both constants and the output length are part of the wire contract and
//! must never change without a version bump on both sides.
//!
//! Anyone holding the token can derive the key. The encryption layer
//! protects payloads from intermediaries, not from credential holders.

use ring::hkdf::{HKDF_SHA256, KeyType, Salt};
use std::fmt;
use zeroize::Zeroizing;

use super::error::CipherError;

/// HKDF salt. ASCII, fixed.
pub const KDF_SALT: &[u8] = b"promptrelay-e2e-salt-v1";

/// HKDF info/context string. ASCII, fixed, distinct from the salt.
pub const KDF_INFO: &[u8] = b"promptrelay-e2e-aes-256-gcm";

/// Derived key length in bytes (AES-256).
pub const DERIVED_KEY_LEN: usize = 32;

struct OkmLen(usize);

impl KeyType for OkmLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// 256-bit symmetric key. Never persisted; zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey(Zeroizing<[u8; DERIVED_KEY_LEN]>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
    }
}

/// Derive the payload key for `token`.
pub fn derive_key(token: &str) -> Result<DerivedKey, CipherError> {
    let prk = Salt::new(HKDF_SHA256, KDF_SALT).extract(token.as_bytes());
    let okm = prk
        .expand(&[KDF_INFO], OkmLen(DERIVED_KEY_LEN))
        .map_err(|_| CipherError::KeyDerivation)?;

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    okm.fill(&mut key[..])
        .map_err(|_| CipherError::KeyDerivation)?;
    Ok(DerivedKey(key))
}
