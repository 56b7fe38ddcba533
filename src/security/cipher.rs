//! AES-256-GCM payload encryption for prompts and responses.
//!
//! # Wire format
//!
//! ```text
//! { "iv": base64(12 random bytes), "ciphertext": base64(ciphertext || 16-byte tag) }
//! ```
//!
//! Standard base64 alphabet with padding, each field encoded on its own.
//! Associated data is empty. This matches what WebCrypto produces for
//! `AES-GCM` with a 96-bit IV and the default 128-bit tag.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use super::error::CipherError;
use super::kdf::DerivedKey;

/// Authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Encrypted prompt or response as it crosses the browser boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64 nonce. Fresh per encryption call.
    pub iv: String,
    /// Base64 ciphertext with the GCM tag appended.
    pub ciphertext: String,
}

fn aead_key(key: &DerivedKey) -> Result<LessSafeKey, CipherError> {
    let unbound =
        UnboundKey::new(&AES_256_GCM, key.as_bytes()).map_err(|_| CipherError::KeyDerivation)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<EncryptedEnvelope, CipherError> {
    let mut iv = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| CipherError::Encryption("system random source unavailable"))?;

    let mut in_out = plaintext.as_bytes().to_vec();
    aead_key(key)?
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
        .map_err(|_| CipherError::Encryption("seal failed"))?;

    Ok(EncryptedEnvelope {
        iv: STANDARD.encode(iv),
        ciphertext: STANDARD.encode(&in_out),
    })
}

/// Decrypt and authenticate an envelope.
///
/// Any malformed field, wrong key, truncation, or modified byte yields
/// [`CipherError::Integrity`] and no plaintext.
pub fn decrypt(envelope: &EncryptedEnvelope, key: &DerivedKey) -> Result<String, CipherError> {
    let iv = STANDARD
        .decode(&envelope.iv)
        .map_err(|_| CipherError::Integrity)?;
    let nonce = Nonce::try_assume_unique_for_key(&iv).map_err(|_| CipherError::Integrity)?;

    let mut in_out = STANDARD
        .decode(&envelope.ciphertext)
        .map_err(|_| CipherError::Integrity)?;
    if in_out.len() < TAG_LEN {
        return Err(CipherError::Integrity);
    }

    let plaintext = aead_key(key)?
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CipherError::Integrity)?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Integrity)
}

/// Envelope discriminator for untyped JSON input.
///
/// True only for an object whose `iv` and `ciphertext` are both strings.
pub fn is_encrypted_payload(value: &serde_json::Value) -> bool {
    match value.as_object() {
        Some(obj) => {
            obj.get("iv").is_some_and(|v| v.is_string())
                && obj.get("ciphertext").is_some_and(|v| v.is_string())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::kdf::derive_key;
    use serde_json::json;

    fn key() -> DerivedKey {
        derive_key("test-token-0123456789abcdef").unwrap()
    }

    #[test]
    fn roundtrip_representative_strings() {
        let key = key();
        let long = "x".repeat(4096);
        let samples = [
            "",
            "Analyze AAPL earnings for Q4",
            long.as_str(),
            "日本語のテキスト — ünïcödé — 🚀🔐",
        ];
        for sample in samples {
            let envelope = encrypt(sample, &key).unwrap();
            assert_eq!(decrypt(&envelope, &key).unwrap(), sample);
        }
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = key();
        let a = encrypt("same text", &key).unwrap();
        let b = encrypt("same text", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(STANDARD.decode(&a.iv).unwrap().len(), NONCE_LEN);
    }

    #[test]
    fn tag_is_appended() {
        let envelope = encrypt("hello", &key()).unwrap();
        let raw = STANDARD.decode(&envelope.ciphertext).unwrap();
        assert_eq!(raw.len(), "hello".len() + TAG_LEN);
    }

    #[test]
    fn flipping_any_byte_fails() {
        let key = key();
        let envelope = encrypt("do not tamper", &key).unwrap();
        let raw = STANDARD.decode(&envelope.ciphertext).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let bad = EncryptedEnvelope {
                iv: envelope.iv.clone(),
                ciphertext: STANDARD.encode(&tampered),
            };
            assert_eq!(decrypt(&bad, &key), Err(CipherError::Integrity));
        }
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = encrypt("secret", &key()).unwrap();
        let other = derive_key("another-token").unwrap();
        assert_eq!(decrypt(&envelope, &other), Err(CipherError::Integrity));
    }

    #[test]
    fn truncated_or_malformed_input_fails() {
        let key = key();
        let envelope = encrypt("secret", &key).unwrap();

        let truncated = EncryptedEnvelope {
            iv: envelope.iv.clone(),
            ciphertext: STANDARD.encode([1u8, 2, 3]),
        };
        assert_eq!(decrypt(&truncated, &key), Err(CipherError::Integrity));

        let bad_iv = EncryptedEnvelope {
            iv: STANDARD.encode([0u8; 8]),
            ciphertext: envelope.ciphertext.clone(),
        };
        assert_eq!(decrypt(&bad_iv, &key), Err(CipherError::Integrity));

        let not_base64 = EncryptedEnvelope {
            iv: "%%%".to_string(),
            ciphertext: envelope.ciphertext,
        };
        assert_eq!(decrypt(&not_base64, &key), Err(CipherError::Integrity));
    }

    #[test]
    fn envelope_discriminator() {
        assert!(is_encrypted_payload(&json!({"iv": "a", "ciphertext": "b"})));
        assert!(is_encrypted_payload(
            &json!({"iv": "a", "ciphertext": "b", "extra": 1})
        ));
        assert!(!is_encrypted_payload(&json!("plain prompt")));
        assert!(!is_encrypted_payload(&json!({"iv": "a"})));
        assert!(!is_encrypted_payload(&json!({"ciphertext": "b"})));
        assert!(!is_encrypted_payload(&json!({"iv": 1, "ciphertext": "b"})));
        assert!(!is_encrypted_payload(&json!(null)));
    }
}
