//! AES-256-GCM encryption for secret column values.
//!
//! Every secret (app secret, access token, refresh token) is sealed
//! individually with a fresh random nonce. The nonce is prepended to the
//! ciphertext and the pair is base64-encoded, so each secret occupies a
//! single opaque column value. The master key comes from the environment
//! and never touches disk.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Master key size in bytes (256 bits).
const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96 bits).
const NONCE_SIZE: usize = 12;

/// Decodes and validates the base64 master key (must be exactly 32 bytes).
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Seals a plaintext secret into a single base64 value: `nonce || ciphertext`.
pub fn seal(plaintext: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    // Nonce must never be reused under the same key
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut packed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    packed.extend_from_slice(nonce.as_slice());
    packed.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&packed))
}

/// Opens a value produced by [`seal`], returning the plaintext secret.
///
/// Fails on a wrong key, truncated value, or tampered ciphertext
/// (authenticated encryption).
pub fn open(sealed: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }

    let packed = BASE64
        .decode(sealed)
        .context("Failed to decode sealed secret")?;

    if packed.len() <= NONCE_SIZE {
        return Err(anyhow!(
            "Sealed secret too short: expected more than {} bytes, got {}",
            NONCE_SIZE,
            packed.len()
        ));
    }

    let (nonce_bytes, ciphertext) = packed.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted secret is not valid UTF-8")
}
