//! Crypto utilities.
//!
//! - ChaCha20-Poly1305 authenticated encryption with a fresh random nonce per call
//! - Ciphertext strings are self-contained: `<nonce hex>:<tag hex>:<ciphertext hex>`
//! - SHA-256 digests for blob checksums
//! - Non-reproducible random values drawn from the OS CSPRNG

use crate::core::error::HivekeepError;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use sha2::{Digest, Sha256};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn random_bytes<const N: usize>() -> Result<[u8; N], HivekeepError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| HivekeepError::Crypto(e.to_string()))?;
    Ok(buf)
}

/// `count` values uniformly distributed in [-0.5, 0.5].
pub fn secure_random_vector(count: usize) -> Result<Vec<f32>, HivekeepError> {
    let mut raw = vec![0u8; count * 4];
    getrandom::getrandom(&mut raw).map_err(|e| HivekeepError::Crypto(e.to_string()))?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| {
            let n = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            ((n as f64 / u32::MAX as f64) - 0.5) as f32
        })
        .collect())
}

/// Symmetric secret box. The key never leaves the struct.
#[derive(Clone)]
pub struct SecretBox {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Box keyed with fresh random bytes. Ciphertexts do not survive the process.
    pub fn generate() -> Result<Self, HivekeepError> {
        let key = random_bytes::<KEY_LEN>()?;
        Ok(Self::new(&key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, HivekeepError> {
        let nonce_bytes = random_bytes::<NONCE_LEN>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|_| HivekeepError::Crypto("encryption failed".to_string()))?;
        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Fails closed on malformed input or authentication-tag mismatch.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, HivekeepError> {
        let mut parts = ciphertext.splitn(3, ':');
        let (Some(nonce_hex), Some(tag_hex), Some(body_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(HivekeepError::Crypto(
                "malformed ciphertext: expected nonce:tag:body".to_string(),
            ));
        };

        let nonce_bytes = decode_exact(nonce_hex, NONCE_LEN, "nonce")?;
        let tag_bytes = decode_exact(tag_hex, TAG_LEN, "tag")?;
        let mut buffer = hex::decode(body_hex)
            .map_err(|e| HivekeepError::Crypto(format!("malformed ciphertext body: {}", e)))?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| HivekeepError::Crypto("authentication tag mismatch".to_string()))?;

        String::from_utf8(buffer)
            .map_err(|_| HivekeepError::Crypto("plaintext is not valid UTF-8".to_string()))
    }
}

fn decode_exact(hex_str: &str, len: usize, what: &str) -> Result<Vec<u8>, HivekeepError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| HivekeepError::Crypto(format!("malformed {}: {}", what, e)))?;
    if bytes.len() != len {
        return Err(HivekeepError::Crypto(format!(
            "malformed {}: expected {} bytes, got {}",
            what,
            len,
            bytes.len()
        )));
    }
    Ok(bytes)
}
