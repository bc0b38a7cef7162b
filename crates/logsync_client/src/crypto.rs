//! End-to-end encryption of file ids and content using AES-256-GCM.
//!
//! The key is the SHA-256 digest of a configured passphrase. Every
//! encryption uses a fresh random nonce prepended to the ciphertext, so
//! encrypting the same value twice yields different bytes. Ids are
//! hex-encoded after encryption so they stay printable on the wire; id and
//! content are encrypted independently.

use crate::error::{SyncError, SyncResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key derived from a passphrase.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    /// Derives a key as the SHA-256 digest of the passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&digest);
        Self { bytes }
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts file content and file ids.
pub struct ContentCipher {
    cipher: Aes256Gcm,
}

impl ContentCipher {
    /// Creates a cipher from a derived key.
    #[must_use]
    pub fn new(key: &SecretKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Creates a cipher straight from a passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(&SecretKey::from_passphrase(passphrase))
    }

    /// Encrypts raw bytes.
    ///
    /// Output layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> SyncResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| SyncError::crypto("encryption failed"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    /// Decrypts bytes produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with an authentication error on a wrong key or corrupted
    /// data; never returns corrupted plaintext silently.
    pub fn decrypt(&self, ciphertext: &[u8]) -> SyncResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SyncError::crypto("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &ciphertext[NONCE_SIZE..])
            .map_err(|_| SyncError::crypto("decryption failed, wrong key or corrupted data"))
    }

    /// Encrypts a file id into a printable hex string.
    pub fn encrypt_id(&self, id: &str) -> SyncResult<String> {
        Ok(hex::encode(self.encrypt(id.as_bytes())?))
    }

    /// Decrypts a hex-encoded file id.
    pub fn decrypt_id(&self, encrypted: &str) -> SyncResult<String> {
        let raw = hex::decode(encrypted)
            .map_err(|_| SyncError::crypto("file id is not valid hex"))?;
        let plain = self.decrypt(&raw)?;
        String::from_utf8(plain).map_err(|_| SyncError::crypto("decrypted id is not UTF-8"))
    }
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
