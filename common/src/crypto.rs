use base64::{Engine, engine::general_purpose::STANDARD};
use ring::{
    aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey},
    rand::{SecureRandom, SystemRandom},
};
use std::sync::Arc;

/// Environment variable holding the base64 encoded 32 byte key.
pub const KEY_ENV: &str = "VULNDASH_ENCRYPTION_KEY";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("encryption key is missing; set {KEY_ENV}")]
    MissingKey,
    #[error("encryption key is invalid: {0}")]
    InvalidKey(String),
    #[error("unable to decrypt value")]
    Decrypt,
    #[error("unable to encrypt value")]
    Encrypt,
}

/// Symmetric encryption for secrets at rest (AES-256-GCM).
///
/// Ciphertexts are stored as base64 over `nonce || ciphertext || tag`.
#[derive(Clone)]
pub struct SecretCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Read the key from the process environment. Missing key is fatal for
    /// profiles which handle secrets.
    pub fn from_env() -> Result<Self, Error> {
        let encoded = std::env::var(KEY_ENV).map_err(|_| Error::MissingKey)?;
        Self::from_base64(&encoded)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|err| Error::InvalidKey(err.to_string()))?;

        let key = UnboundKey::new(&AES_256_GCM, &key)
            .map_err(|_| Error::InvalidKey("key must be 32 bytes".into()))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(key)),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| Error::Encrypt)?;

        let mut data = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut data,
            )
            .map_err(|_| Error::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + data.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&data);

        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, Error> {
        let data = STANDARD.decode(encoded).map_err(|_| Error::Decrypt)?;
        if data.len() < NONCE_LEN {
            return Err(Error::Decrypt);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| Error::Decrypt)?;

        let mut ciphertext = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut ciphertext)
            .map_err(|_| Error::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| Error::Decrypt)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cipher() -> SecretCipher {
        // 32 zero bytes, base64 encoded
        SecretCipher::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .expect("test key must parse")
    }

    #[test_log::test]
    fn round_trip() {
        let cipher = cipher();
        let ciphertext = cipher.encrypt("hunter2").unwrap();
        assert_ne!(ciphertext, "hunter2");
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), "hunter2");
    }

    #[test_log::test]
    fn distinct_nonces() {
        let cipher = cipher();
        let a = cipher.encrypt("secret").unwrap();
        let b = cipher.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test_log::test]
    fn tampered_ciphertext_fails() {
        let cipher = cipher();
        let mut ciphertext = cipher.encrypt("secret").unwrap();
        ciphertext.replace_range(0..1, "x");
        assert!(cipher.decrypt(&ciphertext).is_err());
    }
}
