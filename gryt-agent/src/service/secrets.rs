//! Secret resolution
//!
//! Repository tokens arrive Fernet-encrypted with the key shared between the
//! control plane and its agents. They are decrypted just before the checkout
//! and held in a `SecretString` so they never end up in logs.

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encryption key is not a valid Fernet key")]
    InvalidKey,

    #[error("ciphertext could not be decrypted")]
    Decryption,

    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// Decrypts opaque credential strings
pub trait SecretResolver: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, SecretError>;
}

/// Fernet-based implementation of SecretResolver
pub struct FernetSecretResolver {
    fernet: fernet::Fernet,
}

impl FernetSecretResolver {
    pub fn new(key: &SecretString) -> Result<Self, SecretError> {
        let fernet = fernet::Fernet::new(key.expose_secret()).ok_or(SecretError::InvalidKey)?;
        Ok(Self { fernet })
    }
}

impl SecretResolver for FernetSecretResolver {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, SecretError> {
        let bytes = self
            .fernet
            .decrypt(ciphertext.trim())
            .map_err(|_| SecretError::Decryption)?;

        let plaintext = String::from_utf8(bytes).map_err(|_| SecretError::InvalidUtf8)?;
        Ok(SecretString::from(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::from(fernet::Fernet::generate_key())
    }

    #[test]
    fn test_decrypts_token() {
        let key = key();
        let ciphertext = fernet::Fernet::new(key.expose_secret())
            .unwrap()
            .encrypt(b"ghp_example");

        let resolver = FernetSecretResolver::new(&key).unwrap();
        let token = resolver.decrypt(&ciphertext).unwrap();
        assert_eq!(token.expose_secret(), "ghp_example");
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = fernet::Fernet::new(key().expose_secret())
            .unwrap()
            .encrypt(b"ghp_example");

        let resolver = FernetSecretResolver::new(&key()).unwrap();
        assert!(matches!(
            resolver.decrypt(&ciphertext),
            Err(SecretError::Decryption)
        ));
    }

    #[test]
    fn test_garbage_ciphertext_fails() {
        let resolver = FernetSecretResolver::new(&key()).unwrap();
        assert!(resolver.decrypt("not-a-token").is_err());
    }

    #[test]
    fn test_invalid_key_rejected() {
        let key = SecretString::from("short".to_string());
        assert!(matches!(
            FernetSecretResolver::new(&key),
            Err(SecretError::InvalidKey)
        ));
    }
}
