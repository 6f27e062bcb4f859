use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Failures while sealing or opening envelope fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Stored bytes are not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Ciphertext did not authenticate under the supplied secret.
    #[error("decryption failed")]
    Decrypt,
    #[error("encryption failed: {0}")]
    Encrypt(String),
}

/// Encrypt `plaintext` under a capability token.
///
/// The AES-256 key is the SHA-256 of the token; the output is
/// base64url(nonce || ciphertext).
pub fn seal(plaintext: &[u8], secret: &str) -> Result<String, CodecError> {
    let cipher = build_cipher(secret)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CodecError::Encrypt(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Reverse of [`seal`]. Any failure (bad encoding, short input, wrong
/// secret, tampering) is reported as [`CodecError::Decrypt`].
pub fn open(sealed: &str, secret: &str) -> Result<Vec<u8>, CodecError> {
    let raw = URL_SAFE_NO_PAD
        .decode(sealed)
        .map_err(|_| CodecError::Decrypt)?;
    if raw.len() < NONCE_LEN {
        return Err(CodecError::Decrypt);
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = build_cipher(secret)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CodecError::Decrypt)
}

fn build_cipher(secret: &str) -> Result<Aes256Gcm, CodecError> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| CodecError::Encrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_value_opens_with_same_secret() {
        let sealed = seal(b"hello-sandbox", "secret-token").expect("seal");
        assert!(!sealed.contains("hello-sandbox"));

        let opened = open(&sealed, "secret-token").expect("open");
        assert_eq!(opened, b"hello-sandbox");
    }

    #[test]
    fn sealing_twice_uses_fresh_nonces() {
        let a = seal(b"same", "k").expect("seal");
        let b = seal(b"same", "k").expect("seal");
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_fails_to_open() {
        let sealed = seal(b"payload", "right").expect("seal");
        assert_eq!(open(&sealed, "wrong"), Err(CodecError::Decrypt));
    }

    #[test]
    fn garbage_input_fails_to_open() {
        assert_eq!(open("not base64 !!", "k"), Err(CodecError::Decrypt));
        assert_eq!(open("AAAA", "k"), Err(CodecError::Decrypt));
    }
}
