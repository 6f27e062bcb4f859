//! The record persisted against each object, and the transforms that decide
//! how its fields are protected at rest.
//!
//! | field      | plaintext mode      | encrypted mode                     |
//! |------------|---------------------|------------------------------------|
//! | `update`   | update token        | `key2` sealed under update token   |
//! | `delete`   | delete token        | `key2` sealed under delete token   |
//! | `document` | canonical JSON      | canonical JSON sealed under `key1` |
//!
//! Storage key is `key1 + key2` in plaintext mode and `key1` alone when
//! encrypted, so the index never contains the full location identifier.

use std::{fmt::Debug, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::cipher::{self, CodecError};

/// Persisted record. Fields hold their at-rest form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEnvelope {
    pub update: String,
    pub delete: String,
    #[serde(alias = "manifest")]
    pub document: Value,
}

/// Which rights field a request is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rights {
    Update,
    Delete,
}

impl StoredEnvelope {
    pub fn rights(&self, rights: Rights) -> &str {
        match rights {
            Rights::Update => &self.update,
            Rights::Delete => &self.delete,
        }
    }
}

/// Serialize an envelope for the store.
pub fn encode(envelope: &StoredEnvelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Parse stored bytes, rejecting envelopes with an empty field.
pub fn decode(bytes: &[u8]) -> Result<StoredEnvelope, CodecError> {
    let envelope: StoredEnvelope =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;

    if envelope.update.is_empty() || envelope.delete.is_empty() || envelope.document.is_null() {
        return Err(CodecError::Malformed("missing envelope field".to_string()));
    }
    Ok(envelope)
}

/// Strategy for protecting envelope fields at rest.
pub trait EnvelopeTransform: Send + Sync + Debug {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Index into the object store for a location identifier.
    fn storage_key(&self, key1: &str, key2: &str) -> String;

    fn seal_document(&self, document: &Value, key1: &str) -> Result<Value, CodecError>;

    fn open_document(&self, sealed: &Value, key1: &str) -> Result<Value, CodecError>;

    /// At-rest form of a rights field granted by `token`.
    fn seal_rights(&self, token: &str, key2: &str) -> Result<String, CodecError>;

    /// Whether `token` unlocks the stored rights field.
    fn verify_rights(&self, sealed: &str, token: &str, key2: &str) -> bool;
}

/// Stores every field as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextTransform;

impl EnvelopeTransform for PlaintextTransform {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn storage_key(&self, key1: &str, key2: &str) -> String {
        format!("{key1}{key2}")
    }

    fn seal_document(&self, document: &Value, _key1: &str) -> Result<Value, CodecError> {
        Ok(document.clone())
    }

    fn open_document(&self, sealed: &Value, _key1: &str) -> Result<Value, CodecError> {
        Ok(sealed.clone())
    }

    fn seal_rights(&self, token: &str, _key2: &str) -> Result<String, CodecError> {
        Ok(token.to_string())
    }

    fn verify_rights(&self, sealed: &str, token: &str, _key2: &str) -> bool {
        sealed.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

/// AES-GCM over the document (keyed by `key1`) and over `key2` (keyed by
/// each action token).
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptedTransform;

impl EnvelopeTransform for EncryptedTransform {
    fn name(&self) -> &'static str {
        "encrypted"
    }

    fn storage_key(&self, key1: &str, _key2: &str) -> String {
        key1.to_string()
    }

    fn seal_document(&self, document: &Value, key1: &str) -> Result<Value, CodecError> {
        let json = serde_json::to_vec(document).map_err(|e| CodecError::Encrypt(e.to_string()))?;
        Ok(Value::String(cipher::seal(&json, key1)?))
    }

    fn open_document(&self, sealed: &Value, key1: &str) -> Result<Value, CodecError> {
        let sealed = sealed
            .as_str()
            .ok_or_else(|| CodecError::Malformed("document is not ciphertext".to_string()))?;
        let json = cipher::open(sealed, key1)?;
        serde_json::from_slice(&json).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn seal_rights(&self, token: &str, key2: &str) -> Result<String, CodecError> {
        cipher::seal(key2.as_bytes(), token)
    }

    fn verify_rights(&self, sealed: &str, token: &str, key2: &str) -> bool {
        match cipher::open(sealed, token) {
            Ok(plain) => plain.as_slice().ct_eq(key2.as_bytes()).into(),
            Err(_) => false,
        }
    }
}

/// Transform selected by the encryption switch.
pub fn transform_for(encrypted: bool) -> Arc<dyn EnvelopeTransform> {
    if encrypted {
        Arc::new(EncryptedTransform)
    } else {
        Arc::new(PlaintextTransform)
    }
}
