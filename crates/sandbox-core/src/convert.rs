use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures reported by a conversion service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// The document is not a resource this converter understands.
    #[error("unrecognized document: {0}")]
    Unrecognized(String),
    /// The service looked at the document and refused it.
    #[error("document rejected: {0}")]
    Rejected(String),
    /// The service could not be reached or answered garbage.
    #[error("conversion service unavailable: {0}")]
    Unavailable(String),
}

/// Contract for anything that turns a raw uploaded document into its
/// canonical representation (local upgrader, remote service, stub).
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Return the canonical form of `raw`, or fail if it is unrecognized.
    async fn convert(&self, raw: &Value) -> Result<Value, ConversionError>;
}

/// Converter that accepts any JSON object unchanged. Useful for tests and
/// for deployments that store documents verbatim.
pub struct IdentityConverter;

#[async_trait]
impl DocumentConverter for IdentityConverter {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn convert(&self, raw: &Value) -> Result<Value, ConversionError> {
        if raw.is_object() {
            Ok(raw.clone())
        } else {
            Err(ConversionError::Unrecognized(
                "expected a JSON object".to_string(),
            ))
        }
    }
}
