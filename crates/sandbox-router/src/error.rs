use std::fmt;

use hyper::StatusCode;
use sandbox_core::{convert::ConversionError, storage::StoreError};
use sandbox_storage::cipher::CodecError;
use thiserror::Error;

/// Which piece of an update/delete path is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPart {
    Key1,
    Key2,
    Key3,
}

impl fmt::Display for TokenPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Self::Key1 => 1,
            Self::Key2 => 2,
            Self::Key3 => 3,
        };
        write!(f, "{n}")
    }
}

/// Errors while processing a sandbox request.
///
/// `NotFound` covers missing, expired and undecodable objects alike.
/// `Unauthorized` never says which token failed.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The submitted resource is malformed or was refused by the converter.
    #[error("{0}")]
    InvalidInput(String),

    /// The location identifier does not split into two halves.
    #[error("Invalid identifier")]
    InvalidIdentifier,

    #[error("Key not found ({0})")]
    MissingToken(TokenPart),

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request body too large")]
    BodyTooLarge,

    /// Sealing a fresh envelope failed.
    #[error("envelope encoding failed: {0}")]
    Encoding(CodecError),

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl RouterError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::MissingToken(_) => StatusCode::BAD_REQUEST,
            Self::InvalidIdentifier => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Encoding(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to send to the client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Encoding(_) | Self::Storage(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ConversionError> for RouterError {
    fn from(err: ConversionError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for RouterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            RouterError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(RouterError::InvalidIdentifier.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RouterError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(RouterError::Unauthorized.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            RouterError::MissingToken(TokenPart::Key3).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn store_not_found_is_masked() {
        let err = RouterError::from(StoreError::NotFound {
            key: "abcdef".into(),
        });
        assert!(matches!(err, RouterError::NotFound));
        assert_eq!(err.public_message(), "Not found");
    }

    #[test]
    fn storage_details_stay_internal() {
        let err = RouterError::from(StoreError::Storage {
            reason: "disk full at /var/lib/sandbox".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal error");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn missing_token_names_the_part() {
        assert_eq!(
            RouterError::MissingToken(TokenPart::Key2).to_string(),
            "Key not found (2)"
        );
    }

    #[test]
    fn conversion_errors_become_invalid_input() {
        let err = RouterError::from(ConversionError::Unrecognized("not a manifest".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "unrecognized document: not a manifest");
    }
}
