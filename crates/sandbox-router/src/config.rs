use sandbox_storage::tokens::{TokenLengths, DEFAULT_ACTION_LENGTH, DEFAULT_PART_LENGTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Objects live for 48 hours unless updated.
pub const DEFAULT_EXPIRATION_TTL: u64 = 60 * 60 * 24 * 2;

pub const DEFAULT_BANNER: &str = "IIIF Preview";

/// Switches fixed at router construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Seal documents and rights tokens with AES-GCM before storing them.
    pub encryption: bool,
    /// Issue a fresh update token on every update. Disable for stable edit links.
    pub rotate_update_token: bool,
    pub part_length: usize,
    pub action_length: usize,
    /// Seconds an object lives after its last write.
    pub expiration_ttl: u64,
    /// Base for returned URLs. Derived from the request when unset.
    pub public_url: Option<String>,
    /// Body of `GET /`.
    pub banner: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            encryption: false,
            rotate_update_token: true,
            part_length: DEFAULT_PART_LENGTH,
            action_length: DEFAULT_ACTION_LENGTH,
            expiration_ttl: DEFAULT_EXPIRATION_TTL,
            public_url: None,
            banner: DEFAULT_BANNER.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("public_url must be an absolute http(s) URL, got {0}")]
    PublicUrl(String),
}

impl SandboxConfig {
    pub fn token_lengths(&self) -> TokenLengths {
        TokenLengths {
            part: self.part_length,
            action: self.action_length,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_length == 0 {
            return Err(ConfigError::Zero("part_length"));
        }
        if self.action_length == 0 {
            return Err(ConfigError::Zero("action_length"));
        }
        if self.expiration_ttl == 0 {
            return Err(ConfigError::Zero("expiration_ttl"));
        }
        if let Some(url) = &self.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::PublicUrl(url.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = SandboxConfig::default();
        assert!(!cfg.encryption);
        assert!(cfg.rotate_update_token);
        assert_eq!(cfg.part_length, 16);
        assert_eq!(cfg.action_length, 64);
        assert_eq!(cfg.expiration_ttl, 172_800);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: SandboxConfig =
            serde_json::from_str(r#"{ "encryption": true, "part_length": 8 }"#).expect("parse");
        assert!(cfg.encryption);
        assert_eq!(cfg.token_lengths(), TokenLengths { part: 8, action: 64 });
        assert_eq!(cfg.banner, "IIIF Preview");
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let cfg = SandboxConfig {
            part_length: 0,
            ..SandboxConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("part_length")));

        let cfg = SandboxConfig {
            expiration_ttl: 0,
            ..SandboxConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("expiration_ttl")));

        let cfg = SandboxConfig {
            public_url: Some("ftp://nope".into()),
            ..SandboxConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::PublicUrl(_))));
    }
}
