use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};

/// Length of each half of a location identifier.
pub const DEFAULT_PART_LENGTH: usize = 16;
/// Length of update/delete capability tokens.
pub const DEFAULT_ACTION_LENGTH: usize = 64;

/// Token sizes in use by a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenLengths {
    pub part: usize,
    pub action: usize,
}

impl Default for TokenLengths {
    fn default() -> Self {
        Self {
            part: DEFAULT_PART_LENGTH,
            action: DEFAULT_ACTION_LENGTH,
        }
    }
}

/// Random alphanumeric token drawn from the OS CSPRNG.
pub fn generate_token(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Fresh key set for a new object.
///
/// `key1 + key2` is the public location identifier; `update` and `delete`
/// are the action tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityKeys {
    pub key1: String,
    pub key2: String,
    pub update: String,
    pub delete: String,
}

impl CapabilityKeys {
    pub fn generate(lengths: TokenLengths) -> Self {
        Self {
            key1: generate_token(lengths.part),
            key2: generate_token(lengths.part),
            update: generate_token(lengths.action),
            delete: generate_token(lengths.action),
        }
    }

    pub fn location_id(&self) -> String {
        format!("{}{}", self.key1, self.key2)
    }
}

/// Location identifier split into its two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationId<'a> {
    pub key1: &'a str,
    pub key2: &'a str,
}

impl<'a> LocationId<'a> {
    /// Split after `part_length` characters. Either half may come back empty
    /// when the identifier is too short; callers decide how to reject that.
    pub fn split(raw: &'a str, part_length: usize) -> Self {
        let at = raw
            .char_indices()
            .nth(part_length)
            .map(|(idx, _)| idx)
            .unwrap_or(raw.len());
        let (key1, key2) = raw.split_at(at);
        Self { key1, key2 }
    }

    pub fn is_complete(&self) -> bool {
        !self.key1.is_empty() && !self.key2.is_empty()
    }
}
