use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-supplied key identifying one logical transfer request.
///
/// Retrying a transfer with the same key applies it at most once; the store
/// remembers which ledger entry the key produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyKeyError {
    Empty,
    NotUuid,
}

impl fmt::Display for IdempotencyKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdempotencyKeyError::Empty => write!(f, "idempotency key must not be empty"),
            IdempotencyKeyError::NotUuid => write!(f, "idempotency key must be a valid UUID"),
        }
    }
}

impl std::error::Error for IdempotencyKeyError {}

impl FromStr for IdempotencyKey {
    type Err = IdempotencyKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdempotencyKeyError::Empty);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdempotencyKeyError::NotUuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let key: IdempotencyKey = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(key.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_key_rejects_garbage() {
        assert_eq!("".parse::<IdempotencyKey>(), Err(IdempotencyKeyError::Empty));
        assert_eq!(
            "retry-1".parse::<IdempotencyKey>(),
            Err(IdempotencyKeyError::NotUuid)
        );
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(IdempotencyKey::new(), IdempotencyKey::new());
    }
}
