//! Content identifiers for blobs held by the off-chain store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Multihash code for sha2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;
/// Digest length prefix for a 32-byte sha2-256 multihash.
const MULTIHASH_DIGEST_LEN: u8 = 0x20;
/// Upper bound on identifier length accepted by [`ContentId::parse`].
pub const MAX_CONTENT_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("content identifier is empty")]
    Empty,
    #[error("content identifier exceeds {max} characters")]
    TooLong { max: usize },
    #[error("content identifier contains whitespace")]
    Whitespace,
}

/// Opaque identifier of a blob in the off-chain store.
///
/// The registry never interprets the value; it is compared byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Derive a CIDv0-style identifier from raw content.
    ///
    /// base58btc(`0x12 0x20 || sha256(data)`), so the result always starts
    /// with `Qm` and identical input always yields the same identifier.
    pub fn for_content(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut multihash = Vec::with_capacity(2 + digest.len());
        multihash.push(MULTIHASH_SHA2_256);
        multihash.push(MULTIHASH_DIGEST_LEN);
        multihash.extend_from_slice(&digest);
        Self(bs58::encode(multihash).into_string())
    }

    /// Accept an identifier produced elsewhere.
    pub fn parse(value: impl Into<String>) -> Result<Self, ContentIdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ContentIdError::Empty);
        }
        if value.len() > MAX_CONTENT_ID_LEN {
            return Err(ContentIdError::TooLong {
                max: MAX_CONTENT_ID_LEN,
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ContentIdError::Whitespace);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_cid_v0_shaped() {
        let cid = ContentId::for_content(b"hello world");
        assert!(cid.as_str().starts_with("Qm"));
        assert_eq!(cid.as_str().len(), 46);
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(
            ContentId::for_content(b"report"),
            ContentId::for_content(b"report")
        );
        assert_ne!(
            ContentId::for_content(b"report"),
            ContentId::for_content(b"report2")
        );
    }

    #[test]
    fn known_vector_matches_ipfs() {
        // base58 of the sha2-256 multihash of the empty input
        let cid = ContentId::for_content(b"");
        assert_eq!(cid.as_str(), "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(ContentId::parse(""), Err(ContentIdError::Empty));
        assert_eq!(ContentId::parse("Qm 1"), Err(ContentIdError::Whitespace));
        assert!(matches!(
            ContentId::parse("Q".repeat(MAX_CONTENT_ID_LEN + 1)),
            Err(ContentIdError::TooLong { .. })
        ));
        assert_eq!(ContentId::parse("Qm123").unwrap().as_str(), "Qm123");
    }
}
