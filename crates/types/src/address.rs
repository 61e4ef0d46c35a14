use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur when parsing an owner address string.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address must start with 'f'")]
    InvalidPrefix,
    #[error("address must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("address payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("address payload must be exactly 32 bytes")]
    InvalidPayloadLength,
}

/// Number of raw bytes contained in an address.
pub const ADDRESS_BYTES: usize = 32;
/// Expected string length of an encoded address (prefix + 64 hex chars).
pub const ADDRESS_STRING_LENGTH: usize = 1 + ADDRESS_BYTES * 2;

/// Encode a 32-byte owner key into the human readable address format.
///
/// The encoded address always begins with the character `f` followed by the
/// lowercase hexadecimal representation of the raw bytes.
pub fn encode_address(bytes: &[u8; ADDRESS_BYTES]) -> String {
    let mut encoded = String::with_capacity(ADDRESS_STRING_LENGTH);
    encoded.push('f');
    encoded.push_str(&hex::encode(bytes));
    encoded
}

/// Attempt to decode a human readable address string into the raw bytes.
pub fn decode_address(address: &str) -> Result<[u8; ADDRESS_BYTES], AddressError> {
    if !address.starts_with('f') {
        return Err(AddressError::InvalidPrefix);
    }

    if address.len() != ADDRESS_STRING_LENGTH {
        return Err(AddressError::InvalidLength {
            expected: ADDRESS_STRING_LENGTH,
            actual: address.len(),
        });
    }

    let decoded = hex::decode(&address[1..])?;

    let bytes: [u8; ADDRESS_BYTES] = decoded
        .try_into()
        .map_err(|_| AddressError::InvalidPayloadLength)?;

    Ok(bytes)
}

/// Owner identity: the ed25519 verifying key that controls a wallet.
///
/// Used both as the registry key and as the authorization principal.
/// Serialised as its address string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(pub [u8; ADDRESS_BYTES]);

impl OwnerId {
    pub fn new(key: [u8; ADDRESS_BYTES]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    pub fn to_address(&self) -> String {
        encode_address(&self.0)
    }

    /// Parse from either the `f`-prefixed address or bare 64-char hex.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.len() == ADDRESS_BYTES * 2 {
            let decoded = hex::decode(trimmed)?;
            let bytes: [u8; ADDRESS_BYTES] = decoded
                .try_into()
                .map_err(|_| AddressError::InvalidPayloadLength)?;
            return Ok(Self(bytes));
        }
        decode_address(trimmed).map(Self)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_address())
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self.to_address();
        write!(f, "OwnerId({}..{})", &address[..7], &address[address.len() - 4..])
    }
}

impl From<[u8; ADDRESS_BYTES]> for OwnerId {
    fn from(value: [u8; ADDRESS_BYTES]) -> Self {
        OwnerId(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        encode_address(&value.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode_address(&value).map(OwnerId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let bytes = [0xABu8; ADDRESS_BYTES];
        let encoded = encode_address(&bytes);
        assert!(encoded.starts_with('f'));
        assert_eq!(encoded.len(), ADDRESS_STRING_LENGTH);

        let decoded = decode_address(&encoded).expect("address should decode");
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn invalid_prefix_rejected() {
        let bad = "x".to_string() + &"00".repeat(ADDRESS_BYTES);
        let err = decode_address(&bad).unwrap_err();
        assert!(matches!(err, AddressError::InvalidPrefix));
    }

    #[test]
    fn invalid_length_rejected() {
        let bad = "f".to_string() + &"00".repeat(ADDRESS_BYTES - 1);
        let err = decode_address(&bad).unwrap_err();
        assert!(matches!(err, AddressError::InvalidLength { .. }));
    }

    #[test]
    fn invalid_hex_rejected() {
        let bad = format!("f{}", "gg".repeat(ADDRESS_BYTES));
        let err = decode_address(&bad).unwrap_err();
        assert!(matches!(err, AddressError::InvalidHex(_)));
    }

    #[test]
    fn owner_parses_bare_hex_and_address() {
        let owner = OwnerId::new([7u8; ADDRESS_BYTES]);
        assert_eq!(OwnerId::parse(&owner.to_address()).unwrap(), owner);
        assert_eq!(OwnerId::parse(&hex::encode([7u8; 32])).unwrap(), owner);
    }

    #[test]
    fn bare_hex_starting_with_f_parses() {
        let owner = OwnerId::new([0xF0u8; ADDRESS_BYTES]);
        let bare = hex::encode(owner.as_bytes());
        assert!(bare.starts_with('f'));
        assert_eq!(OwnerId::parse(&bare).unwrap(), owner);
        assert_eq!(OwnerId::parse(&owner.to_address()).unwrap(), owner);
    }

    #[test]
    fn owner_serializes_as_address_string() {
        let owner = OwnerId::new([1u8; ADDRESS_BYTES]);
        let json = serde_json::to_string(&owner).unwrap();
        assert_eq!(json, format!("\"{}\"", owner.to_address()));
        let back: OwnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, owner);
    }
}
