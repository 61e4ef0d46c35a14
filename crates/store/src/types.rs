//! Records and values exchanged with the object store.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use filechain_types::{ContentId, OwnerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Store-internal identifier of one upload. Distinct from the content id:
/// uploading the same bytes twice yields one cid and two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One entry of the store's upload listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: RecordId,
    pub cid: ContentId,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Public key the upload was made for.
    pub owner: OwnerId,
    pub created_at: DateTime<Utc>,
    pub encryption: bool,
}

/// One page of [`UploadRecord`]s plus the total count across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPage {
    pub records: Vec<UploadRecord>,
    pub total: usize,
}

impl UploadPage {
    /// Cursor for the next page, if more records remain.
    pub fn next_cursor(&self) -> Option<RecordId> {
        self.records.last().map(|r| r.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub cid: ContentId,
    pub record_id: RecordId,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub cid: ContentId,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Symmetric key released by `fetch_key`.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey([u8; 32]);

impl DecryptionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}
