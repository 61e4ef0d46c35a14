//! Registry record for a registered file.

use crate::content_id::ContentId;
use serde::{Deserialize, Serialize};

/// One entry in an owner's registry collection.
///
/// Records are never mutated in place; they are created by a committed add
/// and destroyed by a committed delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Identifier of the ciphertext blob in the off-chain store.
    pub cid: ContentId,
    /// Original filename. Informational only, not unique.
    pub name: String,
    /// Commit time in seconds since the Unix epoch, assigned by the registry.
    pub timestamp: u64,
}

impl FileRecord {
    pub fn new(cid: ContentId, name: impl Into<String>, timestamp: u64) -> Self {
        Self {
            cid,
            name: name.into(),
            timestamp,
        }
    }
}
