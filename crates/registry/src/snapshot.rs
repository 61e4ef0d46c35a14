//! JSON persistence for registry state.

use crate::errors::*;
use filechain_types::{FileRecord, OwnerId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerCollection {
    pub owner: OwnerId,
    pub files: Vec<FileRecord>,
}

/// Serialisable image of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub owners: Vec<OwnerCollection>,
}

impl RegistrySnapshot {
    pub fn new(owners: Vec<OwnerCollection>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            owners,
        }
    }

    /// Check the per-owner uniqueness invariant and that no owner appears twice.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(RegistryError::Persistence(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }

        let mut seen_owners = HashSet::new();
        for collection in &self.owners {
            if !seen_owners.insert(collection.owner) {
                return Err(RegistryError::Persistence(format!(
                    "owner {} appears more than once",
                    collection.owner
                )));
            }
            let mut seen = HashSet::new();
            for record in &collection.files {
                if !seen.insert(&record.cid) {
                    return Err(RegistryError::Persistence(format!(
                        "duplicate cid {} for owner {}",
                        record.cid, collection.owner
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&data)?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
