//! File registry state machine
//!
//! Owner identity -> insertion-ordered collection of [`FileRecord`]s.
//! Content identifiers are unique within one owner's collection; different
//! owners may register the same identifier independently.

use crate::errors::*;
use crate::snapshot::{OwnerCollection, RegistrySnapshot};
use filechain_types::{ContentId, FileRecord, OwnerId, SystemTimeSource, TimeSource};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Collection = Arc<Mutex<Vec<FileRecord>>>;

/// Authoritative per-owner file registry.
///
/// The outer map is only write-locked to create an owner's collection; every
/// add/delete/exists against one owner is serialised by that owner's mutex,
/// which makes the registry linearizable per owner.
pub struct FileRegistry {
    collections: RwLock<HashMap<OwnerId, Collection>>,
    clock: Arc<dyn TimeSource>,
}

impl FileRegistry {
    /// Create an empty registry on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTimeSource))
    }

    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn collection(&self, owner: &OwnerId) -> Option<Collection> {
        self.collections.read().get(owner).cloned()
    }

    fn collection_or_create(&self, owner: OwnerId) -> Collection {
        if let Some(existing) = self.collection(&owner) {
            return existing;
        }
        self.collections.write().entry(owner).or_default().clone()
    }

    fn ensure_caller(caller: &OwnerId, owner: &OwnerId) -> Result<()> {
        if caller != owner {
            warn!(caller = %caller, owner = %owner, "rejected cross-owner mutation");
            return Err(RegistryError::OwnerMismatch {
                caller: caller.to_address(),
                owner: owner.to_address(),
            });
        }
        Ok(())
    }

    /// Append a record for `cid` to `owner`'s collection.
    ///
    /// The timestamp is taken from the registry clock at commit and never
    /// goes backwards within one collection.
    pub fn add(
        &self,
        caller: &OwnerId,
        owner: &OwnerId,
        cid: ContentId,
        name: impl Into<String>,
    ) -> Result<FileRecord> {
        Self::ensure_caller(caller, owner)?;

        let collection = self.collection_or_create(*owner);
        let mut records = collection.lock();

        if records.iter().any(|r| r.cid == cid) {
            debug!(owner = %owner, cid = %cid, "duplicate add rejected");
            return Err(RegistryError::DuplicateCid {
                cid: cid.to_string(),
            });
        }

        let now = self.clock.now_secs();
        let timestamp = records.last().map_or(now, |last| now.max(last.timestamp));
        let record = FileRecord::new(cid, name, timestamp);
        records.push(record.clone());

        info!(owner = %owner, cid = %record.cid, name = %record.name, "file registered");
        Ok(record)
    }

    /// Whether `owner` has a record for `cid`.
    pub fn exists(&self, owner: &OwnerId, cid: &ContentId) -> bool {
        self.collection(owner)
            .map(|c| c.lock().iter().any(|r| &r.cid == cid))
            .unwrap_or(false)
    }

    /// `owner`'s records in insertion order.
    pub fn list(&self, owner: &OwnerId) -> Vec<FileRecord> {
        self.collection(owner)
            .map(|c| c.lock().clone())
            .unwrap_or_default()
    }

    pub fn count(&self, owner: &OwnerId) -> usize {
        self.collection(owner).map(|c| c.lock().len()).unwrap_or(0)
    }

    /// Remove the record for `cid`, keeping the relative order of the rest.
    pub fn delete(&self, caller: &OwnerId, owner: &OwnerId, cid: &ContentId) -> Result<FileRecord> {
        self.delete_indexed(caller, owner, cid).map(|(_, record)| record)
    }

    pub(crate) fn delete_indexed(
        &self,
        caller: &OwnerId,
        owner: &OwnerId,
        cid: &ContentId,
    ) -> Result<(usize, FileRecord)> {
        Self::ensure_caller(caller, owner)?;

        let not_found = || RegistryError::NotFound {
            cid: cid.to_string(),
        };
        let collection = self.collection(owner).ok_or_else(not_found)?;
        let mut records = collection.lock();
        let index = records
            .iter()
            .position(|r| &r.cid == cid)
            .ok_or_else(not_found)?;
        let removed = records.remove(index);

        info!(owner = %owner, cid = %cid, "file unregistered");
        Ok((index, removed))
    }

    /// Undo a just-committed add. Used when the commit could not be made durable.
    pub(crate) fn revert_add(&self, owner: &OwnerId, cid: &ContentId) {
        if let Some(collection) = self.collection(owner) {
            let mut records = collection.lock();
            if records.last().map(|r| &r.cid) == Some(cid) {
                records.pop();
            } else {
                records.retain(|r| &r.cid != cid);
            }
        }
    }

    /// Undo a just-committed delete, restoring the record at its old position.
    pub(crate) fn revert_delete(&self, owner: &OwnerId, index: usize, record: FileRecord) {
        let collection = self.collection_or_create(*owner);
        let mut records = collection.lock();
        if records.iter().any(|r| r.cid == record.cid) {
            return;
        }
        let index = index.min(records.len());
        records.insert(index, record);
    }

    /// Owners that currently have a (possibly empty) collection.
    pub fn owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self.collections.read().keys().copied().collect();
        owners.sort();
        owners
    }

    /// Point-in-time copy of every non-empty collection.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let owners = self
            .owners()
            .into_iter()
            .filter_map(|owner| {
                let files = self.list(&owner);
                (!files.is_empty()).then_some(OwnerCollection { owner, files })
            })
            .collect();
        RegistrySnapshot::new(owners)
    }

    /// Rebuild a registry from a snapshot, rejecting snapshots that break
    /// per-owner uniqueness.
    pub fn restore(snapshot: RegistrySnapshot, clock: Arc<dyn TimeSource>) -> Result<Self> {
        snapshot.validate()?;
        let mut collections = HashMap::new();
        for OwnerCollection { owner, files } in snapshot.owners {
            collections.insert(owner, Arc::new(Mutex::new(files)));
        }
        Ok(Self {
            collections: RwLock::new(collections),
            clock,
        })
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRegistry")
            .field("owners", &self.collections.read().len())
            .finish()
    }
}
