//! Authenticated transaction runtime around [`FileRegistry`].

use crate::errors::*;
use crate::registry::FileRegistry;
use crate::snapshot::RegistrySnapshot;
use async_trait::async_trait;
use filechain_auth::{AuthPurpose, AuthorizationProof, Challenge, ChallengeIssuer};
use filechain_types::{ContentId, FileRecord, OwnerId, SystemTimeSource, TimeSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Registry operations as the orchestrator consumes them.
///
/// Mutating calls are authenticated transactions: the caller is the owner of
/// the attached proof, never a client-supplied value.
#[async_trait]
pub trait RegistryRuntime: Send + Sync {
    /// Issue a `RegistryWrite` challenge bound to `owner`.
    async fn request_challenge(&self, owner: OwnerId) -> Result<Challenge>;

    async fn upload_file(
        &self,
        proof: AuthorizationProof,
        cid: ContentId,
        name: String,
    ) -> Result<FileRecord>;

    async fn delete_file(&self, proof: AuthorizationProof, cid: ContentId) -> Result<FileRecord>;

    async fn file_exists(&self, owner: OwnerId, cid: &ContentId) -> Result<bool>;

    async fn get_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryAction {
    Upload { cid: ContentId, name: String },
    Delete { cid: ContentId },
}

/// A signed transaction naming the collection it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryCall {
    pub owner: OwnerId,
    pub action: RegistryAction,
    pub proof: AuthorizationProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReceipt {
    Added(FileRecord),
    Deleted(FileRecord),
}

/// In-process registry runtime.
///
/// Mutations are committed one at a time. When a snapshot path is configured
/// each commit is written to disk before it is acknowledged; a failed write
/// reverts the in-memory change so callers never see an acknowledged commit
/// that was not persisted.
pub struct LocalRegistryRuntime {
    registry: Arc<FileRegistry>,
    issuer: ChallengeIssuer,
    snapshot_path: Option<PathBuf>,
    commit_lock: Mutex<()>,
}

impl LocalRegistryRuntime {
    pub fn new(registry: Arc<FileRegistry>, issuer: ChallengeIssuer) -> Self {
        Self {
            registry,
            issuer,
            snapshot_path: None,
            commit_lock: Mutex::new(()),
        }
    }

    /// In-memory runtime on the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(FileRegistry::new()), ChallengeIssuer::new())
    }

    /// Open a runtime persisted at `path`, loading existing state if present.
    pub fn open(path: &Path, challenge_ttl_secs: u64) -> Result<Self> {
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let registry = match RegistrySnapshot::load_from(path)? {
            Some(snapshot) => FileRegistry::restore(snapshot, clock.clone())?,
            None => FileRegistry::with_clock(clock.clone()),
        };
        debug!(path = %path.display(), owners = registry.owners().len(), "registry opened");
        Ok(Self {
            registry: Arc::new(registry),
            issuer: ChallengeIssuer::with_clock(challenge_ttl_secs, clock),
            snapshot_path: Some(path.to_path_buf()),
            commit_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    pub fn issuer(&self) -> &ChallengeIssuer {
        &self.issuer
    }

    fn persist(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => self.registry.snapshot().save_to(path),
            None => Ok(()),
        }
    }

    /// Read under the commit lock, so a change that is still being persisted
    /// (and may yet be reverted) is never observed.
    fn committed<T>(&self, read: impl FnOnce(&FileRegistry) -> T) -> T {
        let _commit = self.commit_lock.lock();
        read(&self.registry)
    }

    /// Execute one authenticated transaction.
    ///
    /// The proof is verified (and its challenge consumed) first; the verified
    /// owner is then the caller checked against `call.owner`.
    pub fn submit(&self, call: RegistryCall) -> Result<CallReceipt> {
        let verified = self.issuer.verify(&call.proof, AuthPurpose::RegistryWrite)?;
        let caller = verified.owner();

        let _commit = self.commit_lock.lock();
        match call.action {
            RegistryAction::Upload { cid, name } => {
                let record = self.registry.add(&caller, &call.owner, cid, name)?;
                if let Err(e) = self.persist() {
                    error!(error = %e, cid = %record.cid, "failed to persist add, reverting");
                    self.registry.revert_add(&call.owner, &record.cid);
                    return Err(e);
                }
                Ok(CallReceipt::Added(record))
            }
            RegistryAction::Delete { cid } => {
                let (index, record) = self.registry.delete_indexed(&caller, &call.owner, &cid)?;
                if let Err(e) = self.persist() {
                    error!(error = %e, cid = %cid, "failed to persist delete, reverting");
                    self.registry.revert_delete(&call.owner, index, record);
                    return Err(e);
                }
                Ok(CallReceipt::Deleted(record))
            }
        }
    }
}

impl Default for LocalRegistryRuntime {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl RegistryRuntime for LocalRegistryRuntime {
    async fn request_challenge(&self, owner: OwnerId) -> Result<Challenge> {
        Ok(self.issuer.issue(owner, AuthPurpose::RegistryWrite))
    }

    async fn upload_file(
        &self,
        proof: AuthorizationProof,
        cid: ContentId,
        name: String,
    ) -> Result<FileRecord> {
        let call = RegistryCall {
            owner: proof.owner,
            action: RegistryAction::Upload { cid, name },
            proof,
        };
        match self.submit(call)? {
            CallReceipt::Added(record) => {
                info!(cid = %record.cid, "uploadFile committed");
                Ok(record)
            }
            CallReceipt::Deleted(record) => Err(RegistryError::Persistence(format!(
                "unexpected delete receipt for {}",
                record.cid
            ))),
        }
    }

    async fn delete_file(&self, proof: AuthorizationProof, cid: ContentId) -> Result<FileRecord> {
        let call = RegistryCall {
            owner: proof.owner,
            action: RegistryAction::Delete { cid },
            proof,
        };
        match self.submit(call)? {
            CallReceipt::Deleted(record) => {
                info!(cid = %record.cid, "deleteFile committed");
                Ok(record)
            }
            CallReceipt::Added(record) => Err(RegistryError::Persistence(format!(
                "unexpected add receipt for {}",
                record.cid
            ))),
        }
    }

    async fn file_exists(&self, owner: OwnerId, cid: &ContentId) -> Result<bool> {
        Ok(self.committed(|registry| registry.exists(&owner, cid)))
    }

    async fn get_files(&self, owner: OwnerId) -> Result<Vec<FileRecord>> {
        Ok(self.committed(|registry| registry.list(&owner)))
    }
}
