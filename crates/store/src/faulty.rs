//! Failure-injecting wrapper for exercising recovery paths.

use crate::errors::*;
use crate::store::ObjectStore;
use crate::types::*;
use async_trait::async_trait;
use filechain_auth::{AuthorizationProof, Challenge};
use filechain_types::{ContentId, OwnerId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    IssueChallenge,
    Upload,
    Delete,
    ListUploads,
    GetMetadata,
    FetchKey,
    Decrypt,
}

/// Delegates to `inner` except for operations marked as failing, which
/// return [`StoreError::Unavailable`] without reaching the inner store.
pub struct FaultyStore<S> {
    inner: S,
    /// Calls still let through before each failing operation starts failing.
    failing: Mutex<HashMap<StoreOp, usize>>,
}

impl<S: ObjectStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `calls` more calls of `op` through, then fail the rest.
    pub fn fail_after(&self, op: StoreOp, calls: usize) {
        self.failing.lock().insert(op, calls);
    }

    pub fn heal(&self, op: StoreOp) {
        self.failing.lock().remove(&op);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        match self.failing.lock().get_mut(&op) {
            None => Ok(()),
            Some(0) => Err(StoreError::Unavailable(format!("injected failure on {op:?}"))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for FaultyStore<S> {
    async fn issue_challenge(&self, owner: OwnerId) -> Result<Challenge> {
        self.check(StoreOp::IssueChallenge)?;
        self.inner.issue_challenge(owner).await
    }

    async fn upload(
        &self,
        api_key: &str,
        data: &[u8],
        file_name: &str,
        owner: OwnerId,
    ) -> Result<UploadReceipt> {
        self.check(StoreOp::Upload)?;
        self.inner.upload(api_key, data, file_name, owner).await
    }

    async fn delete(&self, api_key: &str, record_id: RecordId) -> Result<()> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(api_key, record_id).await
    }

    async fn list_uploads(&self, api_key: &str, cursor: Option<RecordId>) -> Result<UploadPage> {
        self.check(StoreOp::ListUploads)?;
        self.inner.list_uploads(api_key, cursor).await
    }

    async fn get_metadata(&self, cid: &ContentId) -> Result<ObjectMetadata> {
        self.check(StoreOp::GetMetadata)?;
        self.inner.get_metadata(cid).await
    }

    async fn fetch_key(&self, cid: &ContentId, proof: AuthorizationProof) -> Result<DecryptionKey> {
        self.check(StoreOp::FetchKey)?;
        self.inner.fetch_key(cid, proof).await
    }

    async fn decrypt(
        &self,
        cid: &ContentId,
        key: &DecryptionKey,
        mime_type: &str,
    ) -> Result<Vec<u8>> {
        self.check(StoreOp::Decrypt)?;
        self.inner.decrypt(cid, key, mime_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryObjectStore;

    #[tokio::test]
    async fn injected_failure_then_heal() {
        let store = FaultyStore::new(MemoryObjectStore::in_memory("k"));
        let owner = OwnerId::new([1u8; 32]);

        store.fail(StoreOp::Upload);
        assert!(matches!(
            store.upload("k", b"x", "x", owner).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.inner().record_count(), 0);

        store.heal(StoreOp::Upload);
        store.upload("k", b"x", "x", owner).await.unwrap();
        assert_eq!(store.inner().record_count(), 1);
    }

    #[tokio::test]
    async fn fails_after_allowed_calls() {
        let store = FaultyStore::new(MemoryObjectStore::in_memory("k"));
        let owner = OwnerId::new([1u8; 32]);

        store.fail_after(StoreOp::Upload, 2);
        store.upload("k", b"a", "a", owner).await.unwrap();
        store.upload("k", b"b", "b", owner).await.unwrap();
        assert!(matches!(
            store.upload("k", b"c", "c", owner).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.inner().record_count(), 2);
    }
}
