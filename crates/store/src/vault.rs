//! Encrypted object store over a pluggable blob backend.

use crate::blobs::{BlobBackend, DiskBlobs, MemoryBlobs};
use crate::cipher;
use crate::errors::*;
use crate::mime::guess_mime_type;
use crate::store::ObjectStore;
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use filechain_auth::{AuthPurpose, AuthorizationProof, Challenge, ChallengeIssuer};
use filechain_types::{ContentId, OwnerId, SystemTimeSource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records returned per `list_uploads` call.
pub const DEFAULT_PAGE_SIZE: usize = 100;

const INDEX_FILE: &str = "index.json";

/// In-process store, nothing touches disk.
pub type MemoryObjectStore = EncryptedStore<MemoryBlobs>;
/// Store persisted under a directory: `objects/` for blobs, `index.json` for
/// records and key vault.
pub type LocalObjectStore = EncryptedStore<DiskBlobs>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntry {
    key_hex: String,
    access: Vec<OwnerId>,
}

impl KeyEntry {
    fn key(&self) -> Result<DecryptionKey> {
        let bytes: [u8; 32] = hex::decode(&self.key_hex)
            .map_err(|e| StoreError::Crypto(format!("corrupt key entry: {e}")))?
            .try_into()
            .map_err(|_| StoreError::Crypto("corrupt key entry: wrong length".into()))?;
        Ok(DecryptionKey::from_bytes(bytes))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultIndex {
    records: Vec<UploadRecord>,
    keys: HashMap<ContentId, KeyEntry>,
}

/// Content-addressed store that keeps every blob sealed under a per-object key.
pub struct EncryptedStore<B: BlobBackend> {
    blobs: B,
    index: RwLock<VaultIndex>,
    index_path: Option<PathBuf>,
    api_key: String,
    issuer: ChallengeIssuer,
    page_size: usize,
}

impl EncryptedStore<MemoryBlobs> {
    pub fn in_memory(api_key: impl Into<String>) -> Self {
        Self::with_backend(MemoryBlobs::new(), api_key, ChallengeIssuer::new())
    }
}

impl EncryptedStore<DiskBlobs> {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path, api_key: impl Into<String>, challenge_ttl_secs: u64) -> Result<Self> {
        let blobs = DiskBlobs::open(root)?;
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            serde_json::from_str(&fs::read_to_string(&index_path)?)?
        } else {
            VaultIndex::default()
        };
        let issuer = ChallengeIssuer::with_clock(challenge_ttl_secs, Arc::new(SystemTimeSource));

        let mut store = Self::with_backend(blobs, api_key, issuer);
        store.index = RwLock::new(index);
        store.index_path = Some(index_path);
        Ok(store)
    }
}

impl<B: BlobBackend> EncryptedStore<B> {
    pub fn with_backend(blobs: B, api_key: impl Into<String>, issuer: ChallengeIssuer) -> Self {
        Self {
            blobs,
            index: RwLock::new(VaultIndex::default()),
            index_path: None,
            api_key: api_key.into(),
            issuer,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn check_api_key(&self, api_key: &str) -> Result<()> {
        if api_key != self.api_key {
            warn!("rejected call with invalid API key");
            return Err(StoreError::InvalidApiKey);
        }
        Ok(())
    }

    fn persist(&self, index: &VaultIndex) -> Result<()> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(index)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Number of upload records currently held.
    pub fn record_count(&self) -> usize {
        self.index.read().records.len()
    }

    /// Whether ciphertext for `cid` is currently stored.
    pub fn holds_blob(&self, cid: &ContentId) -> Result<bool> {
        self.blobs.contains(cid)
    }
}

#[async_trait]
impl<B: BlobBackend> ObjectStore for EncryptedStore<B> {
    async fn issue_challenge(&self, owner: OwnerId) -> Result<Challenge> {
        Ok(self.issuer.issue(owner, AuthPurpose::KeyAccess))
    }

    async fn upload(
        &self,
        api_key: &str,
        data: &[u8],
        file_name: &str,
        owner: OwnerId,
    ) -> Result<UploadReceipt> {
        self.check_api_key(api_key)?;
        let cid = ContentId::for_content(data);

        let mut index = self.index.write();
        let existing = index.keys.get(&cid).cloned();
        let key = match &existing {
            Some(entry) => entry.key()?,
            None => cipher::generate_key(),
        };

        if !self.blobs.contains(&cid)? {
            self.blobs.put(&cid, cipher::seal(&key, data)?)?;
        }

        let mut entry = existing.clone().unwrap_or_else(|| KeyEntry {
            key_hex: hex::encode(key.as_bytes()),
            access: Vec::new(),
        });
        if !entry.access.contains(&owner) {
            entry.access.push(owner);
        }
        index.keys.insert(cid.clone(), entry);

        let record = UploadRecord {
            id: RecordId::new(),
            cid: cid.clone(),
            file_name: file_name.to_string(),
            mime_type: guess_mime_type(file_name).to_string(),
            size_bytes: data.len() as u64,
            owner,
            created_at: Utc::now(),
            encryption: true,
        };
        let record_id = record.id;
        index.records.push(record);

        if let Err(e) = self.persist(&index) {
            index.records.pop();
            match existing {
                Some(entry) => {
                    index.keys.insert(cid.clone(), entry);
                }
                None => {
                    index.keys.remove(&cid);
                    self.blobs.remove(&cid)?;
                }
            }
            return Err(e);
        }

        info!(cid = %cid, record = %record_id, owner = %owner, bytes = data.len(), "object stored");
        Ok(UploadReceipt {
            cid,
            record_id,
            size_bytes: data.len() as u64,
        })
    }

    async fn delete(&self, api_key: &str, record_id: RecordId) -> Result<()> {
        self.check_api_key(api_key)?;

        let mut index = self.index.write();
        let position = index
            .records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("upload record {record_id}")))?;
        let removed = index.records.remove(position);
        let previous_entry = index.keys.get(&removed.cid).cloned();

        let cid_still_referenced = index.records.iter().any(|r| r.cid == removed.cid);
        let owner_still_references = index
            .records
            .iter()
            .any(|r| r.cid == removed.cid && r.owner == removed.owner);

        if !cid_still_referenced {
            index.keys.remove(&removed.cid);
        } else if !owner_still_references {
            if let Some(entry) = index.keys.get_mut(&removed.cid) {
                entry.access.retain(|o| o != &removed.owner);
            }
        }

        if let Err(e) = self.persist(&index) {
            if let Some(entry) = previous_entry {
                index.keys.insert(removed.cid.clone(), entry);
            }
            index.records.insert(position, removed);
            return Err(e);
        }
        if !cid_still_referenced {
            self.blobs.remove(&removed.cid)?;
        }

        info!(cid = %removed.cid, record = %record_id, blob_removed = !cid_still_referenced, "upload deleted");
        Ok(())
    }

    async fn list_uploads(&self, api_key: &str, cursor: Option<RecordId>) -> Result<UploadPage> {
        self.check_api_key(api_key)?;

        let index = self.index.read();
        let start = match cursor {
            None => 0,
            Some(cursor) => {
                index
                    .records
                    .iter()
                    .position(|r| r.id == cursor)
                    .ok_or_else(|| StoreError::NotFound(format!("cursor {cursor}")))?
                    + 1
            }
        };

        Ok(UploadPage {
            records: index
                .records
                .iter()
                .skip(start)
                .take(self.page_size)
                .cloned()
                .collect(),
            total: index.records.len(),
        })
    }

    async fn get_metadata(&self, cid: &ContentId) -> Result<ObjectMetadata> {
        let index = self.index.read();
        let record = index
            .records
            .iter()
            .rev()
            .find(|r| &r.cid == cid)
            .ok_or_else(|| StoreError::NotFound(format!("object {cid}")))?;
        Ok(ObjectMetadata {
            cid: record.cid.clone(),
            file_name: record.file_name.clone(),
            mime_type: record.mime_type.clone(),
            size_bytes: record.size_bytes,
        })
    }

    async fn fetch_key(&self, cid: &ContentId, proof: AuthorizationProof) -> Result<DecryptionKey> {
        let verified = self.issuer.verify(&proof, AuthPurpose::KeyAccess)?;

        let index = self.index.read();
        let entry = index
            .keys
            .get(cid)
            .ok_or_else(|| StoreError::NotFound(format!("object {cid}")))?;
        if !entry.access.contains(&verified.owner()) {
            warn!(cid = %cid, owner = %verified.owner(), "key request from owner without access");
            return Err(StoreError::AccessDenied(format!(
                "{} has no access to {cid}",
                verified.owner()
            )));
        }

        debug!(cid = %cid, owner = %verified.owner(), "decryption key released");
        entry.key()
    }

    async fn decrypt(
        &self,
        cid: &ContentId,
        key: &DecryptionKey,
        mime_type: &str,
    ) -> Result<Vec<u8>> {
        let sealed = self
            .blobs
            .get(cid)?
            .ok_or_else(|| StoreError::NotFound(format!("object {cid}")))?;
        let plaintext = cipher::open(key, &sealed)?;
        debug!(cid = %cid, mime_type, bytes = plaintext.len(), "object decrypted");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filechain_auth::{LocalWallet, WalletSigner};
    use tempfile::tempdir;

    const API_KEY: &str = "test-api-key";

    async fn key_proof<B: BlobBackend>(
        store: &EncryptedStore<B>,
        wallet: &LocalWallet,
    ) -> AuthorizationProof {
        let challenge = store.issue_challenge(wallet.address()).await.unwrap();
        let signature = wallet.sign_message(&challenge.message()).await.unwrap();
        AuthorizationProof::new(wallet.address(), challenge, signature)
    }

    #[tokio::test]
    async fn upload_fetch_key_decrypt() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let wallet = LocalWallet::from_secret([1u8; 32]);

        let receipt = store
            .upload(API_KEY, b"quarterly numbers", "report.pdf", wallet.address())
            .await
            .unwrap();
        assert_eq!(receipt.cid, ContentId::for_content(b"quarterly numbers"));

        let metadata = store.get_metadata(&receipt.cid).await.unwrap();
        assert_eq!(metadata.mime_type, "application/pdf");
        assert_eq!(metadata.file_name, "report.pdf");

        let key = store
            .fetch_key(&receipt.cid, key_proof(&store, &wallet).await)
            .await
            .unwrap();
        let plaintext = store
            .decrypt(&receipt.cid, &key, &metadata.mime_type)
            .await
            .unwrap();
        assert_eq!(plaintext, b"quarterly numbers");
    }

    #[tokio::test]
    async fn same_bytes_same_cid_new_record() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let owner = LocalWallet::from_secret([1u8; 32]).address();

        let first = store.upload(API_KEY, b"same", "a.txt", owner).await.unwrap();
        let second = store.upload(API_KEY, b"same", "b.txt", owner).await.unwrap();
        assert_eq!(first.cid, second.cid);
        assert_ne!(first.record_id, second.record_id);
        assert_eq!(store.record_count(), 2);
    }

    #[tokio::test]
    async fn invalid_api_key_rejected() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let owner = OwnerId::new([1u8; 32]);
        assert_eq!(
            store.upload("wrong", b"x", "x", owner).await.unwrap_err(),
            StoreError::InvalidApiKey
        );
        assert_eq!(
            store.list_uploads("wrong", None).await.unwrap_err(),
            StoreError::InvalidApiKey
        );
    }

    #[tokio::test]
    async fn key_withheld_from_owner_without_access() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let owner = LocalWallet::from_secret([1u8; 32]);
        let stranger = LocalWallet::from_secret([2u8; 32]);
        let receipt = store
            .upload(API_KEY, b"private", "p.txt", owner.address())
            .await
            .unwrap();

        let err = store
            .fetch_key(&receipt.cid, key_proof(&store, &stranger).await)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn bad_proof_rejected() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let owner = LocalWallet::from_secret([1u8; 32]);
        let receipt = store
            .upload(API_KEY, b"private", "p.txt", owner.address())
            .await
            .unwrap();

        let mut proof = key_proof(&store, &owner).await;
        proof.signature = vec![0u8; 64];
        let err = store.fetch_key(&receipt.cid, proof).await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn delete_keeps_blob_while_referenced() {
        let store = MemoryObjectStore::in_memory(API_KEY);
        let owner = OwnerId::new([1u8; 32]);
        let first = store.upload(API_KEY, b"dup", "a", owner).await.unwrap();
        let second = store.upload(API_KEY, b"dup", "b", owner).await.unwrap();

        store.delete(API_KEY, first.record_id).await.unwrap();
        assert!(store.holds_blob(&first.cid).unwrap());

        store.delete(API_KEY, second.record_id).await.unwrap();
        assert!(!store.holds_blob(&first.cid).unwrap());
        assert!(matches!(
            store.get_metadata(&first.cid).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(API_KEY, second.record_id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_index_write_keeps_deleted_record() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path(), API_KEY, 60).unwrap();
        let wallet = LocalWallet::from_secret([1u8; 32]);
        let other = OwnerId::new([2u8; 32]);
        let receipt = store
            .upload(API_KEY, b"shared", "a.txt", wallet.address())
            .await
            .unwrap();
        let kept = store.upload(API_KEY, b"shared", "b.txt", other).await.unwrap();

        // a directory in place of the temp index makes the write fail
        let tmp = dir.path().join(INDEX_FILE).with_extension("json.tmp");
        fs::create_dir_all(&tmp).unwrap();
        let err = store.delete(API_KEY, receipt.record_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.record_count(), 2);
        assert!(store.holds_blob(&receipt.cid).unwrap());
        let key = store.fetch_key(&receipt.cid, key_proof(&store, &wallet).await).await;
        assert!(key.is_ok());

        fs::remove_dir(&tmp).unwrap();
        store.delete(API_KEY, receipt.record_id).await.unwrap();
        store.delete(API_KEY, kept.record_id).await.unwrap();
        assert_eq!(store.record_count(), 0);

        let reopened = LocalObjectStore::open(dir.path(), API_KEY, 60).unwrap();
        assert_eq!(reopened.record_count(), 0);
        assert!(!reopened.holds_blob(&receipt.cid).unwrap());
    }

    #[tokio::test]
    async fn listing_pages_with_cursor() {
        let store = MemoryObjectStore::in_memory(API_KEY).with_page_size(2);
        let owner = OwnerId::new([1u8; 32]);
        for i in 0..5u8 {
            store
                .upload(API_KEY, &[i], &format!("f{i}"), owner)
                .await
                .unwrap();
        }

        let mut cursor = None;
        let mut seen = Vec::new();
        loop {
            let page = store.list_uploads(API_KEY, cursor).await.unwrap();
            assert_eq!(page.total, 5);
            if page.records.is_empty() {
                break;
            }
            seen.extend(page.records.iter().map(|r| r.file_name.clone()));
            cursor = page.next_cursor();
        }
        assert_eq!(seen, vec!["f0", "f1", "f2", "f3", "f4"]);
    }

    #[tokio::test]
    async fn local_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let wallet = LocalWallet::from_secret([1u8; 32]);
        let cid = {
            let store = LocalObjectStore::open(dir.path(), API_KEY, 60).unwrap();
            store
                .upload(API_KEY, b"persisted", "keep.txt", wallet.address())
                .await
                .unwrap()
                .cid
        };

        let store = LocalObjectStore::open(dir.path(), API_KEY, 60).unwrap();
        let key = store
            .fetch_key(&cid, key_proof(&store, &wallet).await)
            .await
            .unwrap();
        let plaintext = store.decrypt(&cid, &key, "text/plain").await.unwrap();
        assert_eq!(plaintext, b"persisted");
    }
}
