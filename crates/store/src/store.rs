use crate::errors::*;
use crate::types::*;
use async_trait::async_trait;
use filechain_auth::{AuthorizationProof, Challenge};
use filechain_types::{ContentId, OwnerId};

/// Off-chain encrypted object store, as consumed by the orchestrator.
///
/// Calls that write or enumerate the store are gated by an API key; key
/// release is gated by a wallet proof.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue a `KeyAccess` challenge bound to `owner`.
    async fn issue_challenge(&self, owner: OwnerId) -> Result<Challenge>;

    /// Encrypt and store `data` for `owner`. Identical bytes always map to
    /// the same content id.
    async fn upload(
        &self,
        api_key: &str,
        data: &[u8],
        file_name: &str,
        owner: OwnerId,
    ) -> Result<UploadReceipt>;

    /// Remove one upload record. The blob goes once nothing references it.
    async fn delete(&self, api_key: &str, record_id: RecordId) -> Result<()>;

    /// Upload records after `cursor`, oldest first.
    async fn list_uploads(&self, api_key: &str, cursor: Option<RecordId>) -> Result<UploadPage>;

    async fn get_metadata(&self, cid: &ContentId) -> Result<ObjectMetadata>;

    /// Release the decryption key to a verified owner on the access list.
    async fn fetch_key(&self, cid: &ContentId, proof: AuthorizationProof) -> Result<DecryptionKey>;

    async fn decrypt(&self, cid: &ContentId, key: &DecryptionKey, mime_type: &str)
        -> Result<Vec<u8>>;
}
