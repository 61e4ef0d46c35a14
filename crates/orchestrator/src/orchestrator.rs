//! Upload, decrypt and delete flows across the object store and the registry.

use crate::errors::*;
use crate::outcome::*;
use crate::progress::{Flow, FlowStep, ProgressSink, Tracker};
use filechain_auth::{authorize, AuthorizationAttempt, AuthorizationProof, WalletSigner};
use filechain_registry::{RegistryError, RegistryRuntime};
use filechain_store::mime::DEFAULT_MIME_TYPE;
use filechain_store::{ObjectStore, RecordId, StoreError, UploadReceipt};
use filechain_types::{ContentId, FileRecord, OwnerId};
use std::sync::Arc;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

/// Drives the dual-write flows for the owner controlled by one wallet.
///
/// Steps within a flow run strictly in order. The orchestrator holds no locks
/// of its own; the registry runtime's atomic commits decide races, and a
/// `DuplicateCid`/`NotFound` from it is a normal outcome.
pub struct Orchestrator<S, R, W> {
    store: Arc<S>,
    registry: Arc<R>,
    wallet: Arc<W>,
    api_key: String,
}

impl<S, R, W> Orchestrator<S, R, W>
where
    S: ObjectStore,
    R: RegistryRuntime,
    W: WalletSigner,
{
    pub fn new(store: Arc<S>, registry: Arc<R>, wallet: Arc<W>, api_key: impl Into<String>) -> Self {
        Self {
            store,
            registry,
            wallet,
            api_key: api_key.into(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.wallet.address()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// The wallet owner's registered files, in insertion order.
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.registry
            .get_files(self.owner())
            .await
            .map_err(|e| FlowError::registry(FlowStep::RegistryChecked, e))
    }

    /// Encrypt and store `data`, then register it for the wallet owner.
    pub async fn upload(
        &self,
        data: &[u8],
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<UploadReport> {
        let span = info_span!("upload", owner = %self.owner(), cid = field::Empty);
        self.run_upload(data, name, progress).instrument(span).await
    }

    /// Recover the plaintext of `cid`, presenting `name` as its file name.
    pub async fn decrypt(
        &self,
        cid: &ContentId,
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<DecryptedFile> {
        let span = info_span!("decrypt", owner = %self.owner(), cid = %cid);
        self.run_decrypt(cid, name, progress).instrument(span).await
    }

    pub async fn decrypt_record(
        &self,
        record: &FileRecord,
        progress: &dyn ProgressSink,
    ) -> Result<DecryptedFile> {
        self.decrypt(&record.cid, &record.name, progress).await
    }

    /// Remove `cid` from the object store, then from the registry.
    pub async fn delete(&self, cid: &ContentId, progress: &dyn ProgressSink) -> Result<DeleteReport> {
        let span = info_span!("delete", owner = %self.owner(), cid = %cid);
        self.run_delete(cid, progress).instrument(span).await
    }

    async fn run_upload(
        &self,
        data: &[u8],
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<UploadReport> {
        let owner = self.owner();
        let mut tracker = Tracker::start(Flow::Upload, progress);

        let (mut attempt, proof) = self.authorize_registry_write().await?;
        tracker.reached(FlowStep::Authorized);

        let receipt = self
            .store
            .upload(&self.api_key, data, name, owner)
            .await
            .map_err(|e| FlowError::store(FlowStep::Uploaded, e))?;
        Span::current().record("cid", field::display(&receipt.cid));
        debug!(record = %receipt.record_id, bytes = receipt.size_bytes, "ciphertext stored");
        tracker.reached(FlowStep::Uploaded);

        let exists = match self.registry.file_exists(owner, &receipt.cid).await {
            Ok(exists) => exists,
            Err(e) => return Ok(orphaned(receipt, FlowStep::RegistryChecked, e)),
        };
        tracker.reached(FlowStep::RegistryChecked);

        if exists {
            info!("already registered, registry left unchanged");
            tracker.finish(FlowStep::RegistryChecked);
            return Ok(already_registered(receipt, owner));
        }

        let committed = self
            .registry
            .upload_file(proof, receipt.cid.clone(), name.to_string())
            .await;
        record_decision(&mut attempt, committed.as_ref().err());
        match committed {
            Ok(record) => {
                info!(timestamp = record.timestamp, "file registered");
                tracker.finish(FlowStep::Committed);
                Ok(UploadReport {
                    cid: receipt.cid,
                    record_id: receipt.record_id,
                    outcome: FlowOutcome::Success,
                    record: Some(record),
                    detail: None,
                })
            }
            Err(RegistryError::DuplicateCid { .. }) => {
                info!("registered concurrently by another flow");
                tracker.finish(FlowStep::Committed);
                Ok(already_registered(receipt, owner))
            }
            Err(e) => Ok(orphaned(receipt, FlowStep::Committed, e)),
        }
    }

    async fn run_decrypt(
        &self,
        cid: &ContentId,
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<DecryptedFile> {
        let mut tracker = Tracker::start(Flow::Decrypt, progress);

        let challenge = self
            .store
            .issue_challenge(self.owner())
            .await
            .map_err(|e| FlowError::store(FlowStep::Authorized, e))?;
        let (mut attempt, proof) = authorize(self.wallet.as_ref(), challenge)
            .await
            .map_err(|e| FlowError::auth(FlowStep::Authorized, e))?;
        tracker.reached(FlowStep::Authorized);

        let key = match self.store.fetch_key(cid, proof).await {
            Ok(key) => {
                attempt
                    .conclude(true)
                    .map_err(|e| FlowError::auth(FlowStep::KeyFetched, e))?;
                key
            }
            Err(e) => {
                attempt.reject();
                warn!(error = %e, "decryption key refused");
                return Err(FlowError::store(FlowStep::KeyFetched, e));
            }
        };
        tracker.reached(FlowStep::KeyFetched);

        let mime_type = match self.store.get_metadata(cid).await {
            Ok(metadata) if !metadata.mime_type.is_empty() => metadata.mime_type,
            Ok(_) | Err(StoreError::NotFound(_)) => DEFAULT_MIME_TYPE.to_string(),
            Err(e) => return Err(FlowError::store(FlowStep::MetadataFetched, e)),
        };
        tracker.reached(FlowStep::MetadataFetched);

        let bytes = self
            .store
            .decrypt(cid, &key, &mime_type)
            .await
            .map_err(|e| FlowError::store(FlowStep::Decrypted, e))?;
        debug!(mime_type = %mime_type, bytes = bytes.len(), "plaintext recovered");
        tracker.finish(FlowStep::Decrypted);

        Ok(DecryptedFile {
            cid: cid.clone(),
            name: name.to_string(),
            mime_type,
            bytes,
        })
    }

    async fn run_delete(&self, cid: &ContentId, progress: &dyn ProgressSink) -> Result<DeleteReport> {
        let owner = self.owner();
        let mut tracker = Tracker::start(Flow::Delete, progress);

        // Authorization comes first so a bad proof aborts before either layer
        // is touched. The off-chain delete still precedes the on-chain one.
        let (mut attempt, proof) = self.authorize_registry_write().await?;
        tracker.reached(FlowStep::Authorized);

        let located = self
            .locate(owner, cid)
            .await
            .map_err(|e| FlowError::store(FlowStep::Located, e))?;
        debug!(records = located.len(), "store records located");
        tracker.reached(FlowStep::Located);

        let mut removed = Vec::with_capacity(located.len());
        for record_id in &located {
            match self.store.delete(&self.api_key, *record_id).await {
                Ok(()) => removed.push(*record_id),
                Err(StoreError::NotFound(_)) => {
                    debug!(record = %record_id, "store record already gone");
                }
                Err(e) if removed.is_empty() => {
                    return Err(FlowError::store(FlowStep::OffchainDeleted, e));
                }
                Err(e) => {
                    warn!(error = %e, removed = removed.len(), "store delete interrupted");
                    return Ok(DeleteReport {
                        cid: cid.clone(),
                        outcome: FlowOutcome::PartialInconsistency,
                        detail: Some(format!(
                            "removed {} of {} store records before failing ({e}); registry untouched",
                            removed.len(),
                            located.len()
                        )),
                        removed_records: removed,
                    });
                }
            }
        }
        tracker.reached(FlowStep::OffchainDeleted);

        let exists = match self.registry.file_exists(owner, cid).await {
            Ok(exists) => exists,
            Err(e) => return registry_after_offchain(cid, removed, FlowStep::RegistryChecked, e),
        };
        tracker.reached(FlowStep::RegistryChecked);

        if !exists {
            info!("nothing to remove on-chain");
            tracker.finish(FlowStep::RegistryChecked);
            let detail = if located.is_empty() {
                "nothing to remove on-chain; no store record found either"
            } else {
                "nothing to remove on-chain"
            };
            return Ok(DeleteReport {
                cid: cid.clone(),
                outcome: FlowOutcome::RecoverableNoOp,
                removed_records: removed,
                detail: Some(detail.to_string()),
            });
        }

        let committed = self.registry.delete_file(proof, cid.clone()).await;
        record_decision(&mut attempt, committed.as_ref().err());
        match committed {
            Ok(_) => {
                info!(removed = removed.len(), "file deleted");
                tracker.finish(FlowStep::Committed);
                Ok(DeleteReport {
                    cid: cid.clone(),
                    outcome: FlowOutcome::Success,
                    detail: located
                        .is_empty()
                        .then(|| "no store record found for this cid".to_string()),
                    removed_records: removed,
                })
            }
            Err(RegistryError::NotFound { .. }) => {
                info!("removed on-chain concurrently by another flow");
                tracker.finish(FlowStep::Committed);
                Ok(DeleteReport {
                    cid: cid.clone(),
                    outcome: FlowOutcome::RecoverableNoOp,
                    removed_records: removed,
                    detail: Some("nothing to remove on-chain".to_string()),
                })
            }
            Err(e) => registry_after_offchain(cid, removed, FlowStep::Committed, e),
        }
    }

    /// Obtain a `RegistryWrite` proof and check its signature locally, so a
    /// proof the registry would reject never reaches a mutating step.
    ///
    /// The attempt is returned still `Signed`; only the registry's answer
    /// concludes it.
    async fn authorize_registry_write(
        &self,
    ) -> Result<(AuthorizationAttempt, AuthorizationProof)> {
        let challenge = self
            .registry
            .request_challenge(self.owner())
            .await
            .map_err(|e| FlowError::registry(FlowStep::Authorized, e))?;
        let (mut attempt, proof) = authorize(self.wallet.as_ref(), challenge)
            .await
            .map_err(|e| FlowError::auth(FlowStep::Authorized, e))?;

        if let Err(e) = proof.verify_signature() {
            attempt.reject();
            warn!(error = %e, "wallet proof failed local verification");
            return Err(FlowError::auth(FlowStep::Authorized, e));
        }
        Ok((attempt, proof))
    }

    /// Every store record for `cid` uploaded on behalf of `owner`.
    async fn locate(
        &self,
        owner: OwnerId,
        cid: &ContentId,
    ) -> std::result::Result<Vec<RecordId>, StoreError> {
        let mut found = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.list_uploads(&self.api_key, cursor).await?;
            if page.records.is_empty() {
                break;
            }
            found.extend(
                page.records
                    .iter()
                    .filter(|r| &r.cid == cid && r.owner == owner)
                    .map(|r| r.id),
            );
            cursor = page.next_cursor();
        }
        Ok(found)
    }
}

/// Conclude a `RegistryWrite` attempt from the registry's answer. The
/// runtime verifies the proof before any other check, so every error other
/// than `Unauthorized` after a reachable call means it was accepted. An
/// unreachable registry decided nothing and the attempt stays `Signed`.
fn record_decision(attempt: &mut AuthorizationAttempt, err: Option<&RegistryError>) {
    let accepted = match err {
        None
        | Some(RegistryError::DuplicateCid { .. })
        | Some(RegistryError::NotFound { .. })
        | Some(RegistryError::OwnerMismatch { .. }) => true,
        Some(RegistryError::Unauthorized(_)) => false,
        Some(RegistryError::Unavailable(_)) | Some(RegistryError::Persistence(_)) => return,
    };
    if let Err(e) = attempt.conclude(accepted) {
        debug!(error = %e, "registry write attempt already concluded");
    }
}

fn already_registered(receipt: UploadReceipt, owner: OwnerId) -> UploadReport {
    let detail = format!("{} is already registered for {owner}", receipt.cid);
    UploadReport {
        cid: receipt.cid,
        record_id: receipt.record_id,
        outcome: FlowOutcome::RecoverableNoOp,
        record: None,
        detail: Some(detail),
    }
}

/// Ciphertext is stored but the registry step failed. Not rolled back.
fn orphaned(receipt: UploadReceipt, step: FlowStep, err: RegistryError) -> UploadReport {
    let kind = ErrorKind::from(&err);
    warn!(
        record = %receipt.record_id,
        step = %step,
        error = %err,
        "ciphertext stored but not registered"
    );
    let detail = format!(
        "{} stored as record {} but not registered ({kind} at {step}: {err})",
        receipt.cid, receipt.record_id
    );
    UploadReport {
        cid: receipt.cid,
        record_id: receipt.record_id,
        outcome: FlowOutcome::PartialInconsistency,
        record: None,
        detail: Some(detail),
    }
}

/// Registry failure once the store side of a delete has run.
fn registry_after_offchain(
    cid: &ContentId,
    removed: Vec<RecordId>,
    step: FlowStep,
    err: RegistryError,
) -> Result<DeleteReport> {
    if removed.is_empty() {
        return Err(FlowError::registry(step, err));
    }
    warn!(step = %step, error = %err, "store records deleted but registry entry remains");
    Ok(DeleteReport {
        cid: cid.clone(),
        outcome: FlowOutcome::PartialInconsistency,
        detail: Some(format!(
            "store records deleted but registry still lists {cid} ({} at {step}: {err})",
            ErrorKind::from(&err)
        )),
        removed_records: removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filechain_auth::{AuthError, AuthPurpose, AuthState, LocalWallet};
    use filechain_registry::LocalRegistryRuntime;
    use filechain_store::MemoryObjectStore;
    use tokio::sync::mpsc;

    const API_KEY: &str = "unit-key";

    fn orchestrator(
        secret: u8,
    ) -> Orchestrator<MemoryObjectStore, LocalRegistryRuntime, LocalWallet> {
        Orchestrator::new(
            Arc::new(MemoryObjectStore::in_memory(API_KEY)),
            Arc::new(LocalRegistryRuntime::in_memory()),
            Arc::new(LocalWallet::from_secret([secret; 32])),
            API_KEY,
        )
    }

    #[tokio::test]
    async fn upload_reports_progress_in_order() {
        let orch = orchestrator(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = orch.upload(b"hello", "hello.txt", &tx).await.unwrap();
        assert_eq!(report.outcome, FlowOutcome::Success);

        let mut steps = Vec::new();
        while let Ok(p) = rx.try_recv() {
            steps.push((p.step, p.percent));
        }
        assert_eq!(
            steps,
            vec![
                (FlowStep::Started, 0),
                (FlowStep::Authorized, 25),
                (FlowStep::Uploaded, 50),
                (FlowStep::RegistryChecked, 75),
                (FlowStep::Committed, 100),
            ]
        );
    }

    #[tokio::test]
    async fn decrypt_round_trips_plaintext() {
        let orch = orchestrator(1);
        let report = orch.upload(b"%PDF-1.7", "report.pdf", &()).await.unwrap();
        let record = report.record.unwrap();

        let file = orch.decrypt_record(&record, &()).await.unwrap();
        assert_eq!(file.bytes, b"%PDF-1.7");
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn delete_without_store_record_still_clears_registry() {
        let orch = orchestrator(1);
        let wallet = LocalWallet::from_secret([1u8; 32]);
        let cid = ContentId::parse("Qm123").unwrap();

        let challenge = orch
            .registry()
            .issuer()
            .issue(wallet.address(), AuthPurpose::RegistryWrite);
        let signature = wallet.sign_message(&challenge.message()).await.unwrap();
        let proof = AuthorizationProof::new(wallet.address(), challenge, signature);
        orch.registry()
            .upload_file(proof, cid.clone(), "report.pdf".into())
            .await
            .unwrap();

        let report = orch.delete(&cid, &()).await.unwrap();
        assert_eq!(report.outcome, FlowOutcome::Success);
        assert!(report.removed_records.is_empty());
        assert!(report.detail.is_some());
        assert!(orch.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_check_leaves_attempt_signed() {
        let orch = orchestrator(1);
        let (attempt, proof) = orch.authorize_registry_write().await.unwrap();
        assert_eq!(attempt.state(), AuthState::Signed);
        assert_eq!(proof.owner, orch.owner());
    }

    #[tokio::test]
    async fn registry_answer_concludes_attempt() {
        let orch = orchestrator(1);

        let (mut attempt, _) = orch.authorize_registry_write().await.unwrap();
        record_decision(&mut attempt, None);
        assert_eq!(attempt.state(), AuthState::Verified);

        let (mut attempt, _) = orch.authorize_registry_write().await.unwrap();
        let refused = RegistryError::Unauthorized(AuthError::UnknownChallenge);
        record_decision(&mut attempt, Some(&refused));
        assert_eq!(attempt.state(), AuthState::Rejected);

        let (mut attempt, _) = orch.authorize_registry_write().await.unwrap();
        let down = RegistryError::Unavailable("timeout".into());
        record_decision(&mut attempt, Some(&down));
        assert_eq!(attempt.state(), AuthState::Signed);
    }

    #[tokio::test]
    async fn delete_of_unknown_cid_is_noop() {
        let orch = orchestrator(1);
        let report = orch
            .delete(&ContentId::parse("QmMissing").unwrap(), &())
            .await
            .unwrap();
        assert_eq!(report.outcome, FlowOutcome::RecoverableNoOp);
    }
}
