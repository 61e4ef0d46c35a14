use filechain_store::RecordId;
use filechain_types::{ContentId, FileRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    Success,
    /// Nothing to do: already registered, or nothing to remove.
    RecoverableNoOp,
    /// The off-chain store and the registry disagree after this flow. The
    /// report's `detail` names what was left behind.
    PartialInconsistency,
    Rejected,
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowOutcome::Success => "success",
            FlowOutcome::RecoverableNoOp => "no-op",
            FlowOutcome::PartialInconsistency => "partial inconsistency",
            FlowOutcome::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub cid: ContentId,
    /// Store record created by this upload.
    pub record_id: RecordId,
    pub outcome: FlowOutcome,
    /// Registry record, when this flow committed one.
    pub record: Option<FileRecord>,
    pub detail: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub cid: ContentId,
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for DecryptedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedFile")
            .field("cid", &self.cid)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub cid: ContentId,
    pub outcome: FlowOutcome,
    /// Store records removed by this flow.
    pub removed_records: Vec<RecordId>,
    pub detail: Option<String>,
}
