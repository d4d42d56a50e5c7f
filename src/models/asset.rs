//! Represents an attachment stored in the remote bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The CMS-side record describing one stored object.
///
/// The record is owned and persisted by the CMS; this service creates it on
/// upload, refreshes it on replace and consumes it on delete and link
/// resolution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    /// Filename as the author uploaded it. Never used for naming objects.
    pub original_name: String,

    /// Full object key, including the date-bucketed directory.
    pub remote_key: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Lowercase extension derived from the sanitized filename.
    pub extension: String,

    /// MIME type guessed from `remote_key`.
    pub mime_type: String,
}

/// Lifecycle of an attachment as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Absent,
    Uploading,
    Stored,
    Deleting,
    Deleted,
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetState::Absent => "absent",
            AssetState::Uploading => "uploading",
            AssetState::Stored => "stored",
            AssetState::Deleting => "deleting",
            AssetState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// What happened to one half (local or remote) of a delete.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum DeleteStep {
    /// Disabled by configuration.
    Skipped,
    Deleted,
    Failed(String),
}

impl DeleteStep {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeleteStep::Failed(_))
    }
}

/// Result of a delete; names the half that needs a retry when one failed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub local: DeleteStep,
    pub remote: DeleteStep,
}

impl DeleteOutcome {
    pub fn is_complete(&self) -> bool {
        !self.local.is_failed() && !self.remote.is_failed()
    }

    pub fn state(&self) -> AssetState {
        if self.is_complete() {
            AssetState::Deleted
        } else {
            AssetState::Deleting
        }
    }
}

/// Best-effort MIME type from the key's extension.
pub fn mime_for_key(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_is_derived_from_key_extension() {
        assert_eq!(mime_for_key("usr/uploads/2024/03/abc.PNG"), "image/png");
        assert!(mime_for_key("usr/uploads/2024/03/abc.docx").ends_with("wordprocessingml.document"));
        assert_eq!(mime_for_key("usr/uploads.d/2024/noext"), "application/octet-stream");
        assert_eq!(mime_for_key("usr/uploads/2024/03/data.json"), "application/json");
        assert_eq!(mime_for_key("usr/uploads/2024/03/table.csv"), "text/csv");
        assert_ne!(mime_for_key("usr/uploads/2024/03/voice.m4a"), "application/octet-stream");
    }

    #[test]
    fn delete_outcome_reports_failed_half() {
        let outcome = DeleteOutcome {
            local: DeleteStep::Deleted,
            remote: DeleteStep::Failed("timeout".into()),
        };
        assert!(!outcome.is_complete());
        assert_eq!(outcome.state(), AssetState::Deleting);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["local"]["status"], "deleted");
        assert_eq!(json["remote"]["status"], "failed");
        assert_eq!(json["remote"]["reason"], "timeout");
    }
}
