use serde::{Deserialize, Serialize};
use storyboard::{IdentityAnchor, LedgerEntity, Shot};

/// Response to a source upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub job_id: String,
}

/// Storyboard/analysis snapshot. While analysis is still running the backend
/// returns no status and an empty shot list; that is "not done", not an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardSnapshot {
    #[serde(default)]
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub status: Option<RemoteStatus>,
}

impl StoryboardSnapshot {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            Some(RemoteStatus::Succeeded) | Some(RemoteStatus::Failed)
        )
    }
}

/// Terminal/in-progress status reported by the backend for async work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-stage statuses as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    #[serde(default)]
    pub stage_statuses: std::collections::HashMap<String, RemoteStatus>,
}

/// Entities discovered by source-video analysis, split by kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPayload {
    #[serde(default)]
    pub character_ledger: Vec<LedgerEntity>,
    #[serde(default)]
    pub environment_ledger: Vec<LedgerEntity>,
}

/// User-declared identity overrides, split by kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnchorPayload {
    #[serde(default)]
    pub character_anchors: Vec<IdentityAnchor>,
    #[serde(default)]
    pub environment_anchors: Vec<IdentityAnchor>,
}

/// Outcome of a natural-language storyboard revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionOutcome {
    /// Human-readable reply to show the user.
    pub response: String,
    #[serde(default)]
    pub affected_shot_indices: Vec<usize>,
    /// Full replacement storyboard, when the revision changed anything.
    #[serde(default)]
    pub updated_shots: Option<Vec<Shot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratedShots {
    #[serde(default)]
    pub regenerated_shots: Vec<Shot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub output_reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_without_status_is_not_terminal() {
        let snap: StoryboardSnapshot = serde_json::from_str(r#"{"shots":[]}"#).unwrap();
        assert!(snap.shots.is_empty());
        assert!(!snap.is_terminal());
    }

    #[test]
    fn snapshot_with_shots_decodes() {
        let json = r#"{
            "status": "succeeded",
            "shots": [
                {"index":0,"start":0.0,"end":2.5,"duration":2.5,"description":"opening"},
                {"index":1,"start":2.5,"end":5.0,"duration":2.5,"description":"reveal"}
            ]
        }"#;
        let snap: StoryboardSnapshot = serde_json::from_str(json).unwrap();
        assert!(snap.is_terminal());
        assert_eq!(snap.shots.len(), 2);
        assert_eq!(snap.shots[1].description, "reveal");
        assert!(!snap.shots[0].dirty);
    }

    #[test]
    fn revision_outcome_updated_shots_is_optional() {
        let out: RevisionOutcome =
            serde_json::from_str(r#"{"response":"done","affectedShotIndices":[2,5]}"#).unwrap();
        assert_eq!(out.affected_shot_indices, vec![2, 5]);
        assert!(out.updated_shots.is_none());
    }
}
