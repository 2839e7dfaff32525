use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of one end-to-end remix run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh random job id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage the job is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Upload,
    Analyzing,
    ScriptPending,
    ScriptReady,
    ViewsPending,
    ViewsReady,
    StoryboardPending,
    StoryboardReady,
    VideoPending,
    VideoReady,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Analyzing => "analyzing",
            Self::ScriptPending => "script_pending",
            Self::ScriptReady => "script_ready",
            Self::ViewsPending => "views_pending",
            Self::ViewsReady => "views_ready",
            Self::StoryboardPending => "storyboard_pending",
            Self::StoryboardReady => "storyboard_ready",
            Self::VideoPending => "video_pending",
            Self::VideoReady => "video_ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-stage status, tracked independently because stages can be revisited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StageStatus {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Root unit of work: one uploaded source video driven through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub stage: PipelineStage,
    pub stage_statuses: HashMap<PipelineStage, StageStatus>,
    /// Backend-side reference to the uploaded source video.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, source: impl Into<String>) -> Self {
        Self {
            id,
            stage: PipelineStage::Upload,
            stage_statuses: HashMap::new(),
            source: source.into(),
            created_at: Utc::now(),
        }
    }

    pub fn stage_status(&self, stage: PipelineStage) -> StageStatus {
        self.stage_statuses.get(&stage).copied().unwrap_or_default()
    }

    pub fn set_stage_status(&mut self, stage: PipelineStage, status: StageStatus) {
        self.stage_statuses.insert(stage, status);
    }
}
