/// Remote job client for the remix backend.
///
/// One typed request/response wrapper per remote operation. No retry or
/// polling logic lives here; each method performs a single request and
/// surfaces success or a typed failure. Retry policy belongs to callers.
use async_trait::async_trait;
use std::path::Path;
use storyboard::JobId;

mod error;
pub use error::ApiError;
mod http;
pub use http::{HttpBackend, HttpBackendConfig};
mod types;
pub use types::*;

/// The remote backend surface consumed by the pipeline. Cut as a trait so the
/// orchestrator can be driven against a scripted backend in tests.
#[async_trait]
pub trait RemixBackend: Send + Sync {
    /// Upload a source video; fails with a validation error on invalid input.
    async fn upload_source(&self, file: &Path) -> Result<UploadReceipt, ApiError>;

    /// Read the current storyboard/analysis snapshot. Idempotent.
    async fn fetch_storyboard(&self, job: &JobId) -> Result<StoryboardSnapshot, ApiError>;

    /// Read per-stage statuses. Idempotent.
    async fn fetch_job_status(&self, job: &JobId) -> Result<JobStatusReport, ApiError>;

    /// Read the discovered entity ledger. Idempotent.
    async fn fetch_ledger(&self, job: &JobId) -> Result<LedgerPayload, ApiError>;

    /// Read the declared identity anchors. Idempotent.
    async fn fetch_anchors(&self, job: &JobId) -> Result<AnchorPayload, ApiError>;

    /// Apply a natural-language revision to the current storyboard.
    async fn revise_storyboard(
        &self,
        job: &JobId,
        instruction: &str,
        current_shots: &[storyboard::Shot],
    ) -> Result<RevisionOutcome, ApiError>;

    /// Regenerate artifacts for the given shot indices.
    async fn regenerate_shot_artifacts(
        &self,
        job: &JobId,
        shot_indices: &[usize],
    ) -> Result<RegeneratedShots, ApiError>;

    /// Kick off three-view generation for one anchor.
    async fn generate_entity_views(
        &self,
        job: &JobId,
        anchor_id: &str,
        force: bool,
    ) -> Result<RemoteStatus, ApiError>;

    /// Read three-view generation status for one anchor. Idempotent.
    async fn fetch_generation_status(
        &self,
        job: &JobId,
        anchor_id: &str,
    ) -> Result<RemoteStatus, ApiError>;

    /// Merge rendered shots into the final output.
    async fn merge_final(&self, job: &JobId) -> Result<MergeResult, ApiError>;
}
