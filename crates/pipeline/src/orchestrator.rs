/// Workflow orchestrator: the state machine driving one job through
/// upload → analysis → script → identity binding → storyboard → video.
///
/// Every forward transition is gated; failures mark the stage Failed and
/// return the job to the last completed stage instead of leaving it stuck.
/// All pipeline state lives in this owned struct; there are no ambient globals.
use crate::poller::{poll, CancelToken, PollConfig, PollError, PollOutcome};
use crate::resolve::resolve;
use crate::revision::{ConfirmPolicy, RevisionError, RevisionLoop};
use remote_api::{ApiError, RemixBackend, RemoteStatus, StoryboardSnapshot};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storyboard::{
    IdentityAnchor, Job, JobId, LedgerEntity, PipelineStage, ResolvedEntity, StageStatus,
    Storyboard, StoryboardError, ViewState,
};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub analysis_poll: PollConfig,
    pub storyboard_poll: PollConfig,
    pub views_poll: PollConfig,
    /// Cooldown between per-shot render submissions; the backend is
    /// RPM-limited and does not enforce backpressure itself.
    pub shot_cooldown: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            analysis_poll: PollConfig::new(Duration::from_secs(5), 120),
            storyboard_poll: PollConfig::new(Duration::from_secs(5), 120),
            views_poll: PollConfig::new(Duration::from_secs(3), 60),
            shot_cooldown: Duration::from_secs(2),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_analysis_poll(mut self, cfg: PollConfig) -> Self {
        self.analysis_poll = cfg;
        self
    }

    pub fn with_storyboard_poll(mut self, cfg: PollConfig) -> Self {
        self.storyboard_poll = cfg;
        self
    }

    pub fn with_views_poll(mut self, cfg: PollConfig) -> Self {
        self.views_poll = cfg;
        self
    }

    pub fn with_shot_cooldown(mut self, cooldown: Duration) -> Self {
        self.shot_cooldown = cooldown;
        self
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no active job")]
    NoActiveJob,
    #[error("stage {required} has not completed for this job")]
    StageNotReady { required: PipelineStage },
    #[error("analysis failed after {attempts} attempts")]
    AnalysisFailed {
        attempts: u32,
        /// Last snapshot seen before giving up, for diagnostics.
        last_seen: Option<StoryboardSnapshot>,
    },
    #[error("analysis returned an empty storyboard")]
    EmptyStoryboard,
    #[error("stage {stage} timed out after {attempts} attempts")]
    StageTimeout { stage: PipelineStage, attempts: u32 },
    #[error("stage {stage} failed: {message}")]
    StageFailed {
        stage: PipelineStage,
        message: String,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("result discarded: job {0} was superseded")]
    Superseded(JobId),
    #[error("view generation failed for entity {0}")]
    ViewGenerationFailed(String),
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storyboard(#[from] StoryboardError),
    #[error(transparent)]
    Revision(#[from] RevisionError),
}

pub struct Orchestrator {
    backend: Arc<dyn RemixBackend>,
    config: OrchestratorConfig,
    job: Option<Job>,
    /// Stages whose guard has been satisfied at least once for this job.
    /// Grows monotonically; backward navigation is limited to this set.
    completed: HashSet<PipelineStage>,
    entities: Vec<ResolvedEntity>,
    views_skipped: bool,
    revision: Option<RevisionLoop>,
    output: Option<String>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn RemixBackend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            config,
            job: None,
            completed: HashSet::new(),
            entities: Vec::new(),
            views_skipped: false,
            revision: None,
            output: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn stage(&self) -> PipelineStage {
        self.job
            .as_ref()
            .map(|j| j.stage)
            .unwrap_or(PipelineStage::Upload)
    }

    pub fn completed_stages(&self) -> &HashSet<PipelineStage> {
        &self.completed
    }

    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    pub fn views_skipped(&self) -> bool {
        self.views_skipped
    }

    pub fn storyboard(&self) -> Option<&Storyboard> {
        self.revision.as_ref().map(|r| r.storyboard())
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Best-effort cancellation of the current stage's in-flight polling.
    pub fn cancel_current(&self) {
        self.cancel.cancel();
    }

    /// Discard the job and all derived state and return to Upload.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        if let Some(job) = self.job.take() {
            log::info!("job {} discarded", job.id);
        }
        self.completed.clear();
        self.entities.clear();
        self.views_skipped = false;
        self.revision = None;
        self.output = None;
        self.cancel = CancelToken::new();
    }

    /// Navigate to any stage whose guard has already been satisfied.
    /// Later-stage state is kept; moving back to ScriptReady does not
    /// discard an already-built storyboard.
    pub fn navigate_to(&mut self, stage: PipelineStage) -> Result<(), PipelineError> {
        if !self.completed.contains(&stage) {
            return Err(PipelineError::StageNotReady { required: stage });
        }
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        let job = self.job.as_mut().ok_or(PipelineError::NoActiveJob)?;
        log::info!("job {}: navigating to {stage}", job.id);
        job.stage = stage;
        Ok(())
    }

    // ---- stage transitions ------------------------------------------------

    /// Upload → Analyzing. Guard: file accepted by the backend.
    pub async fn upload(&mut self, file: &Path) -> Result<JobId, PipelineError> {
        if file.as_os_str().is_empty() {
            return Err(ApiError::Validation("no source file given".into()).into());
        }
        let receipt = self.backend.upload_source(file).await?;
        let job_id = JobId(receipt.job_id);
        let mut job = Job::new(job_id.clone(), file.to_string_lossy());
        job.set_stage_status(PipelineStage::Upload, StageStatus::Succeeded);
        job.set_stage_status(PipelineStage::Analyzing, StageStatus::Running);
        job.stage = PipelineStage::Analyzing;
        self.job = Some(job);
        self.completed.clear();
        self.completed.insert(PipelineStage::Upload);
        self.cancel = CancelToken::new();
        log::info!("job {job_id}: source accepted, analysis running");
        Ok(job_id)
    }

    /// Analyzing → ScriptReady. Guard: analysis poll succeeds and the shot
    /// list is non-empty. On timeout the stage is marked Failed and the job
    /// returns to Upload rather than staying stuck in Analyzing.
    pub async fn await_analysis(&mut self) -> Result<&Storyboard, PipelineError> {
        let job_id = self.require_job()?.id.clone();
        let cancel = self.fresh_cancel();
        let backend = self.backend.clone();
        let fetch_job = job_id.clone();

        let result = poll(
            move || {
                let backend = backend.clone();
                let job = fetch_job.clone();
                async move { backend.fetch_storyboard(&job).await }
            },
            |snap: &StoryboardSnapshot| snap.is_terminal() || !snap.shots.is_empty(),
            |snap| log::debug!("analysis poll: {} shots so far", snap.shots.len()),
            self.config.analysis_poll,
            &cancel,
        )
        .await;

        match result {
            Ok(PollOutcome::Completed(snap)) => {
                self.ensure_active(&job_id)?;
                if snap.status == Some(RemoteStatus::Failed) || snap.shots.is_empty() {
                    self.fail_stage(
                        PipelineStage::Analyzing,
                        PipelineStage::Upload,
                        "analysis reported failure",
                    );
                    return if snap.shots.is_empty() && snap.status != Some(RemoteStatus::Failed) {
                        Err(PipelineError::EmptyStoryboard)
                    } else {
                        Err(PipelineError::StageFailed {
                            stage: PipelineStage::Analyzing,
                            message: "analysis reported failure".into(),
                        })
                    };
                }
                let board = Storyboard::new(snap.shots)?;
                log::info!("job {job_id}: analysis complete, {} shots", board.len());
                let job = self.require_job_mut()?;
                job.set_stage_status(PipelineStage::Analyzing, StageStatus::Succeeded);
                job.stage = PipelineStage::ScriptReady;
                self.completed.insert(PipelineStage::ScriptReady);
                let revision = self.revision.insert(RevisionLoop::new(job_id, board));
                Ok(revision.storyboard())
            }
            Ok(PollOutcome::Cancelled) => Err(PipelineError::Cancelled),
            Err(PollError::Timeout {
                attempts,
                last_seen,
            }) => {
                self.fail_stage(
                    PipelineStage::Analyzing,
                    PipelineStage::Upload,
                    "analysis never completed",
                );
                Err(PipelineError::AnalysisFailed {
                    attempts,
                    last_seen,
                })
            }
        }
    }

    /// ScriptReady → ViewsPending. Local action, no remote call.
    pub fn confirm_script(&mut self) -> Result<(), PipelineError> {
        self.require_completed(PipelineStage::ScriptReady)?;
        let job = self.require_job_mut()?;
        job.set_stage_status(PipelineStage::ScriptReady, StageStatus::Succeeded);
        job.stage = PipelineStage::ViewsPending;
        self.completed.insert(PipelineStage::ViewsPending);
        Ok(())
    }

    /// Fetch the discovered ledger and the declared anchors and resolve both
    /// kinds into the working entity set.
    pub async fn bind_identities(&mut self) -> Result<&[ResolvedEntity], PipelineError> {
        self.require_completed(PipelineStage::ViewsPending)?;
        let job_id = self.require_job()?.id.clone();
        let ledger = self.backend.fetch_ledger(&job_id).await?;
        let anchors = self.backend.fetch_anchors(&job_id).await?;
        self.ensure_active(&job_id)?;

        let mut entities = resolve(&ledger.character_ledger, &anchors.character_anchors);
        entities.extend(resolve(
            &ledger.environment_ledger,
            &anchors.environment_anchors,
        ));
        log::info!(
            "job {job_id}: resolved {} entities ({} characters, {} environments)",
            entities.len(),
            ledger.character_ledger.len(),
            ledger.environment_ledger.len()
        );
        self.entities = entities;
        Ok(&self.entities)
    }

    /// Re-run resolution for a single entity after its ledger data or anchor
    /// changed. Other entities keep their identity and view state.
    pub fn reresolve_entity(
        &mut self,
        ledger_entity: &LedgerEntity,
        anchor: Option<&IdentityAnchor>,
    ) -> Result<&ResolvedEntity, PipelineError> {
        let anchors: Vec<IdentityAnchor> = anchor.cloned().into_iter().collect();
        let replacement = resolve(std::slice::from_ref(ledger_entity), &anchors)
            .pop()
            .expect("resolve returns one record per ledger entity");
        let slot = self
            .entities
            .iter_mut()
            .find(|e| e.ledger_id == ledger_entity.id)
            .ok_or_else(|| PipelineError::UnknownEntity(ledger_entity.id.clone()))?;
        *slot = replacement;
        Ok(slot)
    }

    /// Record a manual reference-image upload for one view slot.
    pub fn mark_view_uploaded(
        &mut self,
        entity_id: &str,
        slot: usize,
    ) -> Result<(), PipelineError> {
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id == entity_id)
            .ok_or_else(|| PipelineError::UnknownEntity(entity_id.to_string()))?;
        if let Some(state) = entity.views.slots.get_mut(slot) {
            *state = ViewState::Uploaded;
        }
        Ok(())
    }

    /// Kick off and await three-view generation for one resolved entity.
    /// Each call owns its own poll; pollers for different entities share no
    /// mutable state.
    pub async fn generate_views(
        &mut self,
        entity_id: &str,
        force: bool,
    ) -> Result<(), PipelineError> {
        let job_id = self.require_job()?.id.clone();
        let anchor_id = {
            let entity = self
                .entities
                .iter_mut()
                .find(|e| e.id == entity_id)
                .ok_or_else(|| PipelineError::UnknownEntity(entity_id.to_string()))?;
            entity.views.set_all(ViewState::Generating);
            entity.id.clone()
        };

        let started = self
            .backend
            .generate_entity_views(&job_id, &anchor_id, force)
            .await;
        let status = match started {
            Ok(status) => status,
            Err(err) => {
                self.set_entity_views(entity_id, ViewState::Empty);
                return Err(err.into());
            }
        };

        let final_status = if status.is_terminal() {
            status
        } else {
            let cancel = self.fresh_cancel();
            let backend = self.backend.clone();
            let poll_job = job_id.clone();
            let poll_anchor = anchor_id.clone();
            let result = poll(
                move || {
                    let backend = backend.clone();
                    let job = poll_job.clone();
                    let anchor = poll_anchor.clone();
                    async move { backend.fetch_generation_status(&job, &anchor).await }
                },
                |status: &RemoteStatus| status.is_terminal(),
                |status| log::debug!("view generation for {anchor_id}: {status:?}"),
                self.config.views_poll,
                &cancel,
            )
            .await;
            match result {
                Ok(PollOutcome::Completed(status)) => status,
                Ok(PollOutcome::Cancelled) => {
                    self.set_entity_views(entity_id, ViewState::Empty);
                    return Err(PipelineError::Cancelled);
                }
                Err(PollError::Timeout { attempts, .. }) => {
                    self.set_entity_views(entity_id, ViewState::Empty);
                    return Err(PipelineError::StageTimeout {
                        stage: PipelineStage::ViewsPending,
                        attempts,
                    });
                }
            }
        };

        self.ensure_active(&job_id)?;
        match final_status {
            RemoteStatus::Succeeded => {
                self.set_entity_views(entity_id, ViewState::Ready);
                Ok(())
            }
            _ => {
                self.set_entity_views(entity_id, ViewState::Empty);
                Err(PipelineError::ViewGenerationFailed(entity_id.to_string()))
            }
        }
    }

    /// ViewsPending → ViewsReady via explicit confirmation.
    pub fn confirm_views(&mut self) -> Result<(), PipelineError> {
        self.finish_views(false)
    }

    /// ViewsPending → ViewsReady via explicit skip. Skipping is a valid
    /// terminal transition, not an error.
    pub fn skip_views(&mut self) -> Result<(), PipelineError> {
        self.finish_views(true)
    }

    fn finish_views(&mut self, skipped: bool) -> Result<(), PipelineError> {
        self.require_completed(PipelineStage::ViewsPending)?;
        let job = self.require_job_mut()?;
        job.set_stage_status(PipelineStage::ViewsPending, StageStatus::Succeeded);
        job.stage = PipelineStage::ViewsReady;
        if skipped {
            log::info!("job {}: entity views skipped", job.id);
        }
        self.completed.insert(PipelineStage::ViewsReady);
        self.views_skipped = skipped;
        Ok(())
    }

    /// ViewsReady → StoryboardReady. Guard: storyboard-generation poll
    /// reaches Succeeded.
    pub async fn await_storyboard(&mut self) -> Result<&Storyboard, PipelineError> {
        self.require_completed(PipelineStage::ViewsReady)?;
        let job_id = {
            let job = self.require_job_mut()?;
            job.stage = PipelineStage::StoryboardPending;
            job.set_stage_status(PipelineStage::StoryboardPending, StageStatus::Running);
            job.id.clone()
        };
        let cancel = self.fresh_cancel();
        let backend = self.backend.clone();
        let fetch_job = job_id.clone();

        let result = poll(
            move || {
                let backend = backend.clone();
                let job = fetch_job.clone();
                async move { backend.fetch_storyboard(&job).await }
            },
            |snap: &StoryboardSnapshot| snap.is_terminal(),
            |snap| log::debug!("storyboard poll: status {:?}", snap.status),
            self.config.storyboard_poll,
            &cancel,
        )
        .await;

        match result {
            Ok(PollOutcome::Completed(snap)) => {
                self.ensure_active(&job_id)?;
                if snap.status != Some(RemoteStatus::Succeeded) {
                    self.fail_stage(
                        PipelineStage::StoryboardPending,
                        PipelineStage::ViewsReady,
                        "storyboard generation failed",
                    );
                    return Err(PipelineError::StageFailed {
                        stage: PipelineStage::StoryboardPending,
                        message: "storyboard generation failed".into(),
                    });
                }
                let board = Storyboard::new(snap.shots)?;
                let job = self.require_job_mut()?;
                job.set_stage_status(PipelineStage::StoryboardPending, StageStatus::Succeeded);
                job.stage = PipelineStage::StoryboardReady;
                self.completed.insert(PipelineStage::StoryboardReady);
                let revision = self.revision.insert(RevisionLoop::new(job_id, board));
                Ok(revision.storyboard())
            }
            Ok(PollOutcome::Cancelled) => Err(PipelineError::Cancelled),
            Err(PollError::Timeout { attempts, .. }) => {
                self.fail_stage(
                    PipelineStage::StoryboardPending,
                    PipelineStage::ViewsReady,
                    "storyboard generation never completed",
                );
                Err(PipelineError::StageTimeout {
                    stage: PipelineStage::StoryboardPending,
                    attempts,
                })
            }
        }
    }

    /// Send one natural-language revision instruction.
    pub async fn revise(&mut self, instruction: &str) -> Result<String, PipelineError> {
        self.require_completed(PipelineStage::StoryboardReady)?;
        let backend = self.backend.clone();
        let revision = self
            .revision
            .as_mut()
            .ok_or(PipelineError::StageNotReady {
                required: PipelineStage::StoryboardReady,
            })?;
        Ok(revision.revise(backend.as_ref(), instruction).await?)
    }

    /// Regenerate artifacts for exactly the pending-regeneration set.
    pub async fn regenerate_revised(&mut self) -> Result<usize, PipelineError> {
        self.require_completed(PipelineStage::StoryboardReady)?;
        let backend = self.backend.clone();
        let revision = self
            .revision
            .as_mut()
            .ok_or(PipelineError::StageNotReady {
                required: PipelineStage::StoryboardReady,
            })?;
        Ok(revision.regenerate(backend.as_ref()).await?)
    }

    /// Shot indices still awaiting regeneration after revisions.
    pub fn pending_regeneration(&self) -> Vec<usize> {
        self.revision
            .as_ref()
            .map(|r| r.pending().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Confirm the storyboard and leave the revision loop.
    pub fn confirm_storyboard(&mut self, policy: ConfirmPolicy) -> Result<(), PipelineError> {
        self.require_completed(PipelineStage::StoryboardReady)?;
        let revision = self.revision.as_ref().ok_or(PipelineError::StageNotReady {
            required: PipelineStage::StoryboardReady,
        })?;
        revision.confirm(policy)?;
        let job = self.require_job_mut()?;
        job.set_stage_status(PipelineStage::StoryboardReady, StageStatus::Succeeded);
        Ok(())
    }

    /// StoryboardReady → VideoReady. Per-shot renders are serialized with a
    /// cooldown between submissions, then the merge call produces the final
    /// output reference. Any shot failure aborts the batch and returns the
    /// job to StoryboardReady.
    pub async fn render_video(&mut self) -> Result<String, PipelineError> {
        self.require_completed(PipelineStage::StoryboardReady)?;
        let job_id = {
            let job = self.require_job_mut()?;
            job.stage = PipelineStage::VideoPending;
            job.set_stage_status(PipelineStage::VideoPending, StageStatus::Running);
            job.id.clone()
        };
        let indices: Vec<usize> = self
            .revision
            .as_ref()
            .map(|r| r.storyboard().shots.iter().map(|s| s.index).collect())
            .unwrap_or_default();

        for (position, index) in indices.iter().enumerate() {
            let rendered = self
                .backend
                .regenerate_shot_artifacts(&job_id, &[*index])
                .await;
            let rendered = match rendered {
                Ok(r) => r,
                Err(err) => {
                    self.fail_stage(
                        PipelineStage::VideoPending,
                        PipelineStage::StoryboardReady,
                        &format!("shot {index} render failed: {err}"),
                    );
                    return Err(err.into());
                }
            };
            self.ensure_active(&job_id)?;
            if let Some(revision) = self.revision.as_mut() {
                for mut shot in rendered.regenerated_shots {
                    shot.dirty = false;
                    if let Some(target) = revision.storyboard_mut().shot_mut(shot.index) {
                        *target = shot;
                    }
                }
            }
            log::info!(
                "job {job_id}: shot {index} rendered ({}/{})",
                position + 1,
                indices.len()
            );
            if position + 1 < indices.len() {
                tokio::time::sleep(self.config.shot_cooldown).await;
            }
        }

        let merged = match self.backend.merge_final(&job_id).await {
            Ok(m) => m,
            Err(err) => {
                self.fail_stage(
                    PipelineStage::VideoPending,
                    PipelineStage::StoryboardReady,
                    &format!("merge failed: {err}"),
                );
                return Err(err.into());
            }
        };
        self.ensure_active(&job_id)?;

        let job = self.require_job_mut()?;
        job.set_stage_status(PipelineStage::VideoPending, StageStatus::Succeeded);
        job.stage = PipelineStage::VideoReady;
        self.completed.insert(PipelineStage::VideoReady);
        self.output = Some(merged.output_reference.clone());
        log::info!("job {job_id}: final output at {}", merged.output_reference);
        Ok(merged.output_reference)
    }

    // ---- helpers ----------------------------------------------------------

    fn require_job(&self) -> Result<&Job, PipelineError> {
        self.job.as_ref().ok_or(PipelineError::NoActiveJob)
    }

    fn require_job_mut(&mut self) -> Result<&mut Job, PipelineError> {
        self.job.as_mut().ok_or(PipelineError::NoActiveJob)
    }

    fn require_completed(&self, stage: PipelineStage) -> Result<(), PipelineError> {
        if self.completed.contains(&stage) {
            Ok(())
        } else {
            Err(PipelineError::StageNotReady { required: stage })
        }
    }

    /// Ignore results arriving for a job that was reset or replaced while
    /// the remote call was in flight.
    fn ensure_active(&self, job_id: &JobId) -> Result<(), PipelineError> {
        match &self.job {
            Some(job) if &job.id == job_id => Ok(()),
            _ => {
                log::info!("discarding result for superseded job {job_id}");
                Err(PipelineError::Superseded(job_id.clone()))
            }
        }
    }

    fn fresh_cancel(&mut self) -> CancelToken {
        self.cancel = CancelToken::new();
        self.cancel.clone()
    }

    fn fail_stage(&mut self, stage: PipelineStage, fallback: PipelineStage, message: &str) {
        if let Some(job) = self.job.as_mut() {
            log::warn!("job {}: stage {stage} failed: {message}", job.id);
            job.set_stage_status(stage, StageStatus::Failed);
            job.stage = fallback;
        }
    }

    fn set_entity_views(&mut self, entity_id: &str, state: ViewState) {
        if let Some(entity) = self.entities.iter_mut().find(|e| e.id == entity_id) {
            entity.views.set_all(state);
        }
    }
}
