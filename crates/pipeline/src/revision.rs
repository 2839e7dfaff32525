/// Conversational storyboard revision.
///
/// Layered on the orchestrator once a storyboard exists: natural-language
/// edits come back as a partial mutation, and the shots they touched are
/// tracked in a pending-regeneration set until their artifacts are rebuilt.
use remote_api::{ApiError, RemixBackend};
use std::collections::BTreeSet;
use storyboard::{JobId, Storyboard, StoryboardError};
use thiserror::Error;

/// Whether a storyboard may be confirmed while shots still await
/// regeneration. The override is a deliberate, named escape hatch rather
/// than an accidental allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    RequireClean,
    AllowDirtyOverride,
}

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("shots awaiting regeneration: {0:?}")]
    PendingRegeneration(Vec<usize>),
    #[error("revision affected unknown shot index {0}")]
    UnknownShot(usize),
    #[error("revised storyboard is invalid: {0}")]
    InvalidStoryboard(#[from] StoryboardError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct RevisionLoop {
    job_id: JobId,
    storyboard: Storyboard,
    pending: BTreeSet<usize>,
}

impl RevisionLoop {
    pub fn new(job_id: JobId, storyboard: Storyboard) -> Self {
        Self {
            job_id,
            storyboard,
            pending: BTreeSet::new(),
        }
    }

    pub fn storyboard(&self) -> &Storyboard {
        &self.storyboard
    }

    /// Mutable access for applying backend-produced shot artifacts. Structural
    /// edits must go through `revise`.
    pub(crate) fn storyboard_mut(&mut self) -> &mut Storyboard {
        &mut self.storyboard
    }

    /// Shot indices whose description changed but whose artifacts are stale.
    pub fn pending(&self) -> &BTreeSet<usize> {
        &self.pending
    }

    /// Send one revision instruction. When the backend returns an updated
    /// storyboard it replaces the current one and every affected shot joins
    /// the pending set; shots outside the affected list are never implicitly
    /// touched. Returns the human-readable reply.
    pub async fn revise(
        &mut self,
        backend: &dyn RemixBackend,
        instruction: &str,
    ) -> Result<String, RevisionError> {
        let outcome = backend
            .revise_storyboard(&self.job_id, instruction, &self.storyboard.shots)
            .await?;

        if let Some(shots) = outcome.updated_shots {
            // Stage everything on the new board first; current state is only
            // replaced once the whole affected list validates.
            let mut board = Storyboard::new(shots)?;
            for &index in &outcome.affected_shot_indices {
                let shot = board
                    .shot_mut(index)
                    .ok_or(RevisionError::UnknownShot(index))?;
                shot.dirty = true;
            }
            self.pending.extend(outcome.affected_shot_indices.iter().copied());
            self.storyboard = board;
            log::info!(
                "revision touched shots {:?}; pending regeneration: {:?}",
                outcome.affected_shot_indices,
                self.pending
            );
        }
        Ok(outcome.response)
    }

    /// Explicit regeneration of exactly the pending set. Regenerated shots
    /// replace their stale versions and leave the pending set; an index the
    /// reply omits stays dirty and pending. Returns how many shots were
    /// regenerated.
    pub async fn regenerate(&mut self, backend: &dyn RemixBackend) -> Result<usize, RevisionError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let indices: Vec<usize> = self.pending.iter().copied().collect();
        let reply = backend
            .regenerate_shot_artifacts(&self.job_id, &indices)
            .await?;

        for shot in &reply.regenerated_shots {
            if self.storyboard.shot(shot.index).is_none() {
                return Err(RevisionError::UnknownShot(shot.index));
            }
        }
        let mut applied = 0;
        for mut shot in reply.regenerated_shots {
            shot.dirty = false;
            let index = shot.index;
            if let Some(slot) = self.storyboard.shot_mut(index) {
                *slot = shot;
            }
            self.pending.remove(&index);
            applied += 1;
        }
        if !self.pending.is_empty() {
            log::warn!(
                "regeneration reply omitted shots {:?}; they stay pending",
                self.pending
            );
        }
        Ok(applied)
    }

    /// Leave the revision loop. Only meaningful with an empty pending set
    /// unless the caller explicitly allows a dirty override.
    pub fn confirm(&self, policy: ConfirmPolicy) -> Result<&Storyboard, RevisionError> {
        if !self.pending.is_empty() && policy == ConfirmPolicy::RequireClean {
            return Err(RevisionError::PendingRegeneration(
                self.pending.iter().copied().collect(),
            ));
        }
        if !self.pending.is_empty() {
            log::warn!(
                "storyboard confirmed with stale shots {:?} (dirty override)",
                self.pending
            );
        }
        Ok(&self.storyboard)
    }
}
