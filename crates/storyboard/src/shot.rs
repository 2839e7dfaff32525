use crate::StoryboardError;
use serde::{Deserialize, Serialize};

/// Allowed drift between a shot's stored duration and its time range.
pub const DURATION_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotSize {
    ExtremeWide,
    Wide,
    #[default]
    Medium,
    CloseUp,
    ExtremeCloseUp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraAngle {
    #[default]
    EyeLevel,
    High,
    Low,
    Overhead,
    Dutch,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraMovement {
    #[default]
    Static,
    Pan,
    Tilt,
    Dolly,
    Tracking,
    Handheld,
    Crane,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FocalTreatment {
    #[default]
    DeepFocus,
    ShallowFocus,
    RackFocus,
    SoftFocus,
}

/// Cinematography metadata attached to each shot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CameraPlan {
    pub size: ShotSize,
    pub angle: CameraAngle,
    pub movement: CameraMovement,
    pub focal: FocalTreatment,
}

/// One storyboard unit with a time range and cinematography metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    /// Stable position within the storyboard, contiguous from 0.
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub description: String,
    #[serde(default)]
    pub camera: CameraPlan,
    /// Reference to the rendered first-frame image, absent until rendered.
    #[serde(default)]
    pub first_frame: Option<String>,
    /// Set when a revision changed the description and artifacts are stale.
    #[serde(default)]
    pub dirty: bool,
}

impl Shot {
    pub fn new(index: usize, start: f64, end: f64, description: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            duration: end - start,
            description: description.into(),
            camera: CameraPlan::default(),
            first_frame: None,
            dirty: false,
        }
    }

    pub fn validate(&self) -> Result<(), StoryboardError> {
        if self.end < self.start {
            return Err(StoryboardError::InvertedRange {
                index: self.index,
                start: self.start,
                end: self.end,
            });
        }
        if (self.duration - (self.end - self.start)).abs() > DURATION_TOLERANCE_SECS {
            return Err(StoryboardError::DurationMismatch {
                index: self.index,
                start: self.start,
                end: self.end,
                duration: self.duration,
                tolerance: DURATION_TOLERANCE_SECS,
            });
        }
        Ok(())
    }
}

/// Ordered sequence of shots for one storyboard version.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Storyboard {
    pub shots: Vec<Shot>,
}

impl Storyboard {
    pub fn new(shots: Vec<Shot>) -> Result<Self, StoryboardError> {
        let board = Self { shots };
        board.validate()?;
        Ok(board)
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn shot(&self, index: usize) -> Option<&Shot> {
        self.shots.iter().find(|s| s.index == index)
    }

    pub fn shot_mut(&mut self, index: usize) -> Option<&mut Shot> {
        self.shots.iter_mut().find(|s| s.index == index)
    }

    /// Check per-shot ranges plus the index invariant: unique and contiguous
    /// from zero within one storyboard version.
    pub fn validate(&self) -> Result<(), StoryboardError> {
        if self.shots.is_empty() {
            return Err(StoryboardError::Empty);
        }
        let mut seen = vec![false; self.shots.len()];
        for shot in &self.shots {
            shot.validate()?;
            if shot.index >= self.shots.len() {
                return Err(StoryboardError::NonContiguousIndices {
                    expected: self.shots.len() - 1,
                    found: shot.index,
                });
            }
            if seen[shot.index] {
                return Err(StoryboardError::DuplicateIndex(shot.index));
            }
            seen[shot.index] = true;
        }
        Ok(())
    }
}
