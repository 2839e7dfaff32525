use thiserror::Error;

mod entity;
pub use entity::*;
mod job;
pub use job::*;
mod shot;
pub use shot::*;

#[derive(Debug, Error)]
pub enum StoryboardError {
    #[error("shot indices are not contiguous: expected {expected}, found {found}")]
    NonContiguousIndices { expected: usize, found: usize },
    #[error("duplicate shot index: {0}")]
    DuplicateIndex(usize),
    #[error(
        "shot {index}: duration {duration}s does not match range {start}s..{end}s (tolerance {tolerance}s)"
    )]
    DurationMismatch {
        index: usize,
        start: f64,
        end: f64,
        duration: f64,
        tolerance: f64,
    },
    #[error("shot {index}: end {end}s precedes start {start}s")]
    InvertedRange { index: usize, start: f64, end: f64 },
    #[error("storyboard has no shots")]
    Empty,
}
