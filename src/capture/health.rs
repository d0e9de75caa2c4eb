//! Per-category capture health and the structural-dependency error taxonomy.

use thiserror::Error;

/// One-way latch: the first structural failure in a category degrades it
/// for the rest of the session, so the user sees one banner, not one per
/// mutation. Subsequent notifications still re-attempt extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureHealth {
    #[default]
    Healthy,
    Degraded,
}

impl CaptureHealth {
    /// Latch to `Degraded`. Returns true only on the first transition.
    pub fn degrade(&mut self) -> bool {
        match self {
            Self::Healthy => {
                *self = Self::Degraded;
                true
            }
            Self::Degraded => false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }
}

/// Structural-dependency failures: the page shape the extractors rely on
/// is absent or changed. All are non-fatal; the session keeps running for
/// the unaffected category.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("caption region not found in page")]
    CaptionRegionMissing,

    #[error("caption slot structure changed: {0}")]
    SlotStructure(String),

    #[error("chat region not found in page")]
    ChatRegionMissing,

    #[error("chat message structure changed: {0}")]
    ChatStructure(String),
}
