//! Fatal error types. Per-path outcomes are terminations and rejections, never errors.

pub type TrackResult<T> = core::result::Result<T, TrackError>;

/// Conditions that abort a tracking run.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum TrackError {
    /// Options or inputs are malformed; raised before any path is generated.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// An unbounded seed source could not produce a valid seed.
    #[error("Failed to find suitable seed point after {attempts} attempts - aborting")]
    SeedExhausted { attempts: usize },

    /// A pipeline thread panicked.
    #[error("{stage} thread panicked")]
    WorkerPanicked { stage: &'static str },

    /// Internal channel failure between stages.
    #[error("Channel error: {context}")]
    Channel { context: String },
}

impl TrackError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
