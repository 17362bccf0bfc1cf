//! fibertrack: parallel streamline tractography.
//!
//! Many independent trackers grow paths from seeds through a direction field, classify how
//! each one ended, and hand the accepted ones to a single writer.

pub mod engine;
pub mod error;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod roi;
pub mod run;
pub mod seeding;
pub mod tracking;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{TrackError, TrackResult};
pub use run::{RunControl, RunSummary, TrackJob, track, track_into, track_to_file};

/// Result alias used by the public fibertrack API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
