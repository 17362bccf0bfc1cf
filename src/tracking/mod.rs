//! Tracking core: termination taxonomy, step-source contract, per-path state machine.

pub mod act;
pub mod field;
pub mod method;
pub mod shared;
pub mod termination;
pub mod tracker;

pub use act::ActState;
pub use field::{CircularField, DirectionField, FieldStepper, ShellPhantom, UniformField};
pub use method::{StepSource, TissueField, Tissues};
pub use shared::{Downsampler, Properties, Shared, StatsSnapshot, TrackBudget, TrackStats};
pub use termination::{Rejection, Termination};
pub use tracker::{GrowthState, Grown, Tracker};
