//! Contracts for the per-step direction estimator and the tissue model it may consult.

use glam::Vec3;

use super::termination::Termination;
use crate::types::StepState;

/// Produces the next step of a path. One instance is owned by each tracker worker.
///
/// `next` advances `state.pos` and `state.dir` in place and reports whether growth may
/// continue. It must be deterministic given its own internal state and must not touch
/// anything shared; numerical trouble is reported as [`Termination::BadSignal`] or
/// [`Termination::CalibrateFail`], never by panicking.
pub trait StepSource: Send {
    /// Quick validity check of a proposed seed position.
    fn check_seed(&mut self, _state: &StepState) -> bool {
        true
    }

    /// Prepare to grow from `state`. May refine the initial direction. False rejects the seed.
    fn init(&mut self, state: &mut StepState) -> bool;

    fn next(&mut self, state: &mut StepState) -> Termination;

    /// Called before growing the second half of a bidirectional path.
    fn reverse_track(&mut self) {}

    /// Called after backtracking removed `removed` trailing points. Fewer than requested when
    /// the path was cut back to its seed.
    fn truncate_track(&mut self, _removed: usize) {}

    /// Scalar quality at `state`; lower is a better exit point from sub-cortical grey matter.
    fn metric(&mut self, _state: &StepState) -> f32 {
        0.0
    }
}

/// Partial-volume tissue fractions at one position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tissues {
    pub cgm: f32,
    pub sgm: f32,
    pub wm: f32,
    pub csf: f32,
    pub path: f32,
}

impl Tissues {
    pub fn white_matter() -> Self {
        Self {
            wm: 1.0,
            ..Self::default()
        }
    }

    pub fn is_csf(&self) -> bool {
        self.csf >= 0.5
    }

    pub fn is_cgm(&self) -> bool {
        self.cgm >= 0.5
    }

    pub fn is_sgm(&self) -> bool {
        self.sgm >= 0.5
    }

    pub fn is_path(&self) -> bool {
        self.path >= 0.5
    }
}

/// Read-only anatomical tissue image. Shared by all workers.
pub trait TissueField: Send + Sync {
    /// Tissue fractions at `pos`, or None outside the image.
    fn fetch(&self, pos: Vec3) -> Option<Tissues>;
}

impl<F> TissueField for F
where
    F: Fn(Vec3) -> Option<Tissues> + Send + Sync,
{
    fn fetch(&self, pos: Vec3) -> Option<Tissues> {
        self(pos)
    }
}
