//! Deterministic step source that follows an analytic direction field.
//! Used by the CLI and by tests; real estimators plug in through [`StepSource`].

use glam::Vec3;
use std::sync::Arc;

use super::method::{StepSource, TissueField, Tissues};
use super::termination::Termination;
use crate::roi::Region;
use crate::types::StepState;

/// Orientation at a position (sign is irrelevant). None outside the field's support.
pub trait DirectionField: Send + Sync {
    fn sample(&self, pos: Vec3) -> Option<Vec3>;
}

impl<F> DirectionField for F
where
    F: Fn(Vec3) -> Option<Vec3> + Send + Sync,
{
    fn sample(&self, pos: Vec3) -> Option<Vec3> {
        self(pos)
    }
}

/// Same orientation everywhere inside `bounds`.
pub struct UniformField {
    pub dir: Vec3,
    pub bounds: Region,
}

impl DirectionField for UniformField {
    fn sample(&self, pos: Vec3) -> Option<Vec3> {
        self.bounds.contains(pos).then_some(self.dir)
    }
}

/// Circles around the z axis through `centre`.
pub struct CircularField {
    pub centre: Vec3,
    pub bounds: Region,
}

impl DirectionField for CircularField {
    fn sample(&self, pos: Vec3) -> Option<Vec3> {
        if !self.bounds.contains(pos) {
            return None;
        }
        let radial = pos - self.centre;
        Some(Vec3::Z.cross(Vec3::new(radial.x, radial.y, 0.0)))
    }
}

/// Concentric tissue shells: white matter core, cortical grey matter rim, then CSF.
/// Outside the CSF shell is outside the image.
#[derive(Clone, Debug)]
pub struct ShellPhantom {
    pub centre: Vec3,
    pub wm_radius: f32,
    pub cgm_thickness: f32,
    pub csf_thickness: f32,
}

impl TissueField for ShellPhantom {
    fn fetch(&self, pos: Vec3) -> Option<Tissues> {
        let r = pos.distance(self.centre);
        let cgm_outer = self.wm_radius + self.cgm_thickness;
        if r < self.wm_radius {
            Some(Tissues::white_matter())
        } else if r < cgm_outer {
            Some(Tissues {
                cgm: 1.0,
                ..Tissues::default()
            })
        } else if r < cgm_outer + self.csf_thickness {
            Some(Tissues {
                csf: 1.0,
                ..Tissues::default()
            })
        } else {
            None
        }
    }
}

/// Follows a [`DirectionField`] with a fixed step and a curvature limit.
#[derive(Clone)]
pub struct FieldStepper {
    field: Arc<dyn DirectionField>,
    step_size: f32,
    cos_max_angle: f32,
}

impl FieldStepper {
    pub fn new(field: Arc<dyn DirectionField>, step_size: f32, cos_max_angle: f32) -> Self {
        Self {
            field,
            step_size,
            cos_max_angle,
        }
    }

    /// Unit orientation at `pos` flipped to agree with `heading`.
    fn oriented(&self, pos: Vec3, heading: Vec3) -> Result<Vec3, Termination> {
        let Some(raw) = self.field.sample(pos) else {
            return Err(Termination::ExitImage);
        };
        let Some(d) = raw.try_normalize() else {
            return Err(Termination::BadSignal);
        };
        Ok(if d.dot(heading) < 0.0 { -d } else { d })
    }
}

impl StepSource for FieldStepper {
    fn check_seed(&mut self, state: &StepState) -> bool {
        self.field.sample(state.pos).is_some()
    }

    fn init(&mut self, state: &mut StepState) -> bool {
        match self.oriented(state.pos, state.dir) {
            Ok(d) => {
                state.dir = d;
                true
            }
            Err(_) => false,
        }
    }

    fn next(&mut self, state: &mut StepState) -> Termination {
        let d = match self.oriented(state.pos, state.dir) {
            Ok(d) => d,
            Err(term) => return term,
        };
        if d.dot(state.dir) < self.cos_max_angle {
            return Termination::HighCurvature;
        }
        state.dir = d;
        state.pos += d * self.step_size;
        Termination::Continue
    }

    fn metric(&mut self, state: &StepState) -> f32 {
        self.field
            .sample(state.pos)
            .and_then(|d| d.try_normalize())
            .map_or(1.0, |d| 1.0 - d.dot(state.dir).abs())
    }
}
