//! Anatomically-constrained tracking: per-worker tissue state and structural checks.

use glam::Vec3;
use std::sync::Arc;

use super::method::{TissueField, Tissues};
use super::termination::Termination;

/// Bisection iterations when cropping onto the grey/white boundary.
const GMWMI_BISECTIONS: usize = 12;

/// Tissue history of the path currently being grown by one worker.
pub struct ActState {
    field: Arc<dyn TissueField>,
    tissues: Option<Tissues>,
    /// Consecutive points spent inside sub-cortical grey matter.
    pub sgm_depth: usize,
}

impl ActState {
    pub fn new(field: Arc<dyn TissueField>) -> Self {
        Self {
            field,
            tissues: None,
            sgm_depth: 0,
        }
    }

    /// Sample tissue at `pos` and cache it. False when outside the image.
    pub fn fetch_tissue_data(&mut self, pos: Vec3) -> bool {
        self.tissues = self.field.fetch(pos);
        self.tissues.is_some()
    }

    /// Tissues at the last fetched position.
    pub fn tissues(&self) -> Option<Tissues> {
        self.tissues
    }

    /// Classify the tissue at a freshly reached position.
    pub fn check_structural(&mut self, pos: Vec3) -> Termination {
        if !self.fetch_tissue_data(pos) {
            return Termination::ExitImage;
        }
        let Some(t) = self.tissues else {
            return Termination::ExitImage;
        };
        if t.is_csf() {
            return Termination::EnterCsf;
        }
        if t.is_cgm() {
            return Termination::EnterCgm;
        }
        if t.is_sgm() {
            self.sgm_depth += 1;
        } else if self.sgm_depth > 0 {
            return Termination::ExitSgm;
        }
        Termination::Continue
    }

    /// Whether the last fetched position is flagged as pathological tissue.
    pub fn in_pathology(&self) -> bool {
        self.tissues.is_some_and(|t| t.is_path())
    }

    /// Seeds inside cortical grey matter can only grow one way: into white matter.
    pub fn seed_is_unidirectional(&mut self, pos: Vec3) -> bool {
        self.fetch_tissue_data(pos) && self.tissues.is_some_and(|t| t.is_cgm())
    }

    /// Move the last point back along the final segment onto the cortical boundary.
    pub fn crop_at_gmwmi(&mut self, points: &mut [Vec3]) {
        let n = points.len();
        if n < 2 {
            return;
        }
        let (inside, outside) = (points[n - 2], points[n - 1]);
        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        for _ in 0..GMWMI_BISECTIONS {
            let mid = 0.5 * (lo + hi);
            let in_cortex = self
                .field
                .fetch(inside.lerp(outside, mid))
                .is_none_or(|t| t.is_cgm());
            if in_cortex {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        points[n - 1] = inside.lerp(outside, 0.5 * (lo + hi));
    }
}
