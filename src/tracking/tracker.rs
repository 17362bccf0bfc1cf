//! Per-path growth state machine.

use glam::Vec3;
use log::trace;
use std::sync::Arc;

use super::act::ActState;
use super::method::StepSource;
use super::shared::Shared;
use super::termination::{Rejection, Termination};
use crate::error::{TrackError, TrackResult};
use crate::seeding::SeedSource;
use crate::types::{StepState, Streamline};
use crate::utils::config::MAX_NUM_SEED_ATTEMPTS;

/// Result of one seed attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Grown {
    Accepted(Streamline),
    Rejected(Rejection),
}

/// Mutable state of the path in flight. Reset for every seed attempt.
pub struct GrowthState {
    pub step: StepState,
    /// One bit per inclusion region; set on first touch.
    pub included: Vec<bool>,
    pub rejected: Option<Rejection>,
    pub act: Option<ActState>,
}

impl GrowthState {
    fn reset(&mut self) {
        self.step = StepState::default();
        self.included.fill(false);
        self.rejected = None;
        if let Some(act) = self.act.as_mut() {
            act.sgm_depth = 0;
        }
    }

    fn traversed_all_include_regions(&self) -> bool {
        self.included.iter().all(|&b| b)
    }
}

/// Grows one path at a time with its own step source.
pub struct Tracker<M: StepSource> {
    shared: Arc<Shared>,
    method: M,
    growth: GrowthState,
}

impl<M: StepSource> Tracker<M> {
    pub fn new(shared: Arc<Shared>, method: M) -> Self {
        let act = match (shared.is_act(), shared.props.tissues.as_ref()) {
            (true, Some(field)) => Some(ActState::new(Arc::clone(field))),
            _ => None,
        };
        let growth = GrowthState {
            step: StepState::default(),
            included: vec![false; shared.props.include.len()],
            rejected: None,
            act,
        };
        Self {
            shared,
            method,
            growth,
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Draw a seed and grow it into a classified path.
    ///
    /// Ok(None) means a finite seed source is exhausted. Err is reserved for an unbounded
    /// source that failed to yield a valid seed within [`MAX_NUM_SEED_ATTEMPTS`].
    pub fn grow(&mut self, seeds: &dyn SeedSource) -> TrackResult<Option<Grown>> {
        let Some(mut track) = self.gen_track(seeds)? else {
            return Ok(None);
        };
        if let Some(reason) = self.track_rejected(&track.points) {
            return Ok(Some(Grown::Rejected(reason)));
        }
        self.shared.downsampler.apply(&mut track);
        Ok(Some(Grown::Accepted(track)))
    }

    fn acquire_seed(&mut self, seeds: &dyn SeedSource) -> TrackResult<Option<bool>> {
        if seeds.is_finite() {
            let Some(seed) = seeds.get_seed() else {
                return Ok(None);
            };
            self.growth.step = StepState::new(seed.pos, seed.dir);
            let valid = self.method.check_seed(&self.growth.step)
                && self.method.init(&mut self.growth.step);
            return Ok(Some(valid));
        }
        for _ in 0..MAX_NUM_SEED_ATTEMPTS {
            if let Some(seed) = seeds.get_seed() {
                self.growth.step = StepState::new(seed.pos, seed.dir);
                if self.method.check_seed(&self.growth.step)
                    && self.method.init(&mut self.growth.step)
                {
                    return Ok(Some(true));
                }
            }
        }
        Err(TrackError::SeedExhausted {
            attempts: MAX_NUM_SEED_ATTEMPTS,
        })
    }

    fn gen_track(&mut self, seeds: &dyn SeedSource) -> TrackResult<Option<Streamline>> {
        self.growth.reset();

        match self.acquire_seed(seeds)? {
            None => return Ok(None),
            Some(false) => {
                self.reject(Rejection::InvalidSeed);
                self.shared.stats.add_rejection(Rejection::InvalidSeed);
                return Ok(Some(Streamline::default()));
            }
            Some(true) => {}
        }

        let seed_pos = self.growth.step.pos;
        let seed_dir = self.growth.step.dir;

        let mut unidirectional = self.shared.opts.unidirectional;
        if !unidirectional && let Some(act) = self.growth.act.as_mut() {
            unidirectional = act.seed_is_unidirectional(seed_pos);
        }

        self.shared
            .props
            .include
            .contains_and_mark(seed_pos, &mut self.growth.included);

        let mut forward = vec![seed_pos];
        self.gen_track_unidir(&mut forward, 0);

        if self.growth.rejected.is_some() || unidirectional {
            return Ok(Some(Streamline::new(forward, 0)));
        }

        self.growth.step = StepState::new(seed_pos, -seed_dir);
        self.method.reverse_track();
        let mut backward = vec![seed_pos];
        self.gen_track_unidir(&mut backward, forward.len() - 1);

        forward.reverse();
        let seed_index = forward.len() - 1;
        forward.extend_from_slice(&backward[1..]);
        Ok(Some(Streamline::new(forward, seed_index)))
    }

    /// Grow `seg` (which starts at the seed) until a terminal outcome. `offset` is the number of
    /// points already grown in the other direction, counted against the length cap.
    fn gen_track_unidir(&mut self, seg: &mut Vec<Vec3>, offset: usize) {
        if let Some(act) = self.growth.act.as_mut() {
            act.sgm_depth = 0;
        }
        let max_points = self.shared.opts.max_points;
        let backtrack = self.shared.opts.backtrack();
        let mut revert_step = 0_usize;

        let mut termination = loop {
            let mut termination = self.iterate();
            if termination.adds_point() {
                seg.push(self.growth.step.pos);
            }
            if !termination.is_terminal() {
                if offset + seg.len() >= max_points {
                    break Termination::LengthExceed;
                }
                continue;
            }
            if backtrack {
                self.apply_priors(&mut termination);
                if self.growth.rejected.is_some() && termination != Termination::EnterExclude {
                    revert_step += 1;
                    self.truncate_track(seg, revert_step);
                    if seg.len() > 1 {
                        trace!("backtracking {} points after {:?}", revert_step, termination);
                        self.growth.rejected = None;
                        let tail = seg[seg.len() - 1];
                        let prev = seg[seg.len() - 2];
                        self.growth.step = StepState::new(tail, (tail - prev).normalize_or_zero());
                        continue;
                    }
                }
            }
            break termination;
        };

        self.apply_priors(&mut termination);

        if termination == Termination::ExitSgm {
            self.truncate_exit_sgm(seg);
            if let Some(&tail) = seg.last() {
                self.growth.step.pos = tail;
            }
        }

        if let Some(reason) = self.growth.rejected {
            self.shared.stats.add_rejection(reason);
        }

        if termination == Termination::EnterCgm
            && self.shared.opts.crop_at_gmwmi()
            && let Some(act) = self.growth.act.as_mut()
        {
            act.crop_at_gmwmi(seg);
        }

        self.shared.stats.add_termination(termination);
    }

    /// One step plus the containment checks that follow it.
    fn iterate(&mut self) -> Termination {
        let method_term = if self.shared.opts.is_rk4() {
            self.next_rk4()
        } else {
            self.method.next(&mut self.growth.step)
        };

        if method_term.is_terminal() {
            let in_sgm = self.growth.act.as_ref().is_some_and(|a| a.sgm_depth > 0);
            return if in_sgm {
                Termination::TermInSgm
            } else {
                method_term
            };
        }

        let pos = self.growth.step.pos;
        if let Some(act) = self.growth.act.as_mut() {
            let structural = act.check_structural(pos);
            if structural.is_terminal() {
                return structural;
            }
        }

        let props = &self.shared.props;
        if !props.mask.is_empty() && !props.mask.contains(pos) {
            return Termination::ExitMask;
        }
        if props.exclude.contains(pos) {
            return Termination::EnterExclude;
        }
        // With backtracking, inclusion can only be judged once the path is final.
        if !self.shared.opts.backtrack() {
            props.include.contains_and_mark(pos, &mut self.growth.included);
        }
        if self.shared.opts.stop_on_all_include && self.growth.traversed_all_include_regions() {
            return Termination::TraverseAllInclude;
        }
        Termination::Continue
    }

    fn next_rk4(&mut self) -> Termination {
        let step = self.shared.opts.step_size;
        let init = self.growth.step;

        let term = self.method.next(&mut self.growth.step);
        if term.is_terminal() {
            return term;
        }
        let k1 = self.growth.step.dir;

        self.growth.step = StepState::new(init.pos + k1 * (0.5 * step), init.dir);
        let term = self.method.next(&mut self.growth.step);
        if term.is_terminal() {
            return term;
        }
        let k2 = self.growth.step.dir;

        self.growth.step = StepState::new(init.pos + k2 * (0.5 * step), init.dir);
        let term = self.method.next(&mut self.growth.step);
        if term.is_terminal() {
            return term;
        }
        let k3 = self.growth.step.dir;

        self.growth.step = StepState::new(init.pos + k3 * step, (k2 + k3).normalize_or_zero());
        let term = self.method.next(&mut self.growth.step);
        if term.is_terminal() {
            return term;
        }
        let k4 = self.growth.step.dir;

        let dir = (k1 + k2 * 2.0 + k3 * 2.0 + k4).normalize_or_zero();
        let final_state = StepState::new(init.pos + dir * step, dir);
        self.growth.step = final_state;
        let term = self.method.next(&mut self.growth.step);
        if term.is_terminal() {
            return term;
        }
        if k1.dot(self.growth.step.dir) < self.shared.opts.cos_max_angle_rk4 {
            return Termination::HighCurvature;
        }
        self.growth.step = final_state;
        Termination::Continue
    }

    /// Reinterpret a raw termination; may downgrade it or mark the path rejected.
    fn apply_priors(&mut self, termination: &mut Termination) {
        debug_assert!(
            self.growth.act.is_some() || !termination.is_act_only(),
            "step source reported {:?} without tissue data",
            termination
        );
        match *termination {
            Termination::Continue
            | Termination::EnterCgm
            | Termination::ExitImage
            | Termination::ExitMask
            | Termination::ExitSgm
            | Termination::TermInSgm
            | Termination::TraverseAllInclude => {}
            Termination::EnterCsf | Termination::LengthExceed | Termination::EnterExclude => {
                self.reject_on(*termination);
            }
            Termination::CalibrateFail | Termination::BadSignal | Termination::HighCurvature => {
                // Without tissue data these are ordinary stopping criteria.
                if let Some(act) = self.growth.act.as_ref() {
                    if act.sgm_depth > 0 {
                        *termination = Termination::TermInSgm;
                    } else if !act.in_pathology() {
                        self.reject_on(*termination);
                    }
                }
            }
        }
    }

    fn reject_on(&mut self, termination: Termination) {
        if let Some(reason) = Rejection::from_termination(termination) {
            self.reject(reason);
        }
    }

    fn reject(&mut self, reason: Rejection) {
        self.growth.rejected = Some(reason);
    }

    /// Drop up to `revert_step` trailing points, never the seed. The step source is told how
    /// many were actually removed.
    fn truncate_track(&mut self, seg: &mut Vec<Vec3>, revert_step: usize) {
        let old_len = seg.len();
        seg.truncate(old_len.saturating_sub(revert_step).max(1));
        let removed = old_len - seg.len();
        if let Some(act) = self.growth.act.as_mut() {
            act.sgm_depth = act.sgm_depth.saturating_sub(removed);
        }
        self.method.truncate_track(removed);
    }

    /// Crop the sub-cortical segment at its lowest-metric point.
    fn truncate_exit_sgm(&mut self, seg: &mut Vec<Vec3>) {
        let depth = self.growth.act.as_ref().map_or(0, |a| a.sgm_depth);
        if depth == 0 || seg.len() < 2 {
            return;
        }
        let start = seg.len().saturating_sub(depth).max(1);
        let mut best = seg.len() - 1;
        let mut min_value = f32::INFINITY;
        for i in start..seg.len() {
            let probe = StepState::new(seg[i], (seg[i] - seg[i - 1]).normalize_or_zero());
            let value = self.method.metric(&probe);
            if value < min_value {
                min_value = value;
                best = i;
            }
        }
        seg.truncate(best + 1);
    }

    /// Whole-path acceptance test. Counts the reason for anything not already counted.
    fn track_rejected(&mut self, points: &[Vec3]) -> Option<Rejection> {
        if let Some(reason) = self.growth.rejected {
            return Some(reason);
        }
        if points.len() < self.shared.opts.min_points {
            self.shared.stats.add_rejection(Rejection::TrackTooShort);
            return Some(Rejection::TrackTooShort);
        }

        if self.shared.is_act() {
            if !self.satisfy_wm_requirement(points) {
                self.shared
                    .stats
                    .add_rejection(Rejection::ActFailedWmRequirement);
                return Some(Rejection::ActFailedWmRequirement);
            }
            if self.shared.opts.backtrack() {
                for &p in points {
                    self.shared
                        .props
                        .include
                        .contains_and_mark(p, &mut self.growth.included);
                }
            }
        }

        if !self.growth.traversed_all_include_regions() {
            self.shared
                .stats
                .add_rejection(Rejection::MissedIncludeRegion);
            return Some(Rejection::MissedIncludeRegion);
        }
        None
    }

    fn satisfy_wm_requirement(&mut self, points: &[Vec3]) -> bool {
        let opts = &self.shared.opts;
        // Seed-only diagnostic runs never satisfy a length-based requirement.
        if opts.max_points == 2 {
            return true;
        }
        let Some(act_opts) = opts.act.as_ref() else {
            return true;
        };
        if act_opts.wm_integral_req <= 0.0 && act_opts.wm_absolute_req <= 0.0 {
            return true;
        }
        let Some(act) = self.growth.act.as_mut() else {
            return true;
        };
        let (mut integral, mut max_value) = (0.0_f32, 0.0_f32);
        for &p in points {
            if act.fetch_tissue_data(p)
                && let Some(t) = act.tissues()
            {
                max_value = max_value.max(t.wm);
                integral += t.wm * t.wm * opts.step_size;
                if integral >= act_opts.wm_integral_req && max_value >= act_opts.wm_absolute_req {
                    return true;
                }
            }
        }
        false
    }
}
