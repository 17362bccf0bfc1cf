//! Public and internal types for the fibertrack API and pipeline.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{TrackError, TrackResult};

/// Position and heading of the growing tip. Handed to the step source on every call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepState {
    pub pos: Vec3,
    pub dir: Vec3,
}

impl StepState {
    pub fn new(pos: Vec3, dir: Vec3) -> Self {
        Self { pos, dir }
    }
}

/// A finished path. `seed_index` is where the seed landed after bidirectional assembly.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Streamline {
    pub points: Vec<Vec3>,
    pub seed_index: usize,
}

impl Streamline {
    pub fn new(points: Vec<Vec3>, seed_index: usize) -> Self {
        Self { points, seed_index }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn seed(&self) -> Option<Vec3> {
        self.points.get(self.seed_index).copied()
    }

    /// Sum of segment lengths.
    pub fn length(&self) -> f32 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// How the tracker advances one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    /// One step-source call per step.
    #[default]
    Single,
    /// 4-stage Runge-Kutta with a curvature check on the combined direction.
    Rk4,
}

/// Anatomically-constrained tracking sub-options.
#[derive(Clone, Debug, PartialEq)]
pub struct ActOpts {
    /// Truncate and regrow paths that terminate badly instead of discarding them.
    pub backtrack: bool,
    /// Move the final point onto the grey/white boundary when a path enters cortex.
    pub crop_at_gmwmi: bool,
    /// Minimum integral of wm² × step along the path. 0 disables.
    pub wm_integral_req: f32,
    /// Minimum peak wm fraction along the path. 0 disables.
    pub wm_absolute_req: f32,
}

impl Default for ActOpts {
    fn default() -> Self {
        Self {
            backtrack: false,
            crop_at_gmwmi: false,
            wm_integral_req: 0.0,
            wm_absolute_req: 0.0,
        }
    }
}

/// Tracking options. Read-only once tracking starts; shared by every worker.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackOpts {
    /// Target number of accepted paths. None runs until the seed source is exhausted.
    pub number: Option<u64>,
    /// Cap on seeds drawn (accepted + rejected). None derives it from `number`.
    pub max_seed_attempts: Option<u64>,
    /// Override worker thread count. When None, uses available parallelism.
    pub num_threads: Option<usize>,
    /// Capacity of the hand-off channels between stages.
    pub channel_cap: Option<usize>,
    /// Step size in mm; used by RK4 and by the wm requirement integral.
    pub step_size: f32,
    /// Minimum accepted path length in points (inclusive).
    pub min_points: usize,
    /// Maximum path length in points (inclusive).
    pub max_points: usize,
    /// Cosine of the maximum angle between single steps (consumed by step sources).
    pub cos_max_angle: f32,
    /// Cosine of the maximum angle across one RK4 step.
    pub cos_max_angle_rk4: f32,
    pub integration: Integration,
    /// Grow from the seed in one direction only.
    pub unidirectional: bool,
    /// Stop a path as soon as it has touched every inclusion region.
    pub stop_on_all_include: bool,
    /// Keep every n-th point of accepted paths. 1 keeps all.
    pub downsample: usize,
    /// Anatomically-constrained mode. Requires a tissue field in [`Properties`](crate::tracking::Properties).
    pub act: Option<ActOpts>,
}

impl Default for TrackOpts {
    fn default() -> Self {
        Self {
            number: None,
            max_seed_attempts: None,
            num_threads: None,
            channel_cap: None,
            step_size: 0.5,
            min_points: 2,
            max_points: 1000,
            cos_max_angle: 45.0_f32.to_radians().cos(),
            cos_max_angle_rk4: 45.0_f32.to_radians().cos(),
            integration: Integration::Single,
            unidirectional: false,
            stop_on_all_include: false,
            downsample: 1,
            act: None,
        }
    }
}

impl TrackOpts {
    pub fn is_act(&self) -> bool {
        self.act.is_some()
    }

    pub fn backtrack(&self) -> bool {
        self.act.as_ref().is_some_and(|a| a.backtrack)
    }

    pub fn crop_at_gmwmi(&self) -> bool {
        self.act.as_ref().is_some_and(|a| a.crop_at_gmwmi)
    }

    pub fn is_rk4(&self) -> bool {
        self.integration == Integration::Rk4
    }

    /// Reject malformed options. Runs before any thread starts.
    pub fn validate(&self) -> TrackResult<()> {
        if self.max_points < 2 {
            return Err(TrackError::config(format!(
                "maximum length must be at least 2 points, got {}",
                self.max_points
            )));
        }
        if self.min_points > self.max_points {
            return Err(TrackError::config(format!(
                "minimum length ({} points) exceeds maximum length ({} points)",
                self.min_points, self.max_points
            )));
        }
        if !(self.step_size > 0.0) || !self.step_size.is_finite() {
            return Err(TrackError::config(format!(
                "step size must be positive, got {}",
                self.step_size
            )));
        }
        for (name, c) in [
            ("cos_max_angle", self.cos_max_angle),
            ("cos_max_angle_rk4", self.cos_max_angle_rk4),
        ] {
            if !(-1.0..=1.0).contains(&c) {
                return Err(TrackError::config(format!(
                    "{} must lie in [-1, 1], got {}",
                    name, c
                )));
            }
        }
        if self.downsample == 0 {
            return Err(TrackError::config("downsample factor must be at least 1"));
        }
        if self.num_threads == Some(0) {
            return Err(TrackError::config("thread count must be at least 1"));
        }
        if self.number == Some(0) {
            return Err(TrackError::config("target number of tracks must be at least 1"));
        }
        if let Some(act) = &self.act
            && (act.wm_integral_req < 0.0 || act.wm_absolute_req < 0.0)
        {
            return Err(TrackError::config(
                "white matter requirements must not be negative",
            ));
        }
        Ok(())
    }
}

/// Output format for file writers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MRtrix-style binary track file.
    #[default]
    Tck,
    /// One JSON object per line.
    Jsonl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(TrackOpts::default().validate().is_ok());
    }

    #[test]
    fn angle_threshold_outside_unit_range_is_rejected() {
        let opts = TrackOpts {
            cos_max_angle_rk4: 1.5,
            ..TrackOpts::default()
        };
        assert!(opts.validate().is_err());
        let opts = TrackOpts {
            downsample: 0,
            ..TrackOpts::default()
        };
        assert!(opts.validate().is_err());
    }
}
