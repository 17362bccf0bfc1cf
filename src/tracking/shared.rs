//! State shared by every tracker worker: read-only properties plus atomic counters.

use log::debug;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::method::TissueField;
use super::termination::{Rejection, Termination};
use crate::error::{TrackError, TrackResult};
use crate::roi::RoiSet;
use crate::types::{Streamline, TrackOpts};
use crate::utils::config::DEFAULT_ATTEMPTS_PER_TRACK;

/// Regions and tissue data. Immutable once tracking starts.
#[derive(Clone, Default)]
pub struct Properties {
    pub include: RoiSet,
    pub exclude: RoiSet,
    /// Tracking mask; empty means unrestricted.
    pub mask: RoiSet,
    /// Required in anatomically-constrained mode.
    pub tissues: Option<Arc<dyn TissueField>>,
}

/// Per-reason counters, incremented by every worker on every path.
pub struct TrackStats {
    terminations: [AtomicU64; Termination::COUNT],
    rejections: [AtomicU64; Rejection::COUNT],
}

impl Default for TrackStats {
    fn default() -> Self {
        Self {
            terminations: std::array::from_fn(|_| AtomicU64::new(0)),
            rejections: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl TrackStats {
    pub fn add_termination(&self, term: Termination) {
        self.terminations[term.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rejection(&self, reason: Rejection) {
        self.rejections[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn termination(&self, term: Termination) -> u64 {
        self.terminations[term.index()].load(Ordering::Relaxed)
    }

    pub fn rejection(&self, reason: Rejection) -> u64 {
        self.rejections[reason.index()].load(Ordering::Relaxed)
    }
}

/// Seed/acceptance budget. The only stop condition besides seed exhaustion.
pub struct TrackBudget {
    target: Option<u64>,
    max_attempts: Option<u64>,
    accepted: AtomicU64,
    generated: AtomicU64,
    stop: AtomicBool,
}

impl TrackBudget {
    pub fn new(target: Option<u64>, max_attempts: Option<u64>) -> Self {
        Self {
            target,
            max_attempts,
            accepted: AtomicU64::new(0),
            generated: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> Option<u64> {
        self.target
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }

    /// True once no worker should draw another seed.
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
            || self.target.is_some_and(|t| self.accepted() >= t)
            || self.max_attempts.is_some_and(|m| self.generated() >= m)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Count one seed that was grown into a path (accepted or not).
    pub fn record_generated(&self) -> u64 {
        self.generated.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_accepted(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of the counters for reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub generated: u64,
    pub accepted: u64,
    pub terminations: [u64; Termination::COUNT],
    pub rejections: [u64; Rejection::COUNT],
}

impl StatsSnapshot {
    pub fn termination(&self, term: Termination) -> u64 {
        self.terminations[term.index()]
    }

    pub fn rejection(&self, reason: Rejection) -> u64 {
        self.rejections[reason.index()]
    }

    pub fn rejected(&self) -> u64 {
        self.rejections.iter().sum()
    }
}

/// Drops intermediate points of accepted paths, keeping the seed sampling phase and both ends.
#[derive(Clone, Copy, Debug)]
pub struct Downsampler {
    ratio: usize,
}

impl Downsampler {
    pub fn new(ratio: usize) -> Self {
        Self {
            ratio: ratio.max(1),
        }
    }

    pub fn apply(&self, track: &mut Streamline) {
        if self.ratio <= 1 || track.points.len() < 3 {
            return;
        }
        let seed = track.seed_index;
        let last = track.points.len() - 1;
        let mut new_seed = 0;
        let mut kept = Vec::with_capacity(track.points.len() / self.ratio + 2);
        for (i, p) in track.points.iter().enumerate() {
            if i == 0 || i == last || i.abs_diff(seed) % self.ratio == 0 {
                if i == seed {
                    new_seed = kept.len();
                }
                kept.push(*p);
            }
        }
        track.points = kept;
        track.seed_index = new_seed;
    }
}

/// Everything a worker reads: options, properties, counters and budget.
pub struct Shared {
    pub opts: TrackOpts,
    pub props: Properties,
    pub stats: TrackStats,
    pub budget: TrackBudget,
    pub downsampler: Downsampler,
}

impl Shared {
    /// Validate the setup and build the shared state. Fails before any path is generated.
    pub fn new(opts: TrackOpts, props: Properties, finite_seeds: bool) -> TrackResult<Self> {
        validate(&opts, &props, finite_seeds)?;
        let max_attempts = opts
            .max_seed_attempts
            .or_else(|| opts.number.map(|n| n.saturating_mul(DEFAULT_ATTEMPTS_PER_TRACK)));
        debug!(
            "Budget: target {:?}, max seed attempts {:?}",
            opts.number, max_attempts
        );
        Ok(Self {
            budget: TrackBudget::new(opts.number, max_attempts),
            downsampler: Downsampler::new(opts.downsample),
            stats: TrackStats::default(),
            opts,
            props,
        })
    }

    pub fn is_act(&self) -> bool {
        self.opts.is_act()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            generated: self.budget.generated(),
            accepted: self.budget.accepted(),
            terminations: std::array::from_fn(|i| self.stats.termination(Termination::ALL[i])),
            rejections: std::array::from_fn(|i| self.stats.rejection(Rejection::ALL[i])),
        }
    }
}

/// Checks that need the properties or the seed source on top of [`TrackOpts::validate`].
fn validate(opts: &TrackOpts, props: &Properties, finite_seeds: bool) -> TrackResult<()> {
    opts.validate()?;
    if opts.is_act() && props.tissues.is_none() {
        return Err(TrackError::config(
            "anatomically-constrained tracking requires a tissue image",
        ));
    }
    if !opts.is_act() && props.tissues.is_some() {
        log::warn!("Tissue image supplied but anatomically-constrained mode is off; ignoring it");
    }
    if opts.stop_on_all_include && props.include.is_empty() {
        return Err(TrackError::config(
            "stopping on all include regions requires at least one include region",
        ));
    }
    if !finite_seeds && opts.number.is_none() && opts.max_seed_attempts.is_none() {
        return Err(TrackError::config(
            "unbounded seed source needs a target number of tracks or a seed attempt cap",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn line(n: usize, seed_index: usize) -> Streamline {
        Streamline::new(
            (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            seed_index,
        )
    }

    #[test]
    fn downsample_keeps_ends_and_seed() {
        let mut t = line(10, 4);
        Downsampler::new(3).apply(&mut t);
        let xs: Vec<f32> = t.points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 4.0, 7.0, 9.0]);
        assert_eq!(t.seed_index, 2);
        assert_eq!(t.points[t.seed_index].x, 4.0);
    }

    #[test]
    fn downsample_ratio_one_is_identity() {
        let mut t = line(7, 0);
        Downsampler::new(1).apply(&mut t);
        assert_eq!(t, line(7, 0));
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let opts = TrackOpts {
            min_points: 20,
            max_points: 10,
            ..TrackOpts::default()
        };
        assert!(matches!(
            Shared::new(opts, Properties::default(), true),
            Err(TrackError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn validate_requires_budget_for_infinite_seeds() {
        assert!(Shared::new(TrackOpts::default(), Properties::default(), false).is_err());
        let opts = TrackOpts {
            number: Some(5),
            ..TrackOpts::default()
        };
        let shared = Shared::new(opts, Properties::default(), false).unwrap();
        assert_eq!(shared.budget.max_attempts(), Some(5 * DEFAULT_ATTEMPTS_PER_TRACK));
    }

    #[test]
    fn budget_stops_at_target() {
        let budget = TrackBudget::new(Some(2), None);
        assert!(!budget.should_stop());
        budget.record_accepted();
        budget.record_accepted();
        assert!(budget.should_stop());
    }
}
