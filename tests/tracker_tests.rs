use fibertrack::roi::{Region, RoiSet};
use fibertrack::seeding::{FixedSeeds, SeedSource, SphereSeed};
use fibertrack::tracking::{
    FieldStepper, Grown, Properties, Rejection, Shared, StepSource, Termination, TissueField,
    Tissues, Tracker, UniformField,
};
use fibertrack::{ActOpts, Integration, StepState, TrackError, TrackOpts};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};

/// Steps `step` along the current direction for every `Continue` in `script`, then keeps
/// returning `fallback`. Restarts the script for every seed and for the second half.
#[derive(Clone)]
struct Scripted {
    step: f32,
    script: Vec<Termination>,
    fallback: Termination,
    cursor: usize,
    valid_seed: bool,
}

impl Scripted {
    fn new(continues: usize, fallback: Termination) -> Self {
        Self::with_script(vec![Termination::Continue; continues], fallback)
    }

    fn with_script(script: Vec<Termination>, fallback: Termination) -> Self {
        Self {
            step: 1.0,
            script,
            fallback,
            cursor: 0,
            valid_seed: true,
        }
    }
}

impl StepSource for Scripted {
    fn check_seed(&mut self, _state: &StepState) -> bool {
        self.valid_seed
    }

    fn init(&mut self, _state: &mut StepState) -> bool {
        self.cursor = 0;
        true
    }

    fn next(&mut self, state: &mut StepState) -> Termination {
        let term = self
            .script
            .get(self.cursor)
            .copied()
            .unwrap_or(self.fallback);
        self.cursor += 1;
        if term == Termination::Continue {
            state.pos += state.dir * self.step;
        }
        term
    }

    fn reverse_track(&mut self) {
        self.cursor = 0;
    }
}

/// Wraps [`Scripted`] and records every `truncate_track` call.
struct Recording {
    inner: Scripted,
    truncations: Arc<Mutex<Vec<usize>>>,
}

impl Recording {
    fn new(inner: Scripted) -> (Self, Arc<Mutex<Vec<usize>>>) {
        let truncations = Arc::new(Mutex::new(Vec::new()));
        let method = Self {
            inner,
            truncations: Arc::clone(&truncations),
        };
        (method, truncations)
    }
}

impl StepSource for Recording {
    fn init(&mut self, state: &mut StepState) -> bool {
        self.inner.init(state)
    }

    fn next(&mut self, state: &mut StepState) -> Termination {
        self.inner.next(state)
    }

    fn truncate_track(&mut self, removed: usize) {
        self.truncations.lock().unwrap().push(removed);
    }
}

fn origin_seed() -> FixedSeeds {
    FixedSeeds::with_directions([(Vec3::ZERO, Vec3::X)], StdRng::seed_from_u64(1))
}

fn opts(min_points: usize, max_points: usize) -> TrackOpts {
    TrackOpts {
        step_size: 1.0,
        min_points,
        max_points,
        unidirectional: true,
        ..TrackOpts::default()
    }
}

fn tracker<M: StepSource>(opts: TrackOpts, props: Properties, method: M) -> Tracker<M> {
    let shared = Arc::new(Shared::new(opts, props, true).unwrap());
    Tracker::new(shared, method)
}

fn xs(track: &fibertrack::Streamline) -> Vec<f32> {
    track.points.iter().map(|p| p.x).collect()
}

/// wm for x < 4, sgm for 4 <= x < 6, wm up to 8, cortex up to 10, csf beyond; image ends at 20.
fn layered() -> Arc<dyn TissueField> {
    Arc::new(|p: Vec3| {
        if p.x < -20.0 || p.x > 20.0 {
            return None;
        }
        let mut t = Tissues::default();
        if p.x >= 10.0 {
            t.csf = 1.0;
        } else if p.x >= 8.0 {
            t.cgm = 1.0;
        } else if (4.0..6.0).contains(&p.x) {
            t.sgm = 1.0;
        } else {
            t.wm = 1.0;
        }
        Some(t)
    })
}

fn act_props() -> Properties {
    Properties {
        tissues: Some(layered()),
        ..Properties::default()
    }
}

fn uniform_tissue(t: Tissues) -> Properties {
    Properties {
        tissues: Some(Arc::new(move |_p: Vec3| Some(t)) as Arc<dyn TissueField>),
        ..Properties::default()
    }
}

fn act_opts(backtrack: bool, crop_at_gmwmi: bool) -> TrackOpts {
    TrackOpts {
        act: Some(ActOpts {
            backtrack,
            crop_at_gmwmi,
            ..ActOpts::default()
        }),
        ..opts(2, 100)
    }
}

// --- basic growth and length limits ---

#[test]
fn test_straight_path_exits_image() {
    let mut t = tracker(
        opts(2, 100),
        Properties::default(),
        Scripted::new(9, Termination::ExitImage),
    );
    let seeds = origin_seed();
    let Some(Grown::Accepted(track)) = t.grow(&seeds).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(xs(&track), (0..10).map(|i| i as f32).collect::<Vec<_>>());
    assert_eq!(track.seed_index, 0);

    let snap = t.shared().snapshot();
    assert_eq!(snap.termination(Termination::ExitImage), 1);
    assert_eq!(snap.rejected(), 0);

    // Finite source is now exhausted.
    assert_eq!(t.grow(&seeds).unwrap(), None);
}

#[test]
fn test_length_cap_rejects_as_too_long() {
    let mut t = tracker(
        opts(2, 5),
        Properties::default(),
        Scripted::new(9, Termination::ExitImage),
    );
    let grown = t.grow(&origin_seed()).unwrap();
    assert_eq!(grown, Some(Grown::Rejected(Rejection::TrackTooLong)));
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejection(Rejection::TrackTooLong), 1);
    assert_eq!(snap.termination(Termination::LengthExceed), 1);
    assert_eq!(snap.rejected(), 1);
}

#[test]
fn test_min_points_boundary() {
    let mut exact = tracker(
        opts(10, 100),
        Properties::default(),
        Scripted::new(9, Termination::ExitImage),
    );
    assert!(matches!(
        exact.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(t)) if t.len() == 10
    ));

    let mut short = tracker(
        opts(11, 100),
        Properties::default(),
        Scripted::new(9, Termination::ExitImage),
    );
    assert_eq!(
        short.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::TrackTooShort))
    );
    assert_eq!(
        short.shared().snapshot().rejection(Rejection::TrackTooShort),
        1
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "without tissue data")]
fn test_tissue_outcome_without_act_is_a_step_source_bug() {
    let mut t = tracker(
        opts(2, 100),
        Properties::default(),
        Scripted::new(1, Termination::EnterCsf),
    );
    let _ = t.grow(&origin_seed());
}

#[test]
fn test_curvature_is_neutral_without_act() {
    let mut t = tracker(
        opts(2, 100),
        Properties::default(),
        Scripted::new(3, Termination::HighCurvature),
    );
    assert!(matches!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(tr)) if tr.len() == 4
    ));
    assert_eq!(
        t.shared().snapshot().termination(Termination::HighCurvature),
        1
    );
}

// --- bidirectional assembly ---

#[test]
fn test_bidirectional_reverses_forward_half() {
    let o = TrackOpts {
        unidirectional: false,
        ..opts(2, 100)
    };
    let mut t = tracker(
        o,
        Properties::default(),
        Scripted::new(3, Termination::ExitImage),
    );
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(xs(&track), vec![3.0, 2.0, 1.0, 0.0, -1.0, -2.0, -3.0]);
    assert_eq!(track.seed_index, 3);
    assert_eq!(track.seed(), Some(Vec3::ZERO));
    assert_eq!(
        t.shared().snapshot().termination(Termination::ExitImage),
        2
    );
}

#[test]
fn test_bidirectional_length_counts_both_halves() {
    let o = TrackOpts {
        unidirectional: false,
        ..opts(2, 6)
    };
    let mut t = tracker(
        o,
        Properties::default(),
        Scripted::new(3, Termination::ExitImage),
    );
    // Forward half holds 4 points, so the backward half hits the cap after 2 more.
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::TrackTooLong))
    );
}

// --- seeds ---

#[test]
fn test_invalid_finite_seed_is_counted_once() {
    let mut method = Scripted::new(3, Termination::ExitImage);
    method.valid_seed = false;
    let mut t = tracker(opts(2, 100), Properties::default(), method);
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::InvalidSeed))
    );
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejection(Rejection::InvalidSeed), 1);
    assert_eq!(snap.rejected(), 1);
}

#[test]
fn test_unbounded_source_without_valid_seed_is_fatal() {
    let mut method = Scripted::new(3, Termination::ExitImage);
    method.valid_seed = false;
    let o = TrackOpts {
        number: Some(1),
        ..opts(2, 100)
    };
    let shared = Arc::new(Shared::new(o, Properties::default(), false).unwrap());
    let mut t = Tracker::new(shared, method);
    let seeds = SphereSeed::new(Vec3::ZERO, 1.0, StdRng::seed_from_u64(2)).unwrap();
    assert!(!seeds.is_finite());
    assert!(matches!(
        t.grow(&seeds),
        Err(TrackError::SeedExhausted { attempts: 100_000 })
    ));
}

// --- regions ---

fn with_regions(include: Vec<Region>, exclude: Vec<Region>) -> Properties {
    Properties {
        include: include.into_iter().collect(),
        exclude: exclude.into_iter().collect::<RoiSet>(),
        ..Properties::default()
    }
}

#[test]
fn test_include_region_touched_is_accepted() {
    let props = with_regions(vec![Region::sphere(Vec3::new(5.0, 0.0, 0.0), 0.5)], vec![]);
    let mut t = tracker(opts(2, 100), props, Scripted::new(9, Termination::ExitImage));
    assert!(matches!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(_))
    ));
}

#[test]
fn test_missed_include_region_rejects() {
    let props = with_regions(vec![Region::sphere(Vec3::new(0.0, 5.0, 0.0), 0.5)], vec![]);
    let mut t = tracker(opts(2, 100), props, Scripted::new(9, Termination::ExitImage));
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::MissedIncludeRegion))
    );
}

#[test]
fn test_exclude_region_rejects_whole_path() {
    let props = with_regions(vec![], vec![Region::sphere(Vec3::new(5.0, 0.0, 0.0), 0.5)]);
    let mut t = tracker(opts(2, 100), props, Scripted::new(9, Termination::ExitImage));
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::EnterExcludeRegion))
    );
    let snap = t.shared().snapshot();
    assert_eq!(snap.termination(Termination::EnterExclude), 1);
    assert_eq!(snap.rejection(Rejection::EnterExcludeRegion), 1);
}

#[test]
fn test_stop_once_all_include_regions_touched() {
    let props = with_regions(vec![Region::sphere(Vec3::new(3.0, 0.0, 0.0), 0.5)], vec![]);
    let o = TrackOpts {
        stop_on_all_include: true,
        ..opts(2, 100)
    };
    let mut t = tracker(o, props, Scripted::new(9, Termination::ExitImage));
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(xs(&track), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(
        t.shared()
            .snapshot()
            .termination(Termination::TraverseAllInclude),
        1
    );
}

#[test]
fn test_mask_exit_is_neutral() {
    let props = Properties {
        mask: [Region::aabb(Vec3::splat(-1.0), Vec3::new(4.5, 1.0, 1.0))]
            .into_iter()
            .collect(),
        ..Properties::default()
    };
    let mut t = tracker(opts(2, 100), props, Scripted::new(9, Termination::ExitImage));
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(track.len(), 5);
    assert_eq!(t.shared().snapshot().termination(Termination::ExitMask), 1);
}

// --- anatomically-constrained mode ---

#[test]
fn test_act_bad_signal_in_white_matter_rejects() {
    let mut t = tracker(
        act_opts(false, false),
        act_props(),
        Scripted::new(2, Termination::BadSignal),
    );
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::ActPoorTermination))
    );
}

#[test]
fn test_act_bad_signal_in_pathology_is_accepted() {
    let lesion = Tissues {
        path: 1.0,
        ..Tissues::white_matter()
    };
    let mut t = tracker(
        act_opts(false, false),
        uniform_tissue(lesion),
        Scripted::new(2, Termination::BadSignal),
    );
    assert!(matches!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(tr)) if tr.len() == 3
    ));
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejected(), 0);
    assert_eq!(snap.termination(Termination::BadSignal), 1);
}

#[test]
fn test_act_enter_csf_rejects() {
    // White matter up to x = 3, CSF beyond.
    let props = Properties {
        tissues: Some(Arc::new(|p: Vec3| {
            Some(if p.x >= 3.0 {
                Tissues {
                    csf: 1.0,
                    ..Tissues::default()
                }
            } else {
                Tissues::white_matter()
            })
        }) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    let mut t = tracker(
        act_opts(false, false),
        props,
        Scripted::new(20, Termination::ExitImage),
    );
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::ActPoorTermination))
    );
    let snap = t.shared().snapshot();
    assert_eq!(snap.termination(Termination::EnterCsf), 1);
    assert_eq!(snap.rejection(Rejection::ActPoorTermination), 1);
}

#[test]
fn test_act_stop_inside_sgm_is_benign() {
    // Points 1..5 are grown; 4 and 5 lie in sub-cortical grey matter.
    let mut t = tracker(
        act_opts(false, false),
        act_props(),
        Scripted::new(5, Termination::BadSignal),
    );
    assert!(matches!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(_))
    ));
    assert_eq!(t.shared().snapshot().termination(Termination::TermInSgm), 1);
}

#[test]
fn test_act_exit_sgm_is_cropped_inside_sgm() {
    let mut t = tracker(
        act_opts(false, false),
        act_props(),
        Scripted::new(20, Termination::ExitImage),
    );
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(t.shared().snapshot().termination(Termination::ExitSgm), 1);
    // Cropped back to the sub-cortical segment (x in [4, 6)).
    let last = track.points.last().unwrap().x;
    assert!((4.0..6.0).contains(&last), "{}", last);
}

#[test]
fn test_act_enter_cortex_crops_to_boundary() {
    let props = Properties {
        tissues: Some(Arc::new(|p: Vec3| {
            (p.x.abs() < 20.0).then(|| {
                if p.x >= 7.5 {
                    Tissues {
                        cgm: 1.0,
                        ..Tissues::default()
                    }
                } else {
                    Tissues::white_matter()
                }
            })
        }) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    let mut t = tracker(
        act_opts(false, true),
        props,
        Scripted::new(20, Termination::ExitImage),
    );
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(t.shared().snapshot().termination(Termination::EnterCgm), 1);
    assert_eq!(track.len(), 9);
    let last = track.points.last().unwrap().x;
    assert!((last - 7.5).abs() < 0.01, "{}", last);
}

#[test]
fn test_act_wm_requirement() {
    let o = TrackOpts {
        act: Some(ActOpts {
            wm_integral_req: 100.0,
            ..ActOpts::default()
        }),
        ..opts(2, 100)
    };
    let props = Properties {
        tissues: Some(Arc::new(|_p: Vec3| Some(Tissues::white_matter())) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    let mut t = tracker(o, props, Scripted::new(9, Termination::ExitImage));
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::ActFailedWmRequirement))
    );
}

#[test]
fn test_act_wm_requirement_skipped_for_two_point_runs() {
    let o = TrackOpts {
        act: Some(ActOpts {
            wm_integral_req: 100.0,
            ..ActOpts::default()
        }),
        ..opts(2, 2)
    };
    let props = Properties {
        tissues: Some(Arc::new(|p: Vec3| {
            Some(if p.x >= 0.5 {
                Tissues {
                    cgm: 1.0,
                    ..Tissues::default()
                }
            } else {
                Tissues::white_matter()
            })
        }) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    // The first step lands in cortex, which appends the point without a length check.
    let mut t = tracker(o, props, Scripted::new(1, Termination::ExitImage));
    assert!(matches!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Accepted(tr)) if tr.len() == 2
    ));
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejection(Rejection::ActFailedWmRequirement), 0);
    assert_eq!(snap.termination(Termination::EnterCgm), 1);
}

// --- backtracking ---

#[test]
fn test_backtracking_terminates_when_always_rejected() {
    let wm = Properties {
        tissues: Some(Arc::new(|_p: Vec3| Some(Tissues::white_matter())) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    let mut t = tracker(act_opts(true, false), wm, Scripted::new(5, Termination::BadSignal));
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::ActPoorTermination))
    );
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejected(), 1);
    assert_eq!(snap.termination(Termination::BadSignal), 1);
}

#[test]
fn test_backtracking_recovers_shorter_path() {
    let wm = Properties {
        tissues: Some(Arc::new(|_p: Vec3| Some(Tissues::white_matter())) as Arc<dyn TissueField>),
        ..Properties::default()
    };
    let mut script = vec![Termination::Continue; 5];
    script.push(Termination::BadSignal);
    script.extend([Termination::Continue; 2]);
    let mut t = tracker(
        act_opts(true, false),
        wm,
        Scripted::with_script(script, Termination::ExitImage),
    );
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected backtracking to rescue the path");
    };
    // 6 points, one reverted, two more grown.
    assert_eq!(xs(&track), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let snap = t.shared().snapshot();
    assert_eq!(snap.rejected(), 0);
    assert_eq!(snap.termination(Termination::ExitImage), 1);
}

#[test]
fn test_backtracking_reports_points_actually_removed() {
    let wm = uniform_tissue(Tissues::white_matter());
    let (method, truncations) = Recording::new(Scripted::new(5, Termination::BadSignal));
    let mut t = tracker(act_opts(true, false), wm, method);
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::ActPoorTermination))
    );
    // 6 points: revert 1, then 2, then 3 requested but only 2 remain in front of the seed.
    assert_eq!(*truncations.lock().unwrap(), vec![1, 2, 2]);
}

#[test]
fn test_backtracking_never_retries_exclusion() {
    let mut props = uniform_tissue(Tissues::white_matter());
    props.exclude = [Region::sphere(Vec3::new(5.0, 0.0, 0.0), 0.5)]
        .into_iter()
        .collect();
    let (method, truncations) = Recording::new(Scripted::new(9, Termination::ExitImage));
    let mut t = tracker(act_opts(true, false), props, method);
    assert_eq!(
        t.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::EnterExcludeRegion))
    );
    assert!(truncations.lock().unwrap().is_empty());
    assert_eq!(
        t.shared().snapshot().termination(Termination::EnterExclude),
        1
    );
}

#[test]
fn test_backtracking_judges_inclusion_on_final_path() {
    let props = |centre_x: f32| {
        let mut p = uniform_tissue(Tissues::white_matter());
        p.include = [Region::sphere(Vec3::new(centre_x, 0.0, 0.0), 0.4)]
            .into_iter()
            .collect();
        p
    };
    // Points 1..6 grown, then x = 6 is reverted and the path exits at x = 5.
    let script = || {
        let mut s = vec![Termination::Continue; 6];
        s.push(Termination::BadSignal);
        Scripted::with_script(s, Termination::ExitImage)
    };

    let mut kept = tracker(act_opts(true, false), props(3.0), script());
    let Some(Grown::Accepted(track)) = kept.grow(&origin_seed()).unwrap() else {
        panic!("expected the include region on the final path to count");
    };
    assert_eq!(xs(&track), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

    // Only the reverted point touched the region.
    let mut reverted = tracker(act_opts(true, false), props(6.0), script());
    assert_eq!(
        reverted.grow(&origin_seed()).unwrap(),
        Some(Grown::Rejected(Rejection::MissedIncludeRegion))
    );
}

// --- integration schemes ---

#[test]
fn test_rk4_in_uniform_field() {
    let field = UniformField {
        dir: Vec3::X,
        bounds: Region::aabb(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(5.5, 1.0, 1.0)),
    };
    let stepper = FieldStepper::new(Arc::new(field), 1.0, 0.5);
    let o = TrackOpts {
        integration: Integration::Rk4,
        ..opts(2, 100)
    };
    let mut t = tracker(o, Properties::default(), stepper);
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(xs(&track), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    assert!(track.points.iter().all(|p| p.y == 0.0 && p.z == 0.0));
}

#[test]
fn test_downsampling_accepted_paths() {
    let o = TrackOpts {
        downsample: 3,
        ..opts(2, 100)
    };
    let mut t = tracker(
        o,
        Properties::default(),
        Scripted::new(9, Termination::ExitImage),
    );
    let Some(Grown::Accepted(track)) = t.grow(&origin_seed()).unwrap() else {
        panic!("expected an accepted path");
    };
    assert_eq!(xs(&track), vec![0.0, 3.0, 6.0, 9.0]);
}
