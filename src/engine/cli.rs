//! CLI command handler: resolve settings (defaults, then fibertrack.toml, then flags) and run.

use anyhow::{Context, Result, bail};
use glam::Vec3;
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::arg_parser::{Cli, FieldKind, parse_sphere};
use crate::geometry::{MaskImage, VoxelGrid};
use crate::pipeline::{Feedback, TrackMapper};
use crate::report::{print_summary, write_summary_json};
use crate::roi::{Region, RoiSet};
use crate::run::{TrackJob, track_to_file};
use crate::seeding::{DensityField, DynamicSeeder, SeedSource, SphereSeed};
use crate::tracking::{
    CircularField, DirectionField, FieldStepper, Properties, ShellPhantom, UniformField,
};
use crate::types::{ActOpts, Integration, OutputFormat, TrackOpts};
use crate::utils::config::PackagePaths;
use crate::utils::setup_logging;
use crate::utils::tracking_toml::{
    RegionSpec, apply_file_to_settings, config_path, load_tracking_toml,
};

/// Voxel size of the density grid used by the feedback pipeline (mm).
const FEEDBACK_VOXEL_SIZE: f32 = 2.0;

/// Everything the CLI resolves before building a job.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub opts: TrackOpts,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub field: FieldKind,
    /// Half-width of the field's bounding box.
    pub bounds: f32,
    pub seed_sphere: (Vec3, f32),
    pub include: Vec<RegionSpec>,
    pub exclude: Vec<RegionSpec>,
    pub rng_seed: u64,
    pub feedback: bool,
    pub verbose: bool,
    pub stats: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            opts: TrackOpts {
                number: Some(1000),
                ..TrackOpts::default()
            },
            output: None,
            format: OutputFormat::default(),
            field: FieldKind::default(),
            bounds: 50.0,
            seed_sphere: (Vec3::ZERO, 5.0),
            include: Vec::new(),
            exclude: Vec::new(),
            rng_seed: 42,
            feedback: false,
            verbose: false,
            stats: None,
        }
    }
}

impl RunSettings {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().output_filename(self.format)))
    }
}

fn sphere_spec(s: &str) -> Result<RegionSpec> {
    let [x, y, z, r] = parse_sphere(s)?;
    Ok(RegionSpec::Sphere {
        centre: [x, y, z],
        radius: r,
    })
}

/// Overwrite a settings field from the CLI when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $target:expr, $cli_field:ident => $target_field:ident) => {
        if let Some(v) = $cli.$cli_field {
            $target.$target_field = v;
        }
    };
}

/// Apply CLI flags over `s` (flags win over the config file).
fn apply_cli_to_settings(cli: &Cli, s: &mut RunSettings) -> Result<()> {
    if let Some(ref p) = cli.output {
        s.output = Some(p.clone());
    }
    apply_cli_opt!(cli, s, format => format);
    apply_cli_opt!(cli, s, field => field);
    apply_cli_opt!(cli, s, bounds => bounds);
    apply_cli_opt!(cli, s, rng_seed => rng_seed);
    apply_cli_opt!(cli, s, feedback => feedback);
    apply_cli_opt!(cli, s, verbose => verbose);
    if let Some(ref sphere) = cli.seed_sphere {
        let [x, y, z, r] = parse_sphere(sphere)?;
        s.seed_sphere = (Vec3::new(x, y, z), r);
    }
    if !cli.include.is_empty() {
        s.include = cli.include.iter().map(|i| sphere_spec(i)).collect::<Result<_>>()?;
    }
    if !cli.exclude.is_empty() {
        s.exclude = cli.exclude.iter().map(|e| sphere_spec(e)).collect::<Result<_>>()?;
    }
    if cli.stats.is_some() {
        s.stats = cli.stats.clone();
    }

    let opts = &mut s.opts;
    if cli.number.is_some() {
        opts.number = cli.number;
    }
    if cli.max_attempts.is_some() {
        opts.max_seed_attempts = cli.max_attempts;
    }
    if cli.threads.is_some() {
        opts.num_threads = cli.threads;
    }
    apply_cli_opt!(cli, opts, step => step_size);
    apply_cli_opt!(cli, opts, min_points => min_points);
    apply_cli_opt!(cli, opts, max_points => max_points);
    apply_cli_opt!(cli, opts, unidirectional => unidirectional);
    apply_cli_opt!(cli, opts, downsample => downsample);
    apply_cli_opt!(cli, opts, stop => stop_on_all_include);
    if let Some(deg) = cli.angle {
        opts.cos_max_angle = deg.to_radians().cos();
        opts.cos_max_angle_rk4 = opts.cos_max_angle;
    }
    if let Some(rk4) = cli.rk4 {
        opts.integration = if rk4 {
            Integration::Rk4
        } else {
            Integration::Single
        };
    }
    match cli.act {
        Some(true) => {
            opts.act.get_or_insert_with(ActOpts::default);
        }
        Some(false) => opts.act = None,
        None => {}
    }
    if let Some(backtrack) = cli.backtrack {
        opts.act.get_or_insert_with(ActOpts::default).backtrack = backtrack;
    }
    if let Some(crop) = cli.crop_at_gmwmi {
        opts.act.get_or_insert_with(ActOpts::default).crop_at_gmwmi = crop;
    }
    Ok(())
}

/// Defaults, then the config file, then CLI flags. Installs the logger.
pub fn setup_settings(cli: &Cli) -> Result<RunSettings> {
    let mut settings = RunSettings::default();
    let cwd = std::env::current_dir().context("read working directory")?;
    let path = config_path(&cwd, cli.config.as_deref());
    let file = load_tracking_toml(&path).context("load config file")?;
    if file.is_none() && cli.config.is_some() {
        bail!("config file {} not found", path.display());
    }
    if let Some(ref file) = file {
        apply_file_to_settings(file, &mut settings);
    }
    apply_cli_to_settings(cli, &mut settings)?;
    setup_logging(settings.verbose);
    if file.is_some() {
        debug!("Loaded settings from {}", path.display());
    }
    Ok(settings)
}

fn direction_field(settings: &RunSettings) -> Arc<dyn DirectionField> {
    let half = Vec3::splat(settings.bounds);
    let bounds = Region::aabb(-half, half);
    match settings.field {
        FieldKind::Uniform => Arc::new(UniformField {
            dir: Vec3::X,
            bounds,
        }),
        FieldKind::Circular => Arc::new(CircularField {
            centre: Vec3::ZERO,
            bounds,
        }),
    }
}

fn properties(settings: &RunSettings) -> Properties {
    let include: RoiSet = settings.include.iter().map(RegionSpec::to_region).collect();
    let exclude: RoiSet = settings.exclude.iter().map(RegionSpec::to_region).collect();
    let tissues = settings.opts.is_act().then(|| {
        Arc::new(ShellPhantom {
            centre: Vec3::ZERO,
            wm_radius: settings.bounds * 0.8,
            cgm_thickness: settings.bounds * 0.1,
            csf_thickness: settings.bounds * 0.1,
        }) as Arc<dyn crate::tracking::TissueField>
    });
    Properties {
        include,
        exclude,
        mask: RoiSet::new(),
        tissues,
    }
}

/// Seed source, plus the feedback stage when dynamic seeding is on.
fn seeding(settings: &RunSettings) -> Result<(Arc<dyn SeedSource>, Option<Feedback>)> {
    let rng = StdRng::seed_from_u64(settings.rng_seed);
    if !settings.feedback {
        let (centre, radius) = settings.seed_sphere;
        return Ok((Arc::new(SphereSeed::new(centre, radius, rng)?), None));
    }
    let dim = ((2.0 * settings.bounds / FEEDBACK_VOXEL_SIZE).ceil() as usize).max(1);
    let grid = VoxelGrid::new(
        [dim; 3],
        Vec3::splat(-settings.bounds + 0.5 * FEEDBACK_VOXEL_SIZE),
        FEEDBACK_VOXEL_SIZE,
    )?;
    let (centre, radius) = settings.seed_sphere;
    let mask = MaskImage::from_fn(grid.clone(), |p| p.distance(centre) <= radius);
    let target = vec![1.0; grid.num_voxels()];
    let field = Arc::new(DensityField::new(grid.clone()));
    let seeder = DynamicSeeder::new(mask, target, Arc::clone(&field), rng)?;
    let feedback = Feedback {
        mapper: Arc::new(TrackMapper::new(grid)),
        field,
    };
    Ok((Arc::new(seeder), Some(feedback)))
}

/// Track with the resolved settings and write the output file.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let settings = setup_settings(cli)?;
    let stepper = FieldStepper::new(
        direction_field(&settings),
        settings.opts.step_size,
        settings.opts.cos_max_angle,
    );
    let (seeds, feedback) = seeding(&settings)?;
    let mut job =
        TrackJob::new(settings.opts.clone(), stepper, seeds).with_properties(properties(&settings));
    if let Some(feedback) = feedback {
        job = job.with_feedback(feedback);
    }

    let out_path = settings.output_path();
    let summary = track_to_file(job, &out_path, settings.format, settings.verbose)?;
    print_summary(&summary);
    if let Some(ref path) = settings.stats {
        write_summary_json(&summary, path)?;
    }
    if summary.cancelled {
        warn!("Run cancelled by user; partial output kept at {}", out_path.display());
    }
    Ok(())
}
