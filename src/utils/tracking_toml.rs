//! Load `fibertrack.toml` (CLI only). The library never reads it; callers build `TrackOpts`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::engine::arg_parser::FieldKind;
use crate::engine::cli::RunSettings;
use crate::roi::Region;
use crate::types::{ActOpts, Integration, OutputFormat};
use crate::utils::config::PackagePaths;

#[derive(Debug, Deserialize)]
pub(crate) struct TrackingToml {
    #[serde(default)]
    tracking: TrackingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackingSection {
    output: Option<String>,
    format: Option<OutputFormat>,
    field: Option<FieldKind>,
    bounds: Option<f32>,
    number: Option<u64>,
    max_attempts: Option<u64>,
    threads: Option<usize>,
    step: Option<f32>,
    angle: Option<f32>,
    min_points: Option<usize>,
    max_points: Option<usize>,
    unidirectional: Option<bool>,
    rk4: Option<bool>,
    downsample: Option<usize>,
    stop_on_all_include: Option<bool>,
    seed_sphere: Option<[f32; 4]>,
    rng_seed: Option<u64>,
    feedback: Option<bool>,
    verbose: Option<bool>,
    act: Option<bool>,
    backtrack: Option<bool>,
    crop_at_gmwmi: Option<bool>,
    #[serde(default)]
    include: Vec<RegionSpec>,
    #[serde(default)]
    exclude: Vec<RegionSpec>,
}

/// A region as written in the config file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegionSpec {
    Sphere { centre: [f32; 3], radius: f32 },
    Box { min: [f32; 3], max: [f32; 3] },
}

impl RegionSpec {
    pub fn to_region(&self) -> Region {
        match self {
            RegionSpec::Sphere { centre, radius } => {
                Region::sphere(Vec3::from_array(*centre), *radius)
            }
            RegionSpec::Box { min, max } => {
                Region::aabb(Vec3::from_array(*min), Vec3::from_array(*max))
            }
        }
    }
}

/// Path of the config file: `explicit` if given, else the package default in `dir`.
pub(crate) fn config_path(dir: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(PackagePaths::get().config_filename()))
}

/// Load the config file. `Ok(None)` only when it does not exist; a file that cannot be read
/// or parsed is an error. CLI only.
pub(crate) fn load_tracking_toml(path: &Path) -> Result<Option<TrackingToml>> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let file = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(file))
}

/// Overwrite a settings field from the file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $target:expr, $sec_field:ident => $target_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $target.$target_field = v;
        }
    };
}

/// Apply file config to settings (only fields present in the file). Call before applying CLI.
pub(crate) fn apply_file_to_settings(file: &TrackingToml, s: &mut RunSettings) {
    let sec = &file.tracking;
    if let Some(ref p) = sec.output {
        s.output = Some(PathBuf::from(p));
    }
    apply_file_opt!(sec, s, format => format);
    apply_file_opt!(sec, s, field => field);
    apply_file_opt!(sec, s, bounds => bounds);
    apply_file_opt!(sec, s, rng_seed => rng_seed);
    apply_file_opt!(sec, s, feedback => feedback);
    apply_file_opt!(sec, s, verbose => verbose);
    if let Some([x, y, z, r]) = sec.seed_sphere {
        s.seed_sphere = (Vec3::new(x, y, z), r);
    }
    if !sec.include.is_empty() {
        s.include = sec.include.clone();
    }
    if !sec.exclude.is_empty() {
        s.exclude = sec.exclude.clone();
    }

    let opts = &mut s.opts;
    if let Some(n) = sec.number {
        opts.number = Some(n);
    }
    if let Some(n) = sec.max_attempts {
        opts.max_seed_attempts = Some(n);
    }
    if let Some(n) = sec.threads {
        opts.num_threads = Some(n);
    }
    apply_file_opt!(sec, opts, step => step_size);
    apply_file_opt!(sec, opts, min_points => min_points);
    apply_file_opt!(sec, opts, max_points => max_points);
    apply_file_opt!(sec, opts, unidirectional => unidirectional);
    apply_file_opt!(sec, opts, downsample => downsample);
    apply_file_opt!(sec, opts, stop_on_all_include => stop_on_all_include);
    if let Some(deg) = sec.angle {
        opts.cos_max_angle = deg.to_radians().cos();
        opts.cos_max_angle_rk4 = opts.cos_max_angle;
    }
    if let Some(rk4) = sec.rk4 {
        opts.integration = if rk4 {
            Integration::Rk4
        } else {
            Integration::Single
        };
    }
    match sec.act {
        Some(true) => {
            opts.act.get_or_insert_with(ActOpts::default);
        }
        Some(false) => opts.act = None,
        None => {}
    }
    // ACT sub-options imply ACT.
    if let Some(backtrack) = sec.backtrack {
        opts.act.get_or_insert_with(ActOpts::default).backtrack = backtrack;
    }
    if let Some(crop) = sec.crop_at_gmwmi {
        opts.act.get_or_insert_with(ActOpts::default).crop_at_gmwmi = crop;
    }
}
