use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::types::OutputFormat;

/// Synthetic direction field the CLI tracks through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Straight lines along +x.
    #[default]
    Uniform,
    /// Circles around the z axis.
    Circular,
}

/// Parallel streamline tractography through a synthetic direction field.
#[derive(Clone, Parser)]
#[command(name = "fibertrack")]
#[command(about = "Grow streamlines from seeds and write the accepted ones to a track file.")]
pub struct Cli {
    /// Output track file. Default: tracks.tck (tracks.jsonl with --format jsonl).
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Config file. Default: fibertrack.toml in the working directory, if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Direction field to track through.
    #[arg(long, value_enum)]
    pub field: Option<FieldKind>,

    /// Half-width of the field's bounding box (mm).
    #[arg(long)]
    pub bounds: Option<f32>,

    /// Seed sphere as X,Y,Z,R (mm).
    #[arg(long, value_name = "X,Y,Z,R")]
    pub seed_sphere: Option<String>,

    /// RNG seed for reproducible seeding.
    #[arg(long)]
    pub rng_seed: Option<u64>,

    /// Number of tracks to accept.
    #[arg(long, short = 'n')]
    pub number: Option<u64>,

    /// Maximum number of seeds to draw. Default: 1000 x number.
    #[arg(long)]
    pub max_attempts: Option<u64>,

    /// Step size (mm).
    #[arg(long, short = 's')]
    pub step: Option<f32>,

    /// Maximum angle between successive steps (degrees).
    #[arg(long)]
    pub angle: Option<f32>,

    /// Minimum track length in points.
    #[arg(long)]
    pub min_points: Option<usize>,

    /// Maximum track length in points.
    #[arg(long)]
    pub max_points: Option<usize>,

    /// Track from the seed in one direction only.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub unidirectional: Option<bool>,

    /// 4-stage Runge-Kutta integration.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub rk4: Option<bool>,

    /// Keep every n-th point of accepted tracks.
    #[arg(long)]
    pub downsample: Option<usize>,

    /// Inclusion sphere X,Y,Z,R. Repeatable; a track must touch all of them.
    #[arg(long, value_name = "X,Y,Z,R")]
    pub include: Vec<String>,

    /// Exclusion sphere X,Y,Z,R. Repeatable; tracks entering one are discarded.
    #[arg(long, value_name = "X,Y,Z,R")]
    pub exclude: Vec<String>,

    /// Stop a track once it has touched every inclusion region.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub stop: Option<bool>,

    /// Anatomically-constrained tracking against a spherical tissue phantom.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub act: Option<bool>,

    /// Backtrack instead of discarding badly terminated tracks (implies --act).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub backtrack: Option<bool>,

    /// Crop tracks onto the grey/white boundary (implies --act).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub crop_at_gmwmi: Option<bool>,

    /// Bias seeding toward under-represented voxels (feedback pipeline).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub feedback: Option<bool>,

    /// Worker threads. Default: all available.
    #[arg(long, short = 'j')]
    pub threads: Option<usize>,

    /// Also write the run statistics as JSON to this path.
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// Verbose output (debug logs and a progress bar).
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

/// Parse `X,Y,Z,R`.
pub fn parse_sphere(s: &str) -> anyhow::Result<[f32; 4]> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("invalid sphere '{}': {}", s, e))?;
    match parts.as_slice() {
        &[x, y, z, r] => Ok([x, y, z, r]),
        _ => Err(anyhow::anyhow!(
            "invalid sphere '{}': expected X,Y,Z,R",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_parsing() {
        assert_eq!(parse_sphere("1, 2,3,4.5").unwrap(), [1.0, 2.0, 3.0, 4.5]);
        assert!(parse_sphere("1,2,3").is_err());
        assert!(parse_sphere("a,b,c,d").is_err());
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "fibertrack",
            "out.tck",
            "-n",
            "10",
            "--rk4",
            "--include",
            "0,0,0,1",
            "--include",
            "5,0,0,1",
            "--field",
            "circular",
        ])
        .unwrap();
        assert_eq!(cli.number, Some(10));
        assert_eq!(cli.rk4, Some(true));
        assert_eq!(cli.include.len(), 2);
        assert_eq!(cli.field, Some(FieldKind::Circular));
    }
}
