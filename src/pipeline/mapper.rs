//! Feedback stage: turn accepted paths into voxel contributions for the density field.

use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::geometry::VoxelGrid;
use crate::seeding::DensityField;
use crate::types::Streamline;
use crate::utils::config::DEFAULT_MAPPER_UPSAMPLE;

/// `(voxel index, amount)` pairs. The same voxel may appear more than once.
pub type VoxelContributions = Vec<(usize, f32)>;

/// Pure mapping from a path to voxel contributions. Never touches the field itself.
pub trait Mapper: Send + Sync {
    fn map(&self, track: &Streamline) -> VoxelContributions;
}

/// Assigns the length of each (upsampled) segment to the voxel holding its midpoint.
#[derive(Clone, Debug)]
pub struct TrackMapper {
    grid: VoxelGrid,
    upsample: usize,
}

impl TrackMapper {
    pub fn new(grid: VoxelGrid) -> Self {
        Self::with_upsample(grid, DEFAULT_MAPPER_UPSAMPLE)
    }

    pub fn with_upsample(grid: VoxelGrid, upsample: usize) -> Self {
        Self {
            grid,
            upsample: upsample.max(1),
        }
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }
}

impl Mapper for TrackMapper {
    fn map(&self, track: &Streamline) -> VoxelContributions {
        let mut out: VoxelContributions = Vec::new();
        let n = self.upsample as f32;
        for w in track.points.windows(2) {
            let delta = (w[1] - w[0]) / n;
            let sub_len = delta.length();
            if sub_len == 0.0 {
                continue;
            }
            for k in 0..self.upsample {
                let mid = w[0] + delta * (k as f32 + 0.5);
                let Some(index) = self.grid.index_of(mid) else {
                    continue;
                };
                match out.last_mut() {
                    Some((last, amount)) if *last == index => *amount += sub_len,
                    _ => out.push((index, sub_len)),
                }
            }
        }
        out
    }
}

/// The mapper and the field its output is applied to.
#[derive(Clone)]
pub struct Feedback {
    pub mapper: Arc<dyn Mapper>,
    pub field: Arc<DensityField>,
}

/// One shard: map each path, apply it to the field, forward the path unchanged.
fn mapper_shard_loop(
    shard: usize,
    rx: Receiver<Streamline>,
    track_tx: Sender<Streamline>,
    feedback: Feedback,
) {
    let mut mapped = 0_usize;
    while let Ok(track) = rx.recv() {
        let contributions = feedback.mapper.map(&track);
        feedback.field.apply(&contributions);
        mapped += 1;
        if track_tx.send(track).is_err() {
            break;
        }
    }
    debug!("mapper shard {}: done, {} mapped", shard, mapped);
}

/// Spawn one mapper thread per receiver. Each forwards to the writer channel in arrival order.
pub fn spawn_mapper_shards(
    receivers: Vec<Receiver<Streamline>>,
    track_tx: &Sender<Streamline>,
    feedback: &Feedback,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(i, rx)| {
            let track_tx = track_tx.clone();
            let feedback = feedback.clone();
            thread::spawn(move || mapper_shard_loop(i, rx, track_tx, feedback))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn segment_length_lands_in_containing_voxels() {
        let grid = VoxelGrid::new([4, 1, 1], Vec3::ZERO, 1.0).unwrap();
        let mapper = TrackMapper::with_upsample(grid, 2);
        let track = Streamline::new(vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)], 0);
        let out = mapper.map(&track);
        let total: f32 = out.iter().map(|(_, a)| a).sum();
        assert!((total - 2.0).abs() < 1e-5);
        assert!(out.iter().all(|&(i, _)| i < 4));
    }

    #[test]
    fn points_outside_grid_contribute_nothing() {
        let grid = VoxelGrid::new([1, 1, 1], Vec3::ZERO, 1.0).unwrap();
        let mapper = TrackMapper::new(grid);
        let track = Streamline::new(
            vec![Vec3::new(10.0, 0.0, 0.0), Vec3::new(12.0, 0.0, 0.0)],
            0,
        );
        assert!(mapper.map(&track).is_empty());
    }
}
