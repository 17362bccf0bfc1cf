//! Feedback seeding: bias new seeds toward voxels the accepted paths have under-served.

use glam::Vec3;
use portable_atomic::{AtomicF32, Ordering};
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Mutex;

use super::{Seed, SeedSource, random_direction};
use crate::error::{TrackError, TrackResult};
use crate::geometry::{MaskImage, VoxelGrid};

/// Per-voxel accumulated path density. Updated with per-voxel atomic adds; readers may see a
/// slightly stale total, which seeding tolerates.
pub struct DensityField {
    grid: VoxelGrid,
    values: Vec<AtomicF32>,
    total: AtomicF32,
}

impl DensityField {
    pub fn new(grid: VoxelGrid) -> Self {
        let values = (0..grid.num_voxels()).map(|_| AtomicF32::new(0.0)).collect();
        Self {
            grid,
            values,
            total: AtomicF32::new(0.0),
        }
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn get(&self, index: usize) -> f32 {
        self.values
            .get(index)
            .map_or(0.0, |v| v.load(Ordering::Relaxed))
    }

    pub fn total(&self) -> f32 {
        self.total.load(Ordering::Relaxed)
    }

    /// Add `(voxel index, amount)` contributions. Out-of-range indices are ignored.
    pub fn apply(&self, contributions: &[(usize, f32)]) {
        let mut added = 0.0;
        for &(index, amount) in contributions {
            if let Some(v) = self.values.get(index) {
                v.fetch_add(amount, Ordering::Relaxed);
                added += amount;
            }
        }
        self.total.fetch_add(added, Ordering::Relaxed);
    }
}

/// Rejection-samples mask voxels with probability `t / (t + d)`, where `t` and `d` are the
/// voxel's share of the target and current densities. Unbounded: a draw that is rejected
/// returns None and the tracker simply asks again.
pub struct DynamicSeeder {
    mask: MaskImage,
    voxels: Vec<usize>,
    target: Vec<f32>,
    target_total: f32,
    field: std::sync::Arc<DensityField>,
    rng: Mutex<StdRng>,
}

impl DynamicSeeder {
    /// `target` holds one non-negative weight per voxel of the mask grid.
    pub fn new(
        mask: MaskImage,
        target: Vec<f32>,
        field: std::sync::Arc<DensityField>,
        rng: StdRng,
    ) -> TrackResult<Self> {
        if field.grid() != mask.grid() {
            return Err(TrackError::config(
                "dynamic seeding: density field and seed mask grids differ",
            ));
        }
        if target.len() != mask.grid().num_voxels() {
            return Err(TrackError::config(format!(
                "dynamic seeding: {} target weights for {} voxels",
                target.len(),
                mask.grid().num_voxels()
            )));
        }
        let voxels: Vec<usize> = mask
            .true_voxels()
            .into_iter()
            .filter(|&i| target[i] > 0.0)
            .collect();
        if voxels.is_empty() {
            return Err(TrackError::config(
                "dynamic seeding: no voxel has a positive target weight",
            ));
        }
        let target_total = voxels.iter().map(|&i| target[i]).sum();
        Ok(Self {
            mask,
            voxels,
            target,
            target_total,
            field,
            rng: Mutex::new(rng),
        })
    }

    /// Probability of accepting a draw in voxel `index`.
    pub fn acceptance(&self, index: usize) -> f32 {
        let total = self.field.total();
        if total <= 0.0 {
            return 1.0;
        }
        let t = self.target[index] / self.target_total;
        let d = self.field.get(index) / total;
        t / (t + d)
    }
}

impl SeedSource for DynamicSeeder {
    fn get_seed(&self) -> Option<Seed> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let index = self.voxels[rng.random_range(0..self.voxels.len())];
        if rng.random::<f32>() >= self.acceptance(index) {
            return None;
        }
        let grid = self.mask.grid();
        let v = grid.voxel_at(index);
        let local = Vec3::new(
            v[0] as f32 + rng.random::<f32>() - 0.5,
            v[1] as f32 + rng.random::<f32>() - 0.5,
            v[2] as f32 + rng.random::<f32>() - 0.5,
        );
        Some(Seed {
            pos: grid.voxel_to_scanner(local),
            dir: random_direction(&mut *rng),
        })
    }

    fn is_finite(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn over_served_voxels_are_less_likely() {
        let grid = VoxelGrid::new([1, 1, 2], Vec3::ZERO, 1.0).unwrap();
        let field = Arc::new(DensityField::new(grid.clone()));
        let mask = MaskImage::from_fn(grid, |_| true);
        let seeder = DynamicSeeder::new(
            mask,
            vec![1.0, 1.0],
            Arc::clone(&field),
            StdRng::seed_from_u64(3),
        )
        .unwrap();
        assert_eq!(seeder.acceptance(0), 1.0);
        field.apply(&[(0, 9.0), (1, 1.0)]);
        assert!(seeder.acceptance(0) < 0.5);
        assert!(seeder.acceptance(1) > 0.5);
        assert!((field.total() - 10.0).abs() < 1e-6);
    }
}
